mod assets;
mod backend;
mod commands;
mod config;
mod error;
mod events;
mod keychain;
mod log;
mod setup;
mod specta;
mod speech;

/// Build the command registry, which writes `src/bindings.ts` in debug builds
pub fn export_bindings() {
    let _ = specta::builder();
}

pub fn run() {
    // Load AZURE_SPEECH_KEY / AZURE_SPEECH_REGION from .env if present
    dotenvy::dotenv().ok();

    let builder = specta::builder();

    tauri::Builder::default()
        .plugin(log::create_plugin().build())
        .plugin(tauri_plugin_store::Builder::new().build())
        .enable_macos_default_menu(false)
        .register_asynchronous_uri_scheme_protocol(assets::SCHEME, assets::handle_request)
        .invoke_handler(builder.invoke_handler())
        .setup(move |app| {
            builder.mount_events(app);
            setup::setup_app(app)?;
            Ok(())
        })
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

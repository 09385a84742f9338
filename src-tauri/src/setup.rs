use std::sync::Arc;

use log::info;
use murmur_session::{
    get_model_catalog, AppConfig, ConfigKey, ConfigStore, Conversation, DirectoryResolver,
    SessionConfig, SessionManager, SpeechInput,
};
use tauri::Manager;
use tauri_plugin_store::StoreExt;

use crate::{
    assets,
    backend::GgufBackend,
    config::Config,
    error::Error,
    events,
    speech::{AzureTokenProvider, MicrophoneCapture},
};

/// The conversation as managed in app state
pub type ChatSession = Conversation<GgufBackend, Config>;

pub fn setup_app(app: &mut tauri::App<tauri::Wry>) -> Result<(), Error> {
    info!("Murmur v{}", env!("CARGO_PKG_VERSION"));

    let store = app.store("config.json")?;
    let config = Config::new(store);
    let app_config: AppConfig = config.get(&ConfigKey::APP).unwrap_or_default();

    let models_dir = assets::asset_root(app.handle())?.join("models");
    info!("Models directory: {}", models_dir.display());

    // Model session: one GGUF handle at a time
    let session = Arc::new(SessionManager::new(
        Arc::new(GgufBackend::default()),
        Arc::new(DirectoryResolver::new(models_dir)),
        SessionConfig {
            load_options: app_config.load_options(),
            ..SessionConfig::default()
        },
    ));
    events::forward_session_events(app.handle().clone(), session.subscribe());

    let chat = Arc::new(Conversation::new(
        session,
        Arc::new(config.clone()),
        get_model_catalog(),
    ));
    events::forward_input_changes(app.handle().clone(), chat.input().subscribe());

    // Speech writes into the same input buffer the text box uses
    let speech = Arc::new(SpeechInput::new(
        Arc::new(MicrophoneCapture::new(config.clone())),
        Arc::new(AzureTokenProvider::new(config.clone())),
        chat.input().clone(),
    ));
    events::forward_capture_events(app.handle().clone(), speech.subscribe());

    if let Some(model) = chat.selected_model() {
        info!("Selected model: {} (load it from the model picker)", model.name);
    }

    app.manage(config);
    app.manage(chat);
    app.manage(speech);

    Ok(())
}

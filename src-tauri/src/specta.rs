//! Typed IPC: command and event registration plus TypeScript export.

use tauri_specta::{collect_commands, collect_events, Builder};

use crate::events::{ChatInputChanged, ModelLoadingStateChanged, SpeechCaptureStateChanged};

const BINDINGS_PATH: &str = "../src/bindings.ts";

/// Build the tauri-specta registry; in debug builds also writes `src/bindings.ts`
pub fn builder() -> Builder<tauri::Wry> {
    let builder = Builder::<tauri::Wry>::new()
        .commands(crate::with_commands!(collect_commands))
        .events(collect_events![
            ModelLoadingStateChanged,
            SpeechCaptureStateChanged,
            ChatInputChanged,
        ]);

    #[cfg(debug_assertions)]
    export_bindings(&builder);

    builder
}

#[cfg(debug_assertions)]
fn export_bindings(builder: &Builder<tauri::Wry>) {
    use specta_typescript::{BigIntExportBehavior, Typescript};

    // Runs before the log plugin exists, so report on stderr
    if let Some(dir) = std::path::Path::new(BINDINGS_PATH).parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Failed to create {}: {}", dir.display(), e);
            return;
        }
    }
    let typescript = Typescript::default().bigint(BigIntExportBehavior::Number);
    if let Err(e) = builder.export(typescript, BINDINGS_PATH) {
        eprintln!("Failed to export TypeScript bindings: {}", e);
    }
}

use derive_more::{Display, From};

/// Startup failures surfaced from `setup_app`
#[derive(Debug, Display, From)]
pub enum Error {
    #[display("Tauri error: {_0}")]
    #[from]
    Tauri(tauri::Error),

    #[display("Config store error: {_0}")]
    #[from]
    Store(tauri_plugin_store::Error),
}

impl std::error::Error for Error {}

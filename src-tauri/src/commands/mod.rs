mod app;
mod chat;
mod models;
mod prompts;
pub mod registry;
mod speech;

// Re-export all commands for convenience
pub use app::*;
pub use chat::*;
pub use models::*;
pub use prompts::*;
pub use speech::*;

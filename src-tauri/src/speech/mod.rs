mod microphone;
mod recognizer;
mod token;

pub use microphone::MicrophoneCapture;
pub use token::AzureTokenProvider;

pub mod client;
pub mod options;
pub mod types;

pub use client::{InferenceBackend, OllamaClient};
pub use options::OptionDefaults;
pub use types::*;

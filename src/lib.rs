pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod upstream;
pub mod uploads;

pub use error::{Error, Result};

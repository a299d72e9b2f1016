pub mod storage;
pub mod types;

pub use storage::{UploadStorage, sanitize_file_name};
pub use types::*;

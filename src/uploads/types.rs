use std::path::PathBuf;

/// URL prefix under which stored uploads are served back.
pub const UPLOADS_ROUTE: &str = "/uploads";

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub stored_name: String,
    pub mimetype: String,
    pub size: u64,
    pub path: PathBuf,
}

impl UploadedFile {
    /// The stored name is percent-encoded as a single path segment, so
    /// `%`, spaces, `#` and `?` in client names survive the round trip.
    pub fn url(&self) -> String {
        format!("{}/{}", UPLOADS_ROUTE, urlencoding::encode(&self.stored_name))
    }
}

use super::UploadedFile;
use crate::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

const DEFAULT_MIMETYPE: &str = "application/octet-stream";

/// Local directory holding uploaded files. Every stored name starts with a
/// fresh UUID, so concurrent writers never touch the same path.
pub struct UploadStorage {
    dir: PathBuf,
}

impl UploadStorage {
    pub async fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        info!("Upload directory ready: {}", dir.display());

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn save(
        &self,
        original_name: &str,
        mimetype: Option<&str>,
        data: &[u8],
    ) -> Result<UploadedFile> {
        let stored_name = format!("{}-{}", Uuid::new_v4(), sanitize_file_name(original_name));
        let path = self.dir.join(&stored_name);

        tokio::fs::write(&path, data).await?;
        debug!(
            "Stored upload {} as {} ({} bytes)",
            original_name,
            path.display(),
            data.len()
        );

        Ok(UploadedFile {
            original_name: original_name.to_string(),
            stored_name,
            mimetype: mimetype
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_MIMETYPE)
                .to_string(),
            size: data.len() as u64,
            path,
        })
    }
}

/// Keeps only the final path component of a client-supplied name.
pub fn sanitize_file_name(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .unwrap_or("");

    match last.trim() {
        "" | "." | ".." => "file".to_string(),
        trimmed => trimmed.to_string(),
    }
}

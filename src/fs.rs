//! File-system seam used by the persistence stage.

use async_trait::async_trait;
use std::io;
use std::path::Path;

#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Create `path` and any missing parents.
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Write `data` to `path`, replacing any existing file.
    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;
}

/// The real file system via `tokio::fs`.
///
/// Writes go to a sibling `.tmp` file first and are renamed into place.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioFs;

#[async_trait]
impl FileSystem for TokioFs {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut tmp_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        tokio::fs::write(&tmp_path, data).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }
        Ok(())
    }
}

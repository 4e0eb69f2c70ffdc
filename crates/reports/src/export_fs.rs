use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWriteExt};

pub type ExportReader = Box<dyn AsyncRead + Send + Unpin>;

/// Filesystem operations used by the tabular export lifecycle.
#[async_trait]
pub trait ExportFs: Send + Sync {
    async fn exists(&self, path: &Path) -> io::Result<bool>;

    /// Must succeed when the directory already exists.
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Returns only once the full contents are on disk.
    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    async fn open(&self, path: &Path) -> io::Result<ExportReader>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExportFs;

#[async_trait]
impl ExportFs for LocalExportFs {
    async fn exists(&self, path: &Path) -> io::Result<bool> {
        tokio::fs::try_exists(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(contents).await?;
        file.flush().await?;
        file.sync_all().await
    }

    async fn open(&self, path: &Path) -> io::Result<ExportReader> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::new(file))
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_dir_all_is_idempotent() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("exports").join("nested");

        LocalExportFs.create_dir_all(&dir).await.expect("first create");
        LocalExportFs.create_dir_all(&dir).await.expect("second create");
        assert!(LocalExportFs.exists(&dir).await.expect("exists check"));
    }

    #[tokio::test]
    async fn write_then_remove() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("report.csv");

        LocalExportFs.write(&path, b"a,b\n").await.expect("write");
        assert_eq!(std::fs::read(&path).expect("read back"), b"a,b\n");

        LocalExportFs.remove_file(&path).await.expect("remove");
        assert!(!LocalExportFs.exists(&path).await.expect("exists check"));
    }
}

use std::path::Path;

use async_trait::async_trait;

/// Where exported files are written.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn write_file(&self, path: &Path, contents: &[u8]) -> std::io::Result<()>;
}

/// The local disk. Parent directories are created as needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn write_file(&self, path: &Path, contents: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, contents).await
    }
}

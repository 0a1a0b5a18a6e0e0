//! ファイルシステムの抽象

use async_trait::async_trait;
use dockyard_core::{LifecycleError, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;

    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// 一時ファイルに書いてから rename する
    ///
    /// 読み手が書きかけの内容を見ることはない。
    async fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()>;

    async fn read_to_string(&self, path: &Path) -> Result<String>;

    /// 存在しない場合は何もしない
    async fn remove_file(&self, path: &Path) -> Result<()>;
}

/// ローカルディスク
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn io_error(path: &Path, e: std::io::Error) -> LifecycleError {
    LifecycleError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}.{}.tmp", file_name, std::process::id(), seq))
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let temp = temp_path_for(path);
        tokio::fs::write(&temp, contents)
            .await
            .map_err(|e| io_error(&temp, e))?;

        if let Err(e) = tokio::fs::rename(&temp, path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(io_error(path, e));
        }
        Ok(())
    }

    async fn read_to_string(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(path, e)),
        }
    }
}

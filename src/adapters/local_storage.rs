use crate::domain::ports::Storage;
use crate::utils::error::{Result, RosterError};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

/// `<file>.lock` 上的作業系統檔案鎖。資料檔以改名方式替換，所以不能直接鎖資料檔。
#[derive(Debug)]
pub struct LocalFileLock {
    file: File,
}

impl Drop for LocalFileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release roster file lock: {}", e);
        }
    }
}

impl Storage for LocalStorage {
    type Lock = LocalFileLock;

    async fn lock_exclusive(&self, path: &str) -> Result<LocalFileLock> {
        let lock_path = self.base_path.join(format!("{}.lock", path));
        if let Some(parent) = lock_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // flock 會阻塞，交給 blocking 執行緒
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(&lock_path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| RosterError::persistence(format!("file lock task failed: {}", e)))??;

        Ok(LocalFileLock { file })
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.base_path.join(path);
        let data = tokio::fs::read(full_path).await?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.base_path.join(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // 先寫暫存檔再改名，避免中途失敗留下半份 JSON
        let tmp_path = full_path.with_extension("tmp");
        tokio::fs::write(&tmp_path, data).await?;
        tokio::fs::rename(&tmp_path, &full_path).await?;
        Ok(())
    }
}

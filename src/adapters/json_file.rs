use crate::adapters::memory::RosterState;
use crate::domain::model::{
    AuditRecord, CapacityChange, Enrollment, EnrollmentPatch, Student, Subject,
};
use crate::domain::ports::{CatalogDirectory, EnrollmentStore, Storage};
use crate::utils::error::{Result, RosterError};
use async_trait::async_trait;
use tokio::sync::Mutex;

pub const DEFAULT_FILE_NAME: &str = "roster.json";

/// 以單一 JSON 文件保存整份名單的儲存實作。
///
/// 文件是唯一的事實來源：每次讀取都重新載入，每次異動都在跨行程檔案鎖內
/// 重新讀取、套用、寫回。多個行程開啟同一份文件時，容量檢查與唯一性檢查
/// 都以磁碟上的最新狀態為準；寫檔失敗時異動視同未發生。
pub struct JsonFileStore<S: Storage> {
    storage: S,
    file_name: String,
    writer: Mutex<()>,
}

impl<S: Storage> JsonFileStore<S> {
    /// 開啟文件並確認內容可解析；文件不存在時以空名單開始
    pub async fn open(storage: S, file_name: impl Into<String>) -> Result<Self> {
        let store = Self {
            storage,
            file_name: file_name.into(),
            writer: Mutex::new(()),
        };
        store.load().await?;
        Ok(store)
    }

    pub async fn snapshot(&self) -> Result<RosterState> {
        self.load().await
    }

    /// 直接覆寫整份狀態（匯入或初始化資料用）
    pub async fn replace_state(&self, state: RosterState) -> Result<()> {
        let _writer = self.writer.lock().await;
        let _lock = self.storage.lock_exclusive(&self.file_name).await?;
        self.flush(&state).await
    }

    async fn load(&self) -> Result<RosterState> {
        match self.storage.read_file(&self.file_name).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(RosterError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("📂 No roster document at '{}', using an empty roster", self.file_name);
                Ok(RosterState::default())
            }
            Err(e) => Err(e),
        }
    }

    async fn flush(&self, state: &RosterState) -> Result<()> {
        let data = serde_json::to_vec_pretty(state)?;
        tracing::debug!(
            "Writing roster document '{}' ({} bytes)",
            self.file_name,
            data.len()
        );
        self.storage.write_file(&self.file_name, &data).await
    }

    async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut RosterState) -> Result<T> + Send,
        T: Send,
    {
        let _writer = self.writer.lock().await;
        let _lock = self.storage.lock_exclusive(&self.file_name).await?;
        let mut state = self.load().await?;
        let value = f(&mut state)?;
        self.flush(&state).await?;
        Ok(value)
    }
}

#[async_trait]
impl<S: Storage> CatalogDirectory for JsonFileStore<S> {
    async fn fetch_subject_catalog(&self, subject_id: &str) -> Result<Option<Subject>> {
        Ok(self.load().await?.subject(subject_id).cloned())
    }

    async fn fetch_active_students(&self) -> Result<Vec<Student>> {
        Ok(self.load().await?.active_students())
    }

    async fn fetch_student(&self, student_id: &str) -> Result<Option<Student>> {
        Ok(self.load().await?.student(student_id).cloned())
    }
}

#[async_trait]
impl<S: Storage> EnrollmentStore for JsonFileStore<S> {
    async fn fetch_enrollments(&self, subject_id: &str) -> Result<Vec<Enrollment>> {
        Ok(self.load().await?.enrollments_for(subject_id))
    }

    async fn persist_enrollment(&self, enrollment: Enrollment) -> Result<Enrollment> {
        self.mutate(move |state| state.insert_enrollment(enrollment))
            .await
    }

    async fn update_enrollment(&self, id: &str, patch: EnrollmentPatch) -> Result<Enrollment> {
        self.mutate(move |state| state.update_enrollment(id, &patch))
            .await
    }

    async fn delete_enrollment(&self, id: &str) -> Result<()> {
        self.mutate(move |state| state.delete_enrollment(id)).await
    }

    async fn apply_capacity_changes(
        &self,
        subject_id: &str,
        changes: &[CapacityChange],
    ) -> Result<()> {
        self.mutate(move |state| state.apply_capacity_changes(subject_id, changes))
            .await
    }

    async fn append_audit(&self, record: AuditRecord) -> Result<()> {
        self.mutate(move |state| {
            state.audit_log.push(record);
            Ok(())
        })
        .await
    }
}

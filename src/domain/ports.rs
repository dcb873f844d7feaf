use crate::domain::model::{
    AuditRecord, CapacityChange, CapacityTarget, Enrollment, EnrollmentPatch, Student, Subject,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// 位元組層級的檔案存取（JSON 檔案儲存使用）
pub trait Storage: Send + Sync {
    /// 跨行程獨占鎖；值被釋放時解鎖
    type Lock: Send;

    fn lock_exclusive(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<Self::Lock>> + Send;
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 科目目錄與使用者目錄（唯讀）
#[async_trait]
pub trait CatalogDirectory: Send + Sync {
    async fn fetch_subject_catalog(&self, subject_id: &str) -> Result<Option<Subject>>;
    async fn fetch_active_students(&self) -> Result<Vec<Student>>;
    async fn fetch_student(&self, student_id: &str) -> Result<Option<Student>>;
}

/// 報名紀錄與容量計數的持久層。只有引擎會呼叫寫入方法。
#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    async fn fetch_enrollments(&self, subject_id: &str) -> Result<Vec<Enrollment>>;
    async fn persist_enrollment(&self, enrollment: Enrollment) -> Result<Enrollment>;
    async fn update_enrollment(&self, id: &str, patch: EnrollmentPatch) -> Result<Enrollment>;
    async fn delete_enrollment(&self, id: &str) -> Result<()>;

    /// 整批條件式調整：任何一筆不成立則全部不套用
    async fn apply_capacity_changes(
        &self,
        subject_id: &str,
        changes: &[CapacityChange],
    ) -> Result<()>;

    async fn update_capacity_counter(
        &self,
        subject_id: &str,
        target: CapacityTarget,
        delta: i32,
    ) -> Result<()> {
        let change = CapacityChange {
            target,
            delta,
            enforce_max: delta > 0,
        };
        self.apply_capacity_changes(subject_id, std::slice::from_ref(&change))
            .await
    }

    async fn append_audit(&self, record: AuditRecord) -> Result<()>;
}

#[async_trait]
impl<T: CatalogDirectory + ?Sized> CatalogDirectory for Arc<T> {
    async fn fetch_subject_catalog(&self, subject_id: &str) -> Result<Option<Subject>> {
        (**self).fetch_subject_catalog(subject_id).await
    }

    async fn fetch_active_students(&self) -> Result<Vec<Student>> {
        (**self).fetch_active_students().await
    }

    async fn fetch_student(&self, student_id: &str) -> Result<Option<Student>> {
        (**self).fetch_student(student_id).await
    }
}

#[async_trait]
impl<T: EnrollmentStore + ?Sized> EnrollmentStore for Arc<T> {
    async fn fetch_enrollments(&self, subject_id: &str) -> Result<Vec<Enrollment>> {
        (**self).fetch_enrollments(subject_id).await
    }

    async fn persist_enrollment(&self, enrollment: Enrollment) -> Result<Enrollment> {
        (**self).persist_enrollment(enrollment).await
    }

    async fn update_enrollment(&self, id: &str, patch: EnrollmentPatch) -> Result<Enrollment> {
        (**self).update_enrollment(id, patch).await
    }

    async fn delete_enrollment(&self, id: &str) -> Result<()> {
        (**self).delete_enrollment(id).await
    }

    async fn apply_capacity_changes(
        &self,
        subject_id: &str,
        changes: &[CapacityChange],
    ) -> Result<()> {
        (**self).apply_capacity_changes(subject_id, changes).await
    }

    async fn append_audit(&self, record: AuditRecord) -> Result<()> {
        (**self).append_audit(record).await
    }
}

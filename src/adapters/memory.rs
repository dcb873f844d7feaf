use crate::domain::model::{
    AuditRecord, CapacityChange, CapacityTarget, Enrollment, EnrollmentPatch, Student, Subject,
};
use crate::domain::ports::{CatalogDirectory, EnrollmentStore};
use crate::utils::error::{Result, RosterError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 科目、學生、報名與稽核紀錄的完整狀態。JSON 檔案儲存直接序列化這個結構。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosterState {
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub enrollments: Vec<Enrollment>,
    #[serde(default)]
    pub audit_log: Vec<AuditRecord>,
}

impl RosterState {
    pub fn subject(&self, subject_id: &str) -> Option<&Subject> {
        self.subjects.iter().find(|subject| subject.id == subject_id)
    }

    pub fn student(&self, student_id: &str) -> Option<&Student> {
        self.students.iter().find(|student| student.id == student_id)
    }

    pub fn active_students(&self) -> Vec<Student> {
        self.students
            .iter()
            .filter(|student| student.is_active)
            .cloned()
            .collect()
    }

    pub fn enrollments_for(&self, subject_id: &str) -> Vec<Enrollment> {
        self.enrollments
            .iter()
            .filter(|enrollment| enrollment.subject_id == subject_id)
            .cloned()
            .collect()
    }

    pub fn insert_enrollment(&mut self, enrollment: Enrollment) -> Result<Enrollment> {
        // 唯一性在儲存層再擋一次：同一學生同一科目只能有一筆
        if self.enrollments.iter().any(|existing| {
            existing.student_id == enrollment.student_id
                && existing.subject_id == enrollment.subject_id
        }) {
            return Err(RosterError::AlreadyEnrolled {
                student_id: enrollment.student_id,
                subject_id: enrollment.subject_id,
            });
        }
        if self.enrollments.iter().any(|existing| existing.id == enrollment.id) {
            return Err(RosterError::persistence(format!(
                "enrollment id {} already exists",
                enrollment.id
            )));
        }
        self.enrollments.push(enrollment.clone());
        Ok(enrollment)
    }

    pub fn update_enrollment(&mut self, id: &str, patch: &EnrollmentPatch) -> Result<Enrollment> {
        let enrollment = self
            .enrollments
            .iter_mut()
            .find(|enrollment| enrollment.id == id)
            .ok_or_else(|| RosterError::persistence(format!("enrollment {} does not exist", id)))?;
        patch.apply_to(enrollment);
        Ok(enrollment.clone())
    }

    pub fn delete_enrollment(&mut self, id: &str) -> Result<()> {
        let before = self.enrollments.len();
        self.enrollments.retain(|enrollment| enrollment.id != id);
        if self.enrollments.len() == before {
            return Err(RosterError::persistence(format!(
                "enrollment {} does not exist",
                id
            )));
        }
        Ok(())
    }

    /// 先在暫存值上驗證全部調整，全部成立才寫回
    pub fn apply_capacity_changes(
        &mut self,
        subject_id: &str,
        changes: &[CapacityChange],
    ) -> Result<()> {
        let subject = self
            .subjects
            .iter_mut()
            .find(|subject| subject.id == subject_id)
            .ok_or_else(|| RosterError::invalid_target(format!("unknown subject {}", subject_id)))?;

        let mut staged: HashMap<CapacityTarget, u32> = HashMap::new();
        for change in changes {
            let (recorded, max) = subject.counter(&change.target).ok_or_else(|| {
                RosterError::invalid_target(format!(
                    "{} is not part of subject {}",
                    change.target, subject_id
                ))
            })?;
            let current = staged.get(&change.target).copied().unwrap_or(recorded);

            let next = match current.checked_add_signed(change.delta) {
                Some(next) => next,
                None if change.delta < 0 => {
                    return Err(RosterError::CounterUnderflow {
                        target: change.target.clone(),
                    })
                }
                None => {
                    return Err(RosterError::CounterOverflow {
                        target: change.target.clone(),
                    })
                }
            };
            if change.delta > 0 && change.enforce_max && next > max {
                return Err(RosterError::CapacityExceeded {
                    target: change.target.clone(),
                });
            }
            staged.insert(change.target.clone(), next);
        }

        for (target, value) in staged {
            match target {
                CapacityTarget::Level(id) => {
                    if let Some(level) = subject.levels.iter_mut().find(|level| level.id == id) {
                        level.current_students = value;
                    }
                }
                CapacityTarget::Group(id) => {
                    if let Some(group) = subject.groups.iter_mut().find(|group| group.id == id) {
                        group.current_students = value;
                    }
                }
            }
        }
        Ok(())
    }
}

/// 記憶體內的儲存實作，同時提供目錄與報名兩個 port
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<RosterState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: RosterState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub async fn insert_subject(&self, subject: Subject) {
        let mut state = self.state.write().await;
        state.subjects.retain(|existing| existing.id != subject.id);
        state.subjects.push(subject);
    }

    pub async fn insert_student(&self, student: Student) {
        let mut state = self.state.write().await;
        state.students.retain(|existing| existing.id != student.id);
        state.students.push(student);
    }

    pub async fn snapshot(&self) -> RosterState {
        self.state.read().await.clone()
    }

    pub async fn audit_log(&self) -> Vec<AuditRecord> {
        self.state.read().await.audit_log.clone()
    }
}

#[async_trait]
impl CatalogDirectory for InMemoryStore {
    async fn fetch_subject_catalog(&self, subject_id: &str) -> Result<Option<Subject>> {
        Ok(self.state.read().await.subject(subject_id).cloned())
    }

    async fn fetch_active_students(&self) -> Result<Vec<Student>> {
        Ok(self.state.read().await.active_students())
    }

    async fn fetch_student(&self, student_id: &str) -> Result<Option<Student>> {
        Ok(self.state.read().await.student(student_id).cloned())
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryStore {
    async fn fetch_enrollments(&self, subject_id: &str) -> Result<Vec<Enrollment>> {
        Ok(self.state.read().await.enrollments_for(subject_id))
    }

    async fn persist_enrollment(&self, enrollment: Enrollment) -> Result<Enrollment> {
        self.state.write().await.insert_enrollment(enrollment)
    }

    async fn update_enrollment(&self, id: &str, patch: EnrollmentPatch) -> Result<Enrollment> {
        self.state.write().await.update_enrollment(id, &patch)
    }

    async fn delete_enrollment(&self, id: &str) -> Result<()> {
        self.state.write().await.delete_enrollment(id)
    }

    async fn apply_capacity_changes(
        &self,
        subject_id: &str,
        changes: &[CapacityChange],
    ) -> Result<()> {
        self.state
            .write()
            .await
            .apply_capacity_changes(subject_id, changes)
    }

    async fn append_audit(&self, record: AuditRecord) -> Result<()> {
        self.state.write().await.audit_log.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Group, Level};

    fn algebra() -> Subject {
        Subject {
            id: "algebra".to_string(),
            name: "Algebra".to_string(),
            code: "ALG-1".to_string(),
            levels: vec![Level {
                id: "l1".to_string(),
                name: "Basic".to_string(),
                current_students: 1,
                max_students: 10,
            }],
            groups: vec![Group {
                id: "a".to_string(),
                name: "A".to_string(),
                level_id: "l1".to_string(),
                current_students: 1,
                max_students: 2,
            }],
        }
    }

    fn state() -> RosterState {
        RosterState {
            subjects: vec![algebra()],
            ..Default::default()
        }
    }

    #[test]
    fn test_capacity_batch_is_all_or_nothing() {
        let mut state = state();
        let changes = vec![
            CapacityChange::increment(CapacityTarget::Level("l1".to_string()), true),
            CapacityChange::increment(CapacityTarget::Group("a".to_string()), true),
            CapacityChange::increment(CapacityTarget::Group("a".to_string()), true),
        ];

        let err = state.apply_capacity_changes("algebra", &changes).unwrap_err();
        assert!(matches!(err, RosterError::CapacityExceeded { .. }));

        let subject = state.subject("algebra").unwrap();
        assert_eq!(subject.level("l1").unwrap().current_students, 1);
        assert_eq!(subject.group("a").unwrap().current_students, 1);
    }

    #[test]
    fn test_capacity_increment_up_to_max() {
        let mut state = state();
        state
            .apply_capacity_changes(
                "algebra",
                &[CapacityChange::increment(CapacityTarget::Group("a".to_string()), true)],
            )
            .unwrap();
        assert_eq!(state.subject("algebra").unwrap().group("a").unwrap().current_students, 2);
    }

    #[test]
    fn test_unenforced_increment_may_pass_max() {
        let mut state = state();
        let change = CapacityChange::increment(CapacityTarget::Group("a".to_string()), false);
        state.apply_capacity_changes("algebra", &[change.clone()]).unwrap();
        state.apply_capacity_changes("algebra", &[change]).unwrap();
        assert_eq!(state.subject("algebra").unwrap().group("a").unwrap().current_students, 3);
    }

    #[test]
    fn test_decrement_below_zero_is_reported() {
        let mut state = state();
        let change = CapacityChange::decrement(CapacityTarget::Group("a".to_string()));
        state.apply_capacity_changes("algebra", &[change.clone()]).unwrap();
        let err = state.apply_capacity_changes("algebra", &[change]).unwrap_err();
        assert!(matches!(err, RosterError::CounterUnderflow { .. }));
        assert_eq!(state.subject("algebra").unwrap().group("a").unwrap().current_students, 0);
    }

    #[test]
    fn test_unenforced_increment_past_u32_max_is_rejected() {
        let mut state = state();
        state.subjects[0].groups[0].current_students = u32::MAX;
        let err = state
            .apply_capacity_changes(
                "algebra",
                &[CapacityChange::increment(CapacityTarget::Group("a".to_string()), false)],
            )
            .unwrap_err();

        assert!(matches!(err, RosterError::CounterOverflow { .. }));
        assert_eq!(err.kind(), crate::utils::error::ErrorKind::InvariantViolation);
        assert_eq!(
            state.subject("algebra").unwrap().group("a").unwrap().current_students,
            u32::MAX
        );
    }

    #[test]
    fn test_unknown_target_is_invalid() {
        let mut state = state();
        let err = state
            .apply_capacity_changes(
                "algebra",
                &[CapacityChange::increment(CapacityTarget::Group("zz".to_string()), true)],
            )
            .unwrap_err();
        assert!(matches!(err, RosterError::InvalidTarget { .. }));
    }

    #[tokio::test]
    async fn test_store_reports_only_active_students() {
        let store = InMemoryStore::new();
        for (id, active) in [("s1", true), ("s2", false)] {
            store
                .insert_student(Student {
                    id: id.to_string(),
                    name: id.to_uppercase(),
                    email: format!("{}@school.test", id),
                    is_active: active,
                })
                .await;
        }

        let active = store.fetch_active_students().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "s1");
        assert!(store.fetch_student("s2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_single_counter_update() {
        let store = InMemoryStore::from_state(state());
        let group = CapacityTarget::Group("a".to_string());

        store
            .update_capacity_counter("algebra", group.clone(), 1)
            .await
            .unwrap();
        let err = store
            .update_capacity_counter("algebra", group.clone(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, RosterError::CapacityExceeded { .. }));

        store
            .update_capacity_counter("algebra", group, -2)
            .await
            .unwrap();
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.subject("algebra").unwrap().group("a").unwrap().current_students, 0);
    }
}

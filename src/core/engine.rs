use crate::core::bulk::{BulkCoordinator, BulkOperation, BulkOutcome};
use crate::core::locks::SubjectLocks;
use crate::core::roster::{self, Roster};
use crate::domain::model::{
    AuditAction, AuditEntry, AuditRecord, CapacityChange, CapacityTarget, CounterDrift,
    Enrollment, EnrollmentPatch, Group, Placement, Student, Subject,
};
use crate::domain::ports::{CatalogDirectory, EnrollmentStore};
use crate::utils::error::{Result, RosterError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 呼叫端未提供備註時使用的稽核備註
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultNotes {
    pub enroll: String,
    pub transfer: String,
    pub remove: String,
}

impl Default for DefaultNotes {
    fn default() -> Self {
        Self {
            enroll: "Manual enrollment from management panel".to_string(),
            transfer: "Manual level change from management panel".to_string(),
            remove: "Manual removal from management panel".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 級別總容量滿時是否也擋下報名（組別容量一律檢查）
    pub enforce_level_cap: bool,
    pub default_notes: DefaultNotes,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enforce_level_cap: true,
            default_notes: DefaultNotes::default(),
        }
    }
}

/// 報名、轉組、退選的唯一入口。
///
/// 同一科目的所有操作（包含名單讀取）都在科目鎖內執行；容量調整另外交給
/// 儲存層做條件式批次更新，兩者一起保證計數永遠等於實際報名數。
/// 已提交的異動不會回滾，只有同一筆操作內後續寫入失敗時才會補償計數。
pub struct EnrollmentEngine<D: CatalogDirectory, S: EnrollmentStore> {
    directory: D,
    store: S,
    config: EngineConfig,
    locks: SubjectLocks,
}

impl<D: CatalogDirectory, S: EnrollmentStore> EnrollmentEngine<D, S> {
    pub fn new(directory: D, store: S) -> Self {
        Self::with_config(directory, store, EngineConfig::default())
    }

    pub fn with_config(directory: D, store: S, config: EngineConfig) -> Self {
        Self {
            directory,
            store,
            config,
            locks: SubjectLocks::new(),
        }
    }

    pub async fn enroll(
        &self,
        student_id: &str,
        subject_id: &str,
        level_id: &str,
        group_id: &str,
        note: &str,
    ) -> Result<Enrollment> {
        let _guard = self.locks.acquire(subject_id).await;
        let note = self.resolve_note(AuditAction::Enroll, note);

        let student = self
            .directory
            .fetch_student(student_id)
            .await?
            .ok_or_else(|| RosterError::invalid_target(format!("unknown student {}", student_id)))?;
        if !student.is_active {
            return Err(RosterError::StudentInactive {
                student_id: student.id,
            });
        }

        let subject = self.load_subject(subject_id).await?;
        validate_placement(&subject, level_id, group_id)?;

        let enrollments = self.store.fetch_enrollments(subject_id).await?;
        if enrollments
            .iter()
            .any(|enrollment| enrollment.student_id == student_id)
        {
            return Err(RosterError::AlreadyEnrolled {
                student_id: student_id.to_string(),
                subject_id: subject_id.to_string(),
            });
        }

        let changes = vec![
            CapacityChange::increment(
                CapacityTarget::Level(level_id.to_string()),
                self.config.enforce_level_cap,
            ),
            CapacityChange::increment(CapacityTarget::Group(group_id.to_string()), true),
        ];
        self.store
            .apply_capacity_changes(subject_id, &changes)
            .await?;

        let now = Utc::now();
        let enrollment = Enrollment {
            id: Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            subject_id: subject_id.to_string(),
            level_id: level_id.to_string(),
            group_id: group_id.to_string(),
            attendance: 0.0,
            note: note.clone(),
            audit_trail: vec![AuditEntry {
                action: AuditAction::Enroll,
                note: note.clone(),
                at: now,
            }],
            created_at: now,
            updated_at: now,
        };

        let saved = match self.store.persist_enrollment(enrollment).await {
            Ok(saved) => saved,
            Err(e) => {
                self.compensate(subject_id, &changes).await;
                return Err(e);
            }
        };

        self.record_audit(AuditRecord {
            action: AuditAction::Enroll,
            student_id: student_id.to_string(),
            subject_id: subject_id.to_string(),
            from: None,
            to: Some(saved.placement()),
            note,
            at: now,
        })
        .await;

        tracing::info!(
            subject_id,
            student_id,
            level_id,
            group_id,
            enrollment_id = %saved.id,
            "Student enrolled"
        );
        Ok(saved)
    }

    /// 轉換級別/組別。目標與目前位置相同時直接成功，不動任何計數。
    pub async fn transfer(
        &self,
        student_id: &str,
        subject_id: &str,
        level_id: &str,
        group_id: &str,
        note: &str,
    ) -> Result<Enrollment> {
        let _guard = self.locks.acquire(subject_id).await;
        let note = self.resolve_note(AuditAction::Transfer, note);

        let subject = self.load_subject(subject_id).await?;
        let current = self.find_enrollment(student_id, subject_id).await?;
        validate_placement(&subject, level_id, group_id)?;

        if current.level_id == level_id && current.group_id == group_id {
            tracing::debug!(subject_id, student_id, "Transfer target equals current placement");
            return Ok(current);
        }

        let mut changes = Vec::with_capacity(4);
        if current.level_id != level_id {
            changes.push(CapacityChange::decrement(CapacityTarget::Level(
                current.level_id.clone(),
            )));
            changes.push(CapacityChange::increment(
                CapacityTarget::Level(level_id.to_string()),
                self.config.enforce_level_cap,
            ));
        }
        changes.push(CapacityChange::decrement(CapacityTarget::Group(
            current.group_id.clone(),
        )));
        changes.push(CapacityChange::increment(
            CapacityTarget::Group(group_id.to_string()),
            true,
        ));

        // 舊計數減一與新計數加一在同一批次內完成
        self.store
            .apply_capacity_changes(subject_id, &changes)
            .await?;

        let now = Utc::now();
        let patch = EnrollmentPatch {
            level_id: level_id.to_string(),
            group_id: group_id.to_string(),
            note: note.clone(),
            updated_at: now,
            audit: Some(AuditEntry {
                action: AuditAction::Transfer,
                note: note.clone(),
                at: now,
            }),
        };

        let updated = match self.store.update_enrollment(&current.id, patch).await {
            Ok(updated) => updated,
            Err(e) => {
                self.compensate(subject_id, &changes).await;
                return Err(e);
            }
        };

        self.record_audit(AuditRecord {
            action: AuditAction::Transfer,
            student_id: student_id.to_string(),
            subject_id: subject_id.to_string(),
            from: Some(current.placement()),
            to: Some(updated.placement()),
            note,
            at: now,
        })
        .await;

        tracing::info!(
            subject_id,
            student_id,
            from_group = %current.group_id,
            to_group = group_id,
            "Student transferred"
        );
        Ok(updated)
    }

    pub async fn remove(&self, student_id: &str, subject_id: &str, note: &str) -> Result<()> {
        let _guard = self.locks.acquire(subject_id).await;
        let note = self.resolve_note(AuditAction::Remove, note);

        let current = self.find_enrollment(student_id, subject_id).await?;
        let changes = vec![
            CapacityChange::decrement(CapacityTarget::Level(current.level_id.clone())),
            CapacityChange::decrement(CapacityTarget::Group(current.group_id.clone())),
        ];

        if let Err(e) = self.store.apply_capacity_changes(subject_id, &changes).await {
            if matches!(e, RosterError::CounterUnderflow { .. }) {
                tracing::error!(subject_id, student_id, "Counter corruption detected: {}", e);
            }
            return Err(e);
        }

        if let Err(e) = self.store.delete_enrollment(&current.id).await {
            self.compensate(subject_id, &changes).await;
            return Err(e);
        }

        self.record_audit(AuditRecord {
            action: AuditAction::Remove,
            student_id: student_id.to_string(),
            subject_id: subject_id.to_string(),
            from: Some(current.placement()),
            to: None,
            note,
            at: Utc::now(),
        })
        .await;

        tracing::info!(subject_id, student_id, "Student removed");
        Ok(())
    }

    pub async fn bulk_apply(
        &self,
        operation: &BulkOperation,
        student_ids: &[String],
        subject_id: &str,
        note: &str,
    ) -> BulkOutcome {
        BulkCoordinator::new(self)
            .apply(operation, student_ids, subject_id, note)
            .await
    }

    pub async fn get_roster(&self, subject_id: &str) -> Result<Roster> {
        let _guard = self.locks.acquire(subject_id).await;
        let subject = self.load_subject(subject_id).await?;
        let enrollments = self.store.fetch_enrollments(subject_id).await?;
        Ok(Roster::build(&subject, &enrollments))
    }

    /// 未報名此科目的在籍學生（報名面板的「可選學生」）
    pub async fn available_students(&self, subject_id: &str) -> Result<Vec<Student>> {
        let roster = self.get_roster(subject_id).await?;
        let students = self.directory.fetch_active_students().await?;
        Ok(roster::available_students(&roster, students))
    }

    /// 指定級別下仍可報名的組別。啟用級別上限且級別已滿時回傳空清單。
    pub async fn open_groups(&self, subject_id: &str, level_id: &str) -> Result<Vec<Group>> {
        let _guard = self.locks.acquire(subject_id).await;
        let subject = self.load_subject(subject_id).await?;
        let level = subject.level(level_id).ok_or_else(|| {
            RosterError::invalid_target(format!(
                "level {} does not belong to subject {}",
                level_id, subject_id
            ))
        })?;
        if self.config.enforce_level_cap && !level.has_room() {
            tracing::debug!(subject_id, level_id, "Level is full, no group accepts students");
            return Ok(Vec::new());
        }
        Ok(roster::open_groups(&subject, level_id)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn check_counters(&self, subject_id: &str) -> Result<Vec<CounterDrift>> {
        let _guard = self.locks.acquire(subject_id).await;
        let subject = self.load_subject(subject_id).await?;
        let enrollments = self.store.fetch_enrollments(subject_id).await?;
        let drift = roster::counter_drift(&subject, &enrollments);
        if !drift.is_empty() {
            tracing::warn!(subject_id, drifted = drift.len(), "Capacity counters diverge from roster");
        }
        Ok(drift)
    }

    async fn load_subject(&self, subject_id: &str) -> Result<Subject> {
        self.directory
            .fetch_subject_catalog(subject_id)
            .await?
            .ok_or_else(|| RosterError::invalid_target(format!("unknown subject {}", subject_id)))
    }

    async fn find_enrollment(&self, student_id: &str, subject_id: &str) -> Result<Enrollment> {
        self.store
            .fetch_enrollments(subject_id)
            .await?
            .into_iter()
            .find(|enrollment| enrollment.student_id == student_id)
            .ok_or_else(|| RosterError::EnrollmentNotFound {
                student_id: student_id.to_string(),
                subject_id: subject_id.to_string(),
            })
    }

    fn resolve_note(&self, action: AuditAction, note: &str) -> String {
        let note = note.trim();
        if !note.is_empty() {
            return note.to_string();
        }
        let defaults = &self.config.default_notes;
        match action {
            AuditAction::Enroll => defaults.enroll.clone(),
            AuditAction::Transfer => defaults.transfer.clone(),
            AuditAction::Remove => defaults.remove.clone(),
        }
    }

    async fn compensate(&self, subject_id: &str, changes: &[CapacityChange]) {
        let inverse: Vec<CapacityChange> = changes.iter().rev().map(CapacityChange::inverse).collect();
        if let Err(e) = self.store.apply_capacity_changes(subject_id, &inverse).await {
            tracing::error!(
                subject_id,
                "Failed to restore capacity counters after a failed write: {}",
                e
            );
        }
    }

    async fn record_audit(&self, record: AuditRecord) {
        tracing::info!(
            target: "small_roster::audit",
            action = %record.action,
            subject_id = %record.subject_id,
            student_id = %record.student_id,
            note = %record.note,
            "audit"
        );
        // 異動已提交，稽核寫入失敗只記錄不回報
        if let Err(e) = self.store.append_audit(record).await {
            tracing::warn!("Failed to persist audit record: {}", e);
        }
    }
}

/// 級別與組別都必須屬於此科目，且組別隸屬於該級別
fn validate_placement(subject: &Subject, level_id: &str, group_id: &str) -> Result<Placement> {
    if subject.level(level_id).is_none() {
        return Err(RosterError::invalid_target(format!(
            "level {} does not belong to subject {}",
            level_id, subject.id
        )));
    }
    let group = subject.group(group_id).ok_or_else(|| {
        RosterError::invalid_target(format!(
            "group {} does not belong to subject {}",
            group_id, subject.id
        ))
    })?;
    if group.level_id != level_id {
        return Err(RosterError::invalid_target(format!(
            "group {} belongs to level {}, not {}",
            group_id, group.level_id, level_id
        )));
    }
    Ok(Placement::new(level_id, group_id))
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub id: String,
    pub name: String,
    pub current_students: u32,
    pub max_students: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub level_id: String,
    pub current_students: u32,
    pub max_students: u32,
}

impl Level {
    pub fn has_room(&self) -> bool {
        self.current_students < self.max_students
    }
}

impl Group {
    pub fn has_room(&self) -> bool {
        self.current_students < self.max_students
    }
}

/// 單一請求期間不變的科目快照（含各級別與組別的容量）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub levels: Vec<Level>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Subject {
    pub fn level(&self, level_id: &str) -> Option<&Level> {
        self.levels.iter().find(|level| level.id == level_id)
    }

    pub fn group(&self, group_id: &str) -> Option<&Group> {
        self.groups.iter().find(|group| group.id == group_id)
    }

    pub fn counter(&self, target: &CapacityTarget) -> Option<(u32, u32)> {
        match target {
            CapacityTarget::Level(id) => self
                .level(id)
                .map(|level| (level.current_students, level.max_students)),
            CapacityTarget::Group(id) => self
                .group(id)
                .map(|group| (group.current_students, group.max_students)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
    pub is_active: bool,
}

/// 學生在科目中的位置：級別 + 組別
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    pub level_id: String,
    pub group_id: String,
}

impl Placement {
    pub fn new(level_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            level_id: level_id.into(),
            group_id: group_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Enroll,
    Transfer,
    Remove,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditAction::Enroll => f.write_str("enroll"),
            AuditAction::Transfer => f.write_str("transfer"),
            AuditAction::Remove => f.write_str("remove"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub note: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub level_id: String,
    pub group_id: String,
    /// 出席率百分比 (0-100)
    pub attendance: f32,
    pub note: String,
    #[serde(default)]
    pub audit_trail: Vec<AuditEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Enrollment {
    pub fn placement(&self) -> Placement {
        Placement::new(self.level_id.clone(), self.group_id.clone())
    }
}

/// 轉組時寫回的欄位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentPatch {
    pub level_id: String,
    pub group_id: String,
    pub note: String,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditEntry>,
}

impl EnrollmentPatch {
    /// 套用到既有的報名紀錄；稽核項目附加到 audit_trail 尾端
    pub fn apply_to(&self, enrollment: &mut Enrollment) {
        enrollment.level_id = self.level_id.clone();
        enrollment.group_id = self.group_id.clone();
        enrollment.note = self.note.clone();
        enrollment.updated_at = self.updated_at;
        if let Some(entry) = &self.audit {
            enrollment.audit_trail.push(entry.clone());
        }
    }
}

/// 稽核日誌：每一筆人工名單異動都要留下紀錄
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: AuditAction,
    pub student_id: String,
    pub subject_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Placement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Placement>,
    pub note: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CapacityTarget {
    Level(String),
    Group(String),
}

impl fmt::Display for CapacityTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityTarget::Level(id) => write!(f, "level {}", id),
            CapacityTarget::Group(id) => write!(f, "group {}", id),
        }
    }
}

/// 一筆條件式計數調整：正數時若 `enforce_max` 則不得超過上限，負數時不得低於零
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityChange {
    pub target: CapacityTarget,
    pub delta: i32,
    pub enforce_max: bool,
}

impl CapacityChange {
    pub fn increment(target: CapacityTarget, enforce_max: bool) -> Self {
        Self {
            target,
            delta: 1,
            enforce_max,
        }
    }

    pub fn decrement(target: CapacityTarget) -> Self {
        Self {
            target,
            delta: -1,
            enforce_max: false,
        }
    }

    /// 反向調整，用於寫入失敗後的補償；補償時不檢查上限
    pub fn inverse(&self) -> Self {
        Self {
            target: self.target.clone(),
            delta: -self.delta,
            enforce_max: false,
        }
    }
}

/// 名單顯示用的投影
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentView {
    pub enrollment_id: String,
    pub student_id: String,
    pub level_id: String,
    pub level_name: String,
    pub group_id: String,
    pub group_name: String,
    pub attendance: f32,
    pub note: String,
}

/// 計數與實際報名數不一致的紀錄
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDrift {
    pub target: CapacityTarget,
    pub recorded: u32,
    pub actual: u32,
}

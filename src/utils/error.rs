use crate::domain::model::CapacityTarget;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("Student {student_id} is already enrolled in subject {subject_id}")]
    AlreadyEnrolled {
        student_id: String,
        subject_id: String,
    },

    #[error("No enrollment for student {student_id} in subject {subject_id}")]
    EnrollmentNotFound {
        student_id: String,
        subject_id: String,
    },

    #[error("Invalid target: {reason}")]
    InvalidTarget { reason: String },

    #[error("Capacity exceeded for {target}")]
    CapacityExceeded { target: CapacityTarget },

    #[error("Student {student_id} is not active")]
    StudentInactive { student_id: String },

    #[error("Counter for {target} would drop below zero")]
    CounterUnderflow { target: CapacityTarget },

    #[error("Counter for {target} would overflow")]
    CounterOverflow { target: CapacityTarget },

    #[error("Persistence failure: {message}")]
    PersistenceFailure { message: String },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },
}

pub type Result<T> = std::result::Result<T, RosterError>;

/// 對外回報的錯誤種類，批次結果中逐筆使用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AlreadyEnrolled,
    EnrollmentNotFound,
    InvalidTarget,
    CapacityExceeded,
    StudentInactive,
    PersistenceFailure,
    InvariantViolation,
    Configuration,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::AlreadyEnrolled => "AlreadyEnrolled",
            ErrorKind::EnrollmentNotFound => "EnrollmentNotFound",
            ErrorKind::InvalidTarget => "InvalidTarget",
            ErrorKind::CapacityExceeded => "CapacityExceeded",
            ErrorKind::StudentInactive => "StudentInactive",
            ErrorKind::PersistenceFailure => "PersistenceFailure",
            ErrorKind::InvariantViolation => "InvariantViolation",
            ErrorKind::Configuration => "Configuration",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Persistence,
    Integrity,
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl RosterError {
    pub fn persistence(message: impl Into<String>) -> Self {
        RosterError::PersistenceFailure {
            message: message.into(),
        }
    }

    pub fn invalid_target(reason: impl Into<String>) -> Self {
        RosterError::InvalidTarget {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RosterError::AlreadyEnrolled { .. } => ErrorKind::AlreadyEnrolled,
            RosterError::EnrollmentNotFound { .. } => ErrorKind::EnrollmentNotFound,
            RosterError::InvalidTarget { .. } => ErrorKind::InvalidTarget,
            RosterError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            RosterError::StudentInactive { .. } => ErrorKind::StudentInactive,
            RosterError::CounterUnderflow { .. } | RosterError::CounterOverflow { .. } => {
                ErrorKind::InvariantViolation
            }
            RosterError::PersistenceFailure { .. }
            | RosterError::HttpError(_)
            | RosterError::IoError(_)
            | RosterError::SerializationError(_) => ErrorKind::PersistenceFailure,
            RosterError::ConfigError { .. }
            | RosterError::InvalidConfigValueError { .. }
            | RosterError::MissingConfigError { .. }
            | RosterError::ConfigValidationError { .. } => ErrorKind::Configuration,
        }
    }

    /// 驗證類錯誤是可預期的結果，呼叫端應直接回報而非中止
    pub fn is_validation(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }

    pub fn category(&self) -> ErrorCategory {
        match self.kind() {
            ErrorKind::AlreadyEnrolled
            | ErrorKind::EnrollmentNotFound
            | ErrorKind::InvalidTarget
            | ErrorKind::CapacityExceeded
            | ErrorKind::StudentInactive => ErrorCategory::Validation,
            ErrorKind::PersistenceFailure => ErrorCategory::Persistence,
            ErrorKind::InvariantViolation => ErrorCategory::Integrity,
            ErrorKind::Configuration => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Validation => ErrorSeverity::Low,
            ErrorCategory::Persistence => ErrorSeverity::Medium,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Integrity => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.kind() {
            ErrorKind::AlreadyEnrolled => "Use transfer to move the student to another group",
            ErrorKind::EnrollmentNotFound => "Refresh the roster; the student may already be removed",
            ErrorKind::InvalidTarget => "Check that the level and group belong to the subject",
            ErrorKind::CapacityExceeded => "Pick a group with free seats or raise its capacity",
            ErrorKind::StudentInactive => "Reactivate the student in the user directory first",
            ErrorKind::PersistenceFailure => "Check store connectivity and retry the operation",
            ErrorKind::InvariantViolation => "Run `check` on the subject and repair its counters",
            ErrorKind::Configuration => "Review the configuration file and environment variables",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            RosterError::CapacityExceeded { target } => {
                format!("{} is full, no seats left", target)
            }
            RosterError::HttpError(_) | RosterError::IoError(_) | RosterError::SerializationError(_) => {
                format!("The roster store could not be reached: {}", self)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_errors_classify_as_persistence() {
        let io = RosterError::from(std::io::Error::other("disk gone"));
        assert_eq!(io.kind(), ErrorKind::PersistenceFailure);
        assert_eq!(io.severity(), ErrorSeverity::Medium);
        assert!(!io.is_validation());
    }

    #[test]
    fn test_validation_errors_are_low_severity() {
        let err = RosterError::CapacityExceeded {
            target: CapacityTarget::Group("g1".to_string()),
        };
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert!(err.is_validation());
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert!(err.user_friendly_message().contains("group g1"));
    }

    #[test]
    fn test_underflow_is_an_invariant_violation() {
        let err = RosterError::CounterUnderflow {
            target: CapacityTarget::Level("l1".to_string()),
        };
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::EnrollmentNotFound).unwrap();
        assert_eq!(json, "\"enrollment_not_found\"");
    }
}

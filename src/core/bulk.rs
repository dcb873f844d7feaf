use crate::core::engine::EnrollmentEngine;
use crate::domain::model::Placement;
use crate::domain::ports::{CatalogDirectory, EnrollmentStore};
use crate::utils::error::ErrorKind;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOperation {
    Enroll(Placement),
    Transfer(Placement),
    Remove,
}

impl BulkOperation {
    pub fn name(&self) -> &'static str {
        match self {
            BulkOperation::Enroll(_) => "enroll",
            BulkOperation::Transfer(_) => "transfer",
            BulkOperation::Remove => "remove",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub student_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub successes: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkOutcome {
    pub fn total(&self) -> usize {
        self.successes + self.failures.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary(&self) -> String {
        format!("{} of {} succeeded", self.successes, self.total())
    }
}

/// 對一組學生逐一套用同一個引擎操作。
///
/// 依輸入順序執行，單一學生失敗不會中止整批；重複的學生 ID 會各自執行一次。
/// 沒有跨學生的回滾：中途放棄（丟棄 future）時，已完成的異動維持有效。
pub struct BulkCoordinator<'a, D: CatalogDirectory, S: EnrollmentStore> {
    engine: &'a EnrollmentEngine<D, S>,
}

impl<'a, D: CatalogDirectory, S: EnrollmentStore> BulkCoordinator<'a, D, S> {
    pub fn new(engine: &'a EnrollmentEngine<D, S>) -> Self {
        Self { engine }
    }

    pub async fn apply(
        &self,
        operation: &BulkOperation,
        student_ids: &[String],
        subject_id: &str,
        note: &str,
    ) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();

        for student_id in student_ids {
            let result = match operation {
                BulkOperation::Enroll(target) => self
                    .engine
                    .enroll(student_id, subject_id, &target.level_id, &target.group_id, note)
                    .await
                    .map(|_| ()),
                BulkOperation::Transfer(target) => self
                    .engine
                    .transfer(student_id, subject_id, &target.level_id, &target.group_id, note)
                    .await
                    .map(|_| ()),
                BulkOperation::Remove => self.engine.remove(student_id, subject_id, note).await,
            };

            match result {
                Ok(()) => outcome.successes += 1,
                Err(e) => {
                    tracing::warn!(
                        subject_id,
                        student_id = %student_id,
                        operation = operation.name(),
                        "Bulk step failed: {}",
                        e
                    );
                    outcome.failures.push(BulkFailure {
                        student_id: student_id.clone(),
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            subject_id,
            operation = operation.name(),
            "Bulk {}: {}",
            operation.name(),
            outcome.summary()
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_outcome_summary() {
        let outcome = BulkOutcome::default();
        assert_eq!(outcome.total(), 0);
        assert!(outcome.is_complete_success());
        assert_eq!(outcome.summary(), "0 of 0 succeeded");
    }

    #[test]
    fn test_summary_counts_failures() {
        let outcome = BulkOutcome {
            successes: 2,
            failures: vec![BulkFailure {
                student_id: "s2".to_string(),
                kind: ErrorKind::EnrollmentNotFound,
                message: "missing".to_string(),
            }],
        };
        assert_eq!(outcome.summary(), "2 of 3 succeeded");
        assert!(!outcome.is_complete_success());
    }
}

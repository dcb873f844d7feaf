use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

type SubjectMutex = Arc<tokio::sync::Mutex<()>>;

/// 每個科目一把非同步鎖。同一科目的操作依序執行，不同科目互不阻塞。
///
/// 沒有持有者也沒有等待者的項目在釋放時移除，表格大小只跟同時操作中的科目數有關。
#[derive(Debug, Default)]
pub struct SubjectLocks {
    locks: Mutex<HashMap<String, SubjectMutex>>,
}

/// 持有期間獨占該科目；釋放時順便清理無人使用的項目
pub struct SubjectGuard<'a> {
    registry: &'a SubjectLocks,
    subject_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SubjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, subject_id: &str) -> SubjectGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(subject_id.to_string()).or_default().clone()
        };
        SubjectGuard {
            registry: self,
            subject_id: subject_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, subject_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // 表格本身持有唯一一份參考時，沒有人在等這把鎖
        if locks
            .get(subject_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(subject_id);
        }
    }
}

impl Drop for SubjectGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.registry.release(&self.subject_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_subject_is_serialized() {
        let locks = Arc::new(SubjectLocks::new());
        let guard = locks.acquire("algebra").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("algebra").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_subjects_do_not_block() {
        let locks = SubjectLocks::new();
        let _algebra = locks.acquire("algebra").await;
        let physics = tokio::time::timeout(Duration::from_millis(50), locks.acquire("physics")).await;
        assert!(physics.is_ok());
    }

    #[tokio::test]
    async fn test_released_subjects_are_forgotten() {
        let locks = SubjectLocks::new();
        for i in 0..100 {
            let _guard = locks.acquire(&format!("subject-{}", i)).await;
        }
        assert!(locks.is_empty());

        let _held = locks.acquire("algebra").await;
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_entry_survives_while_a_waiter_is_queued() {
        let locks = Arc::new(SubjectLocks::new());
        let first = locks.acquire("algebra").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("algebra").await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        // 等待者仍持有參考，項目不可被移除
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}

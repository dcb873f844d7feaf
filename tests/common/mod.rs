#![allow(dead_code)]

use small_roster::core::roster::counter_drift;
use small_roster::domain::model::{Group, Level, Student, Subject};
use small_roster::{EngineConfig, EnrollmentEngine, InMemoryStore};

pub const SUBJECT: &str = "algebra";

pub fn level(id: &str, name: &str, max_students: u32) -> Level {
    Level {
        id: id.to_string(),
        name: name.to_string(),
        current_students: 0,
        max_students,
    }
}

pub fn group(id: &str, level_id: &str, max_students: u32) -> Group {
    Group {
        id: id.to_string(),
        name: id.to_uppercase(),
        level_id: level_id.to_string(),
        current_students: 0,
        max_students,
    }
}

/// Algebra: l1 (Basic) 有 a(2)、b(5) 兩組；l2 (Advanced) 有 c(5)
pub fn algebra() -> Subject {
    Subject {
        id: SUBJECT.to_string(),
        name: "Algebra".to_string(),
        code: "ALG-101".to_string(),
        levels: vec![level("l1", "Basic", 10), level("l2", "Advanced", 10)],
        groups: vec![group("a", "l1", 2), group("b", "l1", 5), group("c", "l2", 5)],
    }
}

pub fn student(id: &str, is_active: bool) -> Student {
    Student {
        id: id.to_string(),
        name: format!("Student {}", id),
        email: format!("{}@school.test", id),
        is_active,
    }
}

pub async fn store_with(subject: Subject, student_ids: &[&str]) -> InMemoryStore {
    let store = InMemoryStore::new();
    store.insert_subject(subject).await;
    for id in student_ids {
        store.insert_student(student(id, true)).await;
    }
    store.insert_student(student("inactive", false)).await;
    store
}

pub fn engine_for(
    store: &InMemoryStore,
    config: EngineConfig,
) -> EnrollmentEngine<InMemoryStore, InMemoryStore> {
    EnrollmentEngine::with_config(store.clone(), store.clone(), config)
}

pub async fn setup(student_ids: &[&str]) -> (EnrollmentEngine<InMemoryStore, InMemoryStore>, InMemoryStore) {
    let store = store_with(algebra(), student_ids).await;
    let engine = engine_for(&store, EngineConfig::default());
    (engine, store)
}

pub async fn group_count(store: &InMemoryStore, group_id: &str) -> u32 {
    let state = store.snapshot().await;
    state
        .subject(SUBJECT)
        .and_then(|subject| subject.group(group_id))
        .map(|group| group.current_students)
        .unwrap_or_default()
}

pub async fn level_count(store: &InMemoryStore, level_id: &str) -> u32 {
    let state = store.snapshot().await;
    state
        .subject(SUBJECT)
        .and_then(|subject| subject.level(level_id))
        .map(|level| level.current_students)
        .unwrap_or_default()
}

/// 計數必須等於實際報名數，且每位學生在科目內最多一筆
pub async fn assert_invariants(store: &InMemoryStore) {
    let state = store.snapshot().await;
    let subject = state.subject(SUBJECT).expect("subject present");
    let enrollments = state.enrollments_for(SUBJECT);

    let drift = counter_drift(subject, &enrollments);
    assert!(drift.is_empty(), "counters diverged: {:?}", drift);

    let mut students: Vec<&str> = enrollments.iter().map(|e| e.student_id.as_str()).collect();
    let total = students.len();
    students.sort_unstable();
    students.dedup();
    assert_eq!(students.len(), total, "duplicate enrollment for a student");
}

use crate::domain::model::{
    CapacityTarget, CounterDrift, Enrollment, EnrollmentView, Group, Student, Subject,
};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

const UNKNOWN_NAME: &str = "Unknown";

/// 科目目前的報名名單投影，純讀取，不做任何寫入
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Roster {
    pub subject_id: String,
    pub views: Vec<EnrollmentView>,
    pub enrolled_student_ids: BTreeSet<String>,
}

impl Roster {
    pub fn build(subject: &Subject, enrollments: &[Enrollment]) -> Self {
        let views: Vec<EnrollmentView> = enrollments
            .iter()
            .filter(|enrollment| enrollment.subject_id == subject.id)
            .map(|enrollment| EnrollmentView {
                enrollment_id: enrollment.id.clone(),
                student_id: enrollment.student_id.clone(),
                level_id: enrollment.level_id.clone(),
                level_name: subject
                    .level(&enrollment.level_id)
                    .map(|level| level.name.clone())
                    .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
                group_id: enrollment.group_id.clone(),
                group_name: subject
                    .group(&enrollment.group_id)
                    .map(|group| group.name.clone())
                    .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
                attendance: enrollment.attendance,
                note: enrollment.note.clone(),
            })
            .collect();

        let enrolled_student_ids = views.iter().map(|view| view.student_id.clone()).collect();

        Self {
            subject_id: subject.id.clone(),
            views,
            enrolled_student_ids,
        }
    }

    pub fn is_enrolled(&self, student_id: &str) -> bool {
        self.enrolled_student_ids.contains(student_id)
    }

    pub fn find(&self, student_id: &str) -> Option<&EnrollmentView> {
        self.views.iter().find(|view| view.student_id == student_id)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

/// 尚未報名此科目的在籍學生
pub fn available_students(roster: &Roster, students: Vec<Student>) -> Vec<Student> {
    students
        .into_iter()
        .filter(|student| student.is_active && !roster.is_enrolled(&student.id))
        .collect()
}

/// 指定級別下仍有空位的組別
pub fn open_groups<'a>(subject: &'a Subject, level_id: &str) -> Vec<&'a Group> {
    subject
        .groups
        .iter()
        .filter(|group| group.level_id == level_id && group.has_room())
        .collect()
}

/// 比對記錄的計數與實際報名數，回傳所有不一致的級別與組別
pub fn counter_drift(subject: &Subject, enrollments: &[Enrollment]) -> Vec<CounterDrift> {
    let mut level_counts: HashMap<&str, u32> = HashMap::new();
    let mut group_counts: HashMap<&str, u32> = HashMap::new();
    for enrollment in enrollments
        .iter()
        .filter(|enrollment| enrollment.subject_id == subject.id)
    {
        *level_counts.entry(enrollment.level_id.as_str()).or_default() += 1;
        *group_counts.entry(enrollment.group_id.as_str()).or_default() += 1;
    }

    let levels = subject.levels.iter().filter_map(|level| {
        let actual = level_counts.get(level.id.as_str()).copied().unwrap_or(0);
        (actual != level.current_students).then(|| CounterDrift {
            target: CapacityTarget::Level(level.id.clone()),
            recorded: level.current_students,
            actual,
        })
    });
    let groups = subject.groups.iter().filter_map(|group| {
        let actual = group_counts.get(group.id.as_str()).copied().unwrap_or(0);
        (actual != group.current_students).then(|| CounterDrift {
            target: CapacityTarget::Group(group.id.clone()),
            recorded: group.current_students,
            actual,
        })
    });

    levels.chain(groups).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Level;
    use chrono::Utc;

    fn subject() -> Subject {
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
            groups: vec![
                Group {
                    id: "a".to_string(),
                    name: "A".to_string(),
                    level_id: "l1".to_string(),
                    current_students: 1,
                    max_students: 1,
                },
                Group {
                    id: "b".to_string(),
                    name: "B".to_string(),
                    level_id: "l1".to_string(),
                    current_students: 0,
                    max_students: 3,
                },
            ],
        }
    }

    fn enrollment(student_id: &str, group_id: &str) -> Enrollment {
        let now = Utc::now();
        Enrollment {
            id: format!("e-{}", student_id),
            student_id: student_id.to_string(),
            subject_id: "algebra".to_string(),
            level_id: "l1".to_string(),
            group_id: group_id.to_string(),
            attendance: 87.5,
            note: "seed".to_string(),
            audit_trail: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn student(id: &str, is_active: bool) -> Student {
        Student {
            id: id.to_string(),
            name: id.to_string(),
            email: format!("{}@school.test", id),
            is_active,
        }
    }

    #[test]
    fn test_build_resolves_names() {
        let roster = Roster::build(&subject(), &[enrollment("s1", "a"), enrollment("s2", "zz")]);

        assert_eq!(roster.len(), 2);
        assert!(roster.is_enrolled("s1"));
        let s1 = roster.find("s1").unwrap();
        assert_eq!(s1.level_name, "Basic");
        assert_eq!(s1.group_name, "A");
        assert_eq!(roster.find("s2").unwrap().group_name, "Unknown");
    }

    #[test]
    fn test_available_students_excludes_enrolled_and_inactive() {
        let roster = Roster::build(&subject(), &[enrollment("s1", "a")]);
        let available = available_students(
            &roster,
            vec![student("s1", true), student("s2", true), student("s3", false)],
        );
        let ids: Vec<&str> = available.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s2"]);
    }

    #[test]
    fn test_open_groups_skips_full_groups() {
        let subject = subject();
        let open: Vec<&str> = open_groups(&subject, "l1").iter().map(|g| g.id.as_str()).collect();
        assert_eq!(open, vec!["b"]);
        assert!(open_groups(&subject, "l2").is_empty());
    }

    #[test]
    fn test_counter_drift_detects_mismatch() {
        let subject = subject();
        assert!(counter_drift(&subject, &[enrollment("s1", "a")]).is_empty());

        let drift = counter_drift(&subject, &[enrollment("s1", "b")]);
        assert_eq!(
            drift,
            vec![
                CounterDrift {
                    target: CapacityTarget::Group("a".to_string()),
                    recorded: 1,
                    actual: 0,
                },
                CounterDrift {
                    target: CapacityTarget::Group("b".to_string()),
                    recorded: 0,
                    actual: 1,
                },
            ]
        );
    }
}

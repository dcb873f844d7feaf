pub mod bulk;
pub mod engine;
pub mod locks;
pub mod roster;

pub use crate::domain::model::{Enrollment, EnrollmentView, Placement, Student, Subject};
pub use crate::domain::ports::{CatalogDirectory, EnrollmentStore, Storage};
pub use crate::utils::error::Result;

pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::CliConfig;

pub use adapters::{InMemoryStore, JsonFileStore, LocalStorage, RestStore, RosterState};
pub use config::TomlConfig;
pub use core::bulk::{BulkCoordinator, BulkFailure, BulkOperation, BulkOutcome};
pub use core::engine::{EngineConfig, EnrollmentEngine};
pub use core::roster::Roster;
pub use utils::error::{ErrorKind, Result, RosterError};

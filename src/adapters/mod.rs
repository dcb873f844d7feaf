// Adapters layer: concrete implementations of the domain ports (memory, JSON file, REST).

pub mod json_file;
pub mod local_storage;
pub mod memory;
pub mod rest;

pub use json_file::JsonFileStore;
pub use local_storage::LocalStorage;
pub use memory::{InMemoryStore, RosterState};
pub use rest::RestStore;

pub mod cleanup_service;
pub mod database;
pub mod memory;
pub mod repositories;

pub use cleanup_service::{RetentionReport, RetentionSweeper};
pub use database::*;
pub use memory::*;
pub use repositories::{InMemoryRepositories, Repositories};

pub mod calculation;
pub mod entities;
pub mod hashing;
pub mod repositories;
pub mod value_objects;

// SQLx 实现（仅在启用 sqlx-support feature 时编译）
#[cfg(feature = "sqlx-support")]
pub mod sqlx_impls;

pub use calculation::{compute, CalculationOutcome, CalculationWarning, TiebreakConfig};
pub use entities::*;
pub use hashing::{payload_checksum, state_hash};
pub use repositories::*;
pub use standings_errors::{ErrorKind, StandingsError, StandingsResult};
pub use value_objects::*;

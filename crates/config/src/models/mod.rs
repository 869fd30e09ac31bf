pub mod api_observability;
pub mod app_config;
pub mod database;
pub mod logging;
pub mod maintenance;
pub mod queue;
pub mod worker;

pub use api_observability::*;
pub use app_config::*;
pub use database::*;
pub use logging::*;
pub use maintenance::*;
pub use queue::*;
pub use worker::*;

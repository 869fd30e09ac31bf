pub mod lease_heartbeat;
pub mod recalculation;
pub mod worker_lifecycle;
pub mod worker_pool;

pub use lease_heartbeat::LeaseHeartbeat;
pub use recalculation::RecalculationExecutor;
pub use worker_lifecycle::RecalculationWorker;
pub use worker_pool::WorkerPool;

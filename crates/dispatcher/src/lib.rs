//! 调度核心
//!
//! 任务队列、重试策略、租约回收、快照管理、审计日志和运行状况视图。
//! worker 与 HTTP 层都只通过这里操作持久化状态。

pub mod audit_logger;
pub mod health_monitor;
pub mod job_queue;
pub mod recovery_service;
pub mod retry_service;
pub mod snapshot_manager;

pub use audit_logger::{AuditLogger, AuditRecord};
pub use health_monitor::{ComponentHealth, HealthMonitor, QueueHealth, QueueStatusGroup, SystemHealth};
pub use job_queue::JobQueue;
pub use recovery_service::{LeaseRecoveryService, RecoveryReport};
pub use retry_service::{retry_transient, RetryDecision, RetryPolicy};
pub use snapshot_manager::SnapshotManager;

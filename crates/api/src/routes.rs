use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use standings_dispatcher::{AuditLogger, HealthMonitor, JobQueue, SnapshotManager};
use standings_infrastructure::RetentionSweeper;

use crate::handlers::{
    health::health_check,
    jobs::{cancel_job, enqueue_job, force_enqueue_job, get_job, list_jobs},
    standings::{audit_history, get_standings, list_snapshots, restore_snapshot},
    system::{queue_health, run_retention, system_health},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<JobQueue>,
    pub snapshots: Arc<SnapshotManager>,
    pub audit: Arc<AuditLogger>,
    pub health: Arc<HealthMonitor>,
    pub sweeper: Arc<RetentionSweeper>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // 重算任务
        .route("/api/jobs", get(list_jobs).post(enqueue_job))
        .route("/api/jobs/force", post(force_enqueue_job))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/jobs/{id}/cancel", post(cancel_job))
        // 积分榜、快照与审计
        .route("/api/standings/{league}/{season}", get(get_standings))
        .route("/api/standings/{league}/{season}/snapshots", get(list_snapshots))
        .route("/api/standings/{league}/{season}/audit", get(audit_history))
        .route("/api/snapshots/{id}/restore", post(restore_snapshot))
        // 监控与运维
        .route("/api/monitoring/queue", get(queue_health))
        .route("/api/monitoring/system", get(system_health))
        .route("/api/maintenance/retention", post(run_retention))
        .with_state(state)
}

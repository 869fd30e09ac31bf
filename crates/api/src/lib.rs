//! # Standings API
//!
//! 积分榜系统的 HTTP 接口，基于 Axum。
//!
//! ## API 端点
//!
//! ### 重算任务
//! - `POST /api/jobs` - 请求重算，已有未完成任务时合并
//! - `POST /api/jobs/force` - 以强制优先级入队
//! - `GET /api/jobs` - 任务列表，支持 `league_id`/`season_id`/`status`/`limit`/`offset`
//! - `GET /api/jobs/{id}` - 任务详情
//! - `POST /api/jobs/{id}/cancel` - 取消等待中的任务
//!
//! ### 积分榜
//! - `GET /api/standings/{league}/{season}` - 当前已提交的积分榜
//! - `GET /api/standings/{league}/{season}/snapshots` - 快照列表
//! - `GET /api/standings/{league}/{season}/audit` - 审计记录
//! - `POST /api/snapshots/{id}/restore` - 人工从快照恢复
//!
//! ### 监控与运维
//! - `GET /api/monitoring/queue` - 按状态和优先级聚合的队列视图
//! - `GET /api/monitoring/system` - 各组件计数
//! - `POST /api/maintenance/retention` - 立即执行保留期清理
//!
//! ## 响应格式
//!
//! ```json
//! { "success": true, "data": { ... }, "message": null, "timestamp": "2024-01-01T00:00:00Z" }
//! ```
//!
//! 错误：
//!
//! ```json
//! { "success": false, "error": { "code": "JOB_NOT_FOUND", "message": "任务未找到: 42" } }
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;
use standings_config::ApiConfig;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, timeout_layer, trace_layer};
pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState, api_config: &ApiConfig) -> Router {
    let router = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(timeout_layer(api_config))
            .layer(axum::middleware::from_fn(request_logging)),
    );

    if api_config.cors_enabled {
        router.layer(cors_layer(api_config))
    } else {
        router
    }
}

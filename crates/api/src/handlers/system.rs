use axum::{extract::State, response::IntoResponse};

use crate::{error::ApiResult, response::success, routes::AppState};

pub async fn queue_health(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.health.queue_health().await?))
}

pub async fn system_health(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.health.system_health().await?))
}

/// 立即执行一次保留期清理
pub async fn run_retention(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let report = state.sweeper.run_once().await?;
    Ok(success(report))
}

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use standings_domain::{JobFilter, JobStatus};

use crate::{
    error::{ApiError, ApiResult},
    response::{created, success, ApiResponse},
    routes::AppState,
};

/// 入队请求
#[derive(Debug, Deserialize)]
pub struct EnqueueJobRequest {
    pub league_id: i64,
    pub season_id: i64,
    pub priority: Option<i32>,
    pub reason: String,
}

/// 强制入队请求，优先级由配置决定
#[derive(Debug, Deserialize)]
pub struct ForceEnqueueRequest {
    pub league_id: i64,
    pub season_id: i64,
    pub reason: Option<String>,
}

/// 任务查询参数
#[derive(Debug, Default, Deserialize)]
pub struct JobQueryParams {
    pub league_id: Option<i64>,
    pub season_id: Option<i64>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl JobQueryParams {
    fn into_filter(self) -> ApiResult<JobFilter> {
        let status = self
            .status
            .map(|s| s.parse::<JobStatus>())
            .transpose()
            .map_err(ApiError::BadRequest)?;

        Ok(JobFilter {
            league_id: self.league_id,
            season_id: self.season_id,
            status,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

pub async fn enqueue_job(
    State(state): State<AppState>,
    Json(request): Json<EnqueueJobRequest>,
) -> ApiResult<impl IntoResponse> {
    let priority = request
        .priority
        .unwrap_or(state.queue.config().default_priority);
    let outcome = state
        .queue
        .enqueue(request.league_id, request.season_id, priority, &request.reason)
        .await?;

    let message = if outcome.created {
        "已创建重算任务"
    } else {
        "已合并到现有任务"
    };
    Ok(created(outcome, message))
}

pub async fn force_enqueue_job(
    State(state): State<AppState>,
    Json(request): Json<ForceEnqueueRequest>,
) -> ApiResult<impl IntoResponse> {
    let reason = request.reason.as_deref().unwrap_or("force_enqueue");
    let outcome = state
        .queue
        .force_enqueue(request.league_id, request.season_id, reason)
        .await?;
    Ok(created(outcome, "已强制入队"))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let filter = params.into_filter()?;
    let jobs = state.queue.list(&filter).await?;
    Ok(success(jobs))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let job = state.queue.get(id).await?;
    Ok(success(job))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.queue.cancel(id).await?;
    Ok(ApiResponse::success_empty_with_message(format!("任务 {id} 已取消")))
}

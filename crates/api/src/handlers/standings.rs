use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use standings_domain::{Actor, StandingsKey};
use tracing::info;

use crate::{
    error::{ApiError, ApiResult},
    response::{success, ApiResponse},
    routes::AppState,
};

const DEFAULT_SNAPSHOT_LIMIT: i64 = 20;
const DEFAULT_AUDIT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

impl LimitParams {
    fn resolve(&self, default: i64) -> ApiResult<i64> {
        match self.limit {
            None => Ok(default),
            Some(limit) if (1..=MAX_LIMIT).contains(&limit) => Ok(limit),
            Some(limit) => Err(ApiError::BadRequest(format!(
                "limit 必须在 1 到 {MAX_LIMIT} 之间: {limit}"
            ))),
        }
    }
}

/// 当前已提交的积分榜，重算进行中时仍返回上一次提交的完整结果
pub async fn get_standings(
    State(state): State<AppState>,
    Path((league_id, season_id)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let table = state
        .snapshots
        .current(StandingsKey::new(league_id, season_id))
        .await?;
    Ok(success(table))
}

pub async fn list_snapshots(
    State(state): State<AppState>,
    Path((league_id, season_id)): Path<(i64, i64)>,
    Query(params): Query<LimitParams>,
) -> ApiResult<impl IntoResponse> {
    let limit = params.resolve(DEFAULT_SNAPSHOT_LIMIT)?;
    let snapshots = state
        .snapshots
        .list(StandingsKey::new(league_id, season_id), limit)
        .await?;
    Ok(success(snapshots))
}

pub async fn restore_snapshot(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let table = state.snapshots.restore(id, Actor::Manual, None).await?;
    info!("通过 API 从快照 {} 恢复积分榜，当前版本 {}", id, table.version);
    Ok(ApiResponse::success_with_message(
        table,
        format!("已从快照 {id} 恢复"),
    ))
}

pub async fn audit_history(
    State(state): State<AppState>,
    Path((league_id, season_id)): Path<(i64, i64)>,
    Query(params): Query<LimitParams>,
) -> ApiResult<impl IntoResponse> {
    let limit = params.resolve(DEFAULT_AUDIT_LIMIT)?;
    let entries = state
        .audit
        .history(StandingsKey::new(league_id, season_id), limit)
        .await?;
    Ok(success(entries))
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use standings_errors::StandingsError;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Standings(#[from] StandingsError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Standings(err) => {
                let status = match err {
                    StandingsError::JobNotFound { .. } | StandingsError::SnapshotNotFound { .. } => {
                        StatusCode::NOT_FOUND
                    }
                    StandingsError::InvalidTransition { .. }
                    | StandingsError::LockConflict { .. }
                    | StandingsError::VersionConflict { .. } => StatusCode::CONFLICT,
                    StandingsError::ValidationError(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!("请求处理失败: {}", self);
        }

        let body = Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": self.to_string(),
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

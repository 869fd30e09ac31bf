use thiserror::Error;

/// 错误分类：决定 worker 遇到错误时是重试、降级还是终止
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O 超时、锁冲突、租约竞争，可自动重试
    Transient,
    /// 输入数据问题，不影响其他数据
    Data,
    /// 快照损坏、存储不可用、不变量被破坏，立即终止并回滚
    Fatal,
}

#[derive(Debug, Error)]
pub enum StandingsError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("任务未找到: {id}")]
    JobNotFound { id: i64 },
    #[error("快照未找到: {id}")]
    SnapshotNotFound { id: i64 },
    #[error("任务 {job_id} 已被其他 worker 抢占")]
    LockConflict { job_id: i64 },
    #[error("积分榜版本冲突: 联赛 {league_id} 赛季 {season_id} 期望版本 {expected}, 实际版本 {actual}")]
    VersionConflict {
        league_id: i64,
        season_id: i64,
        expected: i64,
        actual: i64,
    },
    #[error("非法的状态迁移: 任务 {id} 从 {from} 到 {to}")]
    InvalidTransition { id: i64, from: String, to: String },
    #[error("快照 {id} 已损坏: {reason}")]
    SnapshotCorrupted { id: i64, reason: String },
    #[error("不变量被破坏: {0}")]
    InvariantViolation(String),
    #[error("存储不可用: {0}")]
    StorageUnavailable(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("数据验证失败: {0}")]
    ValidationError(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type StandingsResult<T> = Result<T, StandingsError>;

impl StandingsError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn job_not_found(id: i64) -> Self {
        Self::JobNotFound { id }
    }
    pub fn snapshot_not_found(id: i64) -> Self {
        Self::SnapshotNotFound { id }
    }
    pub fn invalid_transition<F: ToString, T: ToString>(id: i64, from: F, to: T) -> Self {
        Self::InvalidTransition {
            id,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StandingsError::Database(e) => classify_sqlx_error(e),
            StandingsError::DatabaseOperation(_)
            | StandingsError::LockConflict { .. }
            | StandingsError::VersionConflict { .. }
            | StandingsError::Timeout(_) => ErrorKind::Transient,
            StandingsError::JobNotFound { .. }
            | StandingsError::SnapshotNotFound { .. }
            | StandingsError::InvalidTransition { .. }
            | StandingsError::ValidationError(_) => ErrorKind::Data,
            StandingsError::SnapshotCorrupted { .. }
            | StandingsError::InvariantViolation(_)
            | StandingsError::StorageUnavailable(_)
            | StandingsError::Serialization(_)
            | StandingsError::Configuration(_)
            | StandingsError::Internal(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }

    /// 对外展示的简短错误码
    pub fn code(&self) -> &'static str {
        match self {
            StandingsError::Database(_) | StandingsError::DatabaseOperation(_) => "DATABASE_ERROR",
            StandingsError::JobNotFound { .. } => "JOB_NOT_FOUND",
            StandingsError::SnapshotNotFound { .. } => "SNAPSHOT_NOT_FOUND",
            StandingsError::LockConflict { .. } => "LOCK_CONFLICT",
            StandingsError::VersionConflict { .. } => "VERSION_CONFLICT",
            StandingsError::InvalidTransition { .. } => "INVALID_TRANSITION",
            StandingsError::SnapshotCorrupted { .. } => "SNAPSHOT_CORRUPTED",
            StandingsError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            StandingsError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            StandingsError::Timeout(_) => "TIMEOUT",
            StandingsError::Serialization(_) => "SERIALIZATION_ERROR",
            StandingsError::Configuration(_) => "CONFIGURATION_ERROR",
            StandingsError::ValidationError(_) => "VALIDATION_ERROR",
            StandingsError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// SQLite 的 BUSY(5) / LOCKED(6) 以及唯一约束冲突都属于并发竞争，可以重试
fn classify_sqlx_error(err: &sqlx::Error) -> ErrorKind {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => ErrorKind::Transient,
        sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => ErrorKind::Fatal,
        sqlx::Error::RowNotFound => ErrorKind::Data,
        sqlx::Error::Database(db_err) => {
            if db_err.is_unique_violation() {
                return ErrorKind::Transient;
            }
            match db_err.code().as_deref() {
                Some("5") | Some("6") | Some("261") | Some("517") => ErrorKind::Transient,
                _ => ErrorKind::Fatal,
            }
        }
        _ => ErrorKind::Fatal,
    }
}

impl From<serde_json::Error> for StandingsError {
    fn from(err: serde_json::Error) -> Self {
        StandingsError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for StandingsError {
    fn from(err: anyhow::Error) -> Self {
        StandingsError::Internal(err.to_string())
    }
}

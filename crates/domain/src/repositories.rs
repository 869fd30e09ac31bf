//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，SQLite 与内存两套实现位于 infrastructure crate

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use standings_errors::StandingsResult;

use crate::entities::{
    AuditLogEntry, EnqueueOutcome, EnqueueRequest, Job, JobFilter, JobResult, MatchSet, Snapshot,
    StandingsEntry, StandingsTable,
};
use crate::value_objects::StandingsKey;

/// 任务仓储抽象
///
/// 所有状态迁移都是条件更新：当前状态不符时返回 `InvalidTransition`，
/// 任务不存在时返回 `JobNotFound`。
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 原子地合并到已有的非终态任务，或创建新的 PENDING 任务
    async fn upsert_active(
        &self,
        request: &EnqueueRequest,
        now: DateTime<Utc>,
    ) -> StandingsResult<EnqueueOutcome>;
    async fn get_by_id(&self, id: i64) -> StandingsResult<Option<Job>>;
    /// 按创建时间倒序
    async fn list(&self, filter: &JobFilter) -> StandingsResult<Vec<Job>>;
    /// 可领取的任务中优先级最高、创建最早的一个
    async fn find_next_pending(&self, now: DateTime<Utc>) -> StandingsResult<Option<Job>>;
    /// PENDING -> PROCESSING 的条件更新，被其他 worker 抢先时返回 `None`
    async fn try_claim(
        &self,
        id: i64,
        worker_id: &str,
        lease_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StandingsResult<Option<Job>>;
    /// 延长仍由该 worker 持有的租约，任务已被回收或转交时返回 `false`
    async fn renew_lease(
        &self,
        id: i64,
        worker_id: &str,
        lease_expires_at: DateTime<Utc>,
    ) -> StandingsResult<bool>;
    async fn find_processing_for_key(&self, key: StandingsKey) -> StandingsResult<Vec<Job>>;
    async fn mark_completed(
        &self,
        id: i64,
        result: &JobResult,
        now: DateTime<Utc>,
    ) -> StandingsResult<Job>;
    /// PROCESSING -> PENDING，退避到 `available_at` 之后才能再次领取
    async fn mark_retry(
        &self,
        id: i64,
        attempts: i32,
        error: &str,
        available_at: DateTime<Utc>,
    ) -> StandingsResult<Job>;
    async fn mark_failed(
        &self,
        id: i64,
        attempts: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> StandingsResult<Job>;
    async fn find_expired_leases(&self, now: DateTime<Utc>) -> StandingsResult<Vec<Job>>;
    /// 只删除 PENDING 任务，其他状态返回 `InvalidTransition`
    async fn delete_pending(&self, id: i64) -> StandingsResult<()>;
    /// 删除 `completed_at` 早于 cutoff 的终态任务，返回删除条数
    async fn delete_terminal_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> StandingsResult<u64>;
}

/// 快照仓储抽象，快照只增不改
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn create(&self, snapshot: &Snapshot) -> StandingsResult<Snapshot>;
    async fn get_by_id(&self, id: i64) -> StandingsResult<Option<Snapshot>>;
    async fn latest_for(&self, key: StandingsKey) -> StandingsResult<Option<Snapshot>>;
    /// 某个任务为该 key 保存的最新快照
    async fn latest_for_job(
        &self,
        key: StandingsKey,
        job_id: i64,
    ) -> StandingsResult<Option<Snapshot>>;
    /// 按 ID 倒序
    async fn list_for(&self, key: StandingsKey, limit: i64) -> StandingsResult<Vec<Snapshot>>;
    /// 删除早于 cutoff 的快照，但每个 (联赛, 赛季) 最新的 keep_latest 个永远保留
    async fn delete_expired(
        &self,
        cutoff: DateTime<Utc>,
        keep_latest: i64,
        limit: i64,
    ) -> StandingsResult<u64>;
    /// `since` 为空时统计全部
    async fn count(&self, since: Option<DateTime<Utc>>) -> StandingsResult<i64>;
}

/// 当前积分榜仓储抽象
#[async_trait]
pub trait StandingsRepository: Send + Sync {
    /// 不存在时返回版本为 0 的空表
    async fn get(&self, key: StandingsKey) -> StandingsResult<StandingsTable>;
    /// 只有当前版本等于 expected_version 时才整体替换并把版本加一，否则 `VersionConflict`
    async fn compare_and_commit(
        &self,
        key: StandingsKey,
        expected_version: i64,
        entries: &[StandingsEntry],
        job_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> StandingsResult<StandingsTable>;
    async fn count(&self, since: Option<DateTime<Utc>>) -> StandingsResult<i64>;
}

/// 审计日志仓储抽象，只追加
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn append(&self, entry: &AuditLogEntry) -> StandingsResult<AuditLogEntry>;
    /// 按 ID 倒序
    async fn list_for_key(
        &self,
        key: StandingsKey,
        limit: i64,
    ) -> StandingsResult<Vec<AuditLogEntry>>;
    async fn list_for_job(&self, job_id: i64) -> StandingsResult<Vec<AuditLogEntry>>;
    async fn delete_before(&self, cutoff: DateTime<Utc>, limit: i64) -> StandingsResult<u64>;
    async fn count(&self, since: Option<DateTime<Utc>>) -> StandingsResult<i64>;
}

/// 比赛与球队参考数据，由外部系统写入，这里只读
#[async_trait]
pub trait MatchRepository: Send + Sync {
    async fn load_match_set(&self, key: StandingsKey) -> StandingsResult<MatchSet>;
}

//! 可控的数据源
//!
//! 用来模拟外部数据库抖动、读取缓慢、入队失败等情况，其余仓储直接用内存实现即可。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use standings_domain::{
    entities::{EnqueueOutcome, EnqueueRequest, Job, JobFilter, JobResult, MatchSet},
    repositories::{JobRepository, MatchRepository},
    value_objects::StandingsKey,
};
use standings_errors::{StandingsError, StandingsResult};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 预设故障
#[derive(Debug, Clone)]
pub enum InjectedFailure {
    /// 可重试的存储故障
    Transient(String),
    /// 数据故障，重试无意义
    Data(String),
    /// 致命故障，例如存储整体不可用
    Fatal(String),
}

impl InjectedFailure {
    fn into_error(self) -> StandingsError {
        match self {
            InjectedFailure::Transient(message) => StandingsError::DatabaseOperation(message),
            InjectedFailure::Data(message) => StandingsError::ValidationError(message),
            InjectedFailure::Fatal(message) => StandingsError::StorageUnavailable(message),
        }
    }
}

/// 按脚本返回结果的比赛仓储
///
/// 故障队列先于正常数据消费，每次读取弹出一个故障。
#[derive(Debug, Clone, Default)]
pub struct ScriptedMatchRepository {
    sets: Arc<Mutex<HashMap<StandingsKey, MatchSet>>>,
    failures: Arc<Mutex<VecDeque<InjectedFailure>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    loads: Arc<Mutex<u32>>,
}

impl ScriptedMatchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_match_set(key: StandingsKey, match_set: MatchSet) -> Self {
        let repository = Self::new();
        repository.put(key, match_set);
        repository
    }

    pub fn put(&self, key: StandingsKey, match_set: MatchSet) {
        self.sets.lock().unwrap().insert(key, match_set);
    }

    /// 接下来的 `times` 次读取返回可重试故障
    pub fn fail_transient(&self, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        for _ in 0..times {
            failures.push_back(InjectedFailure::Transient("模拟数据库抖动".to_string()));
        }
    }

    pub fn fail_with(&self, failure: InjectedFailure) {
        self.failures.lock().unwrap().push_back(failure);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// 读取次数（包括失败的）
    pub fn load_count(&self) -> u32 {
        *self.loads.lock().unwrap()
    }
}

#[async_trait]
impl MatchRepository for ScriptedMatchRepository {
    async fn load_match_set(&self, key: StandingsKey) -> StandingsResult<MatchSet> {
        *self.loads.lock().unwrap() += 1;

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().unwrap().pop_front();
        if let Some(failure) = failure {
            return Err(failure.into_error());
        }

        Ok(self
            .sets
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }
}

/// 包装任务仓储，按预设让 `upsert_active` 失败，其余调用直接转发
pub struct FailingJobRepository {
    inner: Arc<dyn JobRepository>,
    failures: Mutex<VecDeque<InjectedFailure>>,
    upserts: Mutex<u32>,
}

impl FailingJobRepository {
    pub fn new(inner: Arc<dyn JobRepository>) -> Self {
        Self {
            inner,
            failures: Mutex::new(VecDeque::new()),
            upserts: Mutex::new(0),
        }
    }

    /// 接下来的 `times` 次入队返回给定故障
    pub fn fail_upserts(&self, times: usize, failure: InjectedFailure) {
        let mut failures = self.failures.lock().unwrap();
        for _ in 0..times {
            failures.push_back(failure.clone());
        }
    }

    /// 入队调用次数（包括失败的）
    pub fn upsert_count(&self) -> u32 {
        *self.upserts.lock().unwrap()
    }
}

#[async_trait]
impl JobRepository for FailingJobRepository {
    async fn upsert_active(
        &self,
        request: &EnqueueRequest,
        now: DateTime<Utc>,
    ) -> StandingsResult<EnqueueOutcome> {
        *self.upserts.lock().unwrap() += 1;
        let failure = self.failures.lock().unwrap().pop_front();
        if let Some(failure) = failure {
            return Err(failure.into_error());
        }
        self.inner.upsert_active(request, now).await
    }

    async fn get_by_id(&self, id: i64) -> StandingsResult<Option<Job>> {
        self.inner.get_by_id(id).await
    }

    async fn list(&self, filter: &JobFilter) -> StandingsResult<Vec<Job>> {
        self.inner.list(filter).await
    }

    async fn find_next_pending(&self, now: DateTime<Utc>) -> StandingsResult<Option<Job>> {
        self.inner.find_next_pending(now).await
    }

    async fn try_claim(
        &self,
        id: i64,
        worker_id: &str,
        lease_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StandingsResult<Option<Job>> {
        self.inner.try_claim(id, worker_id, lease_expires_at, now).await
    }

    async fn renew_lease(
        &self,
        id: i64,
        worker_id: &str,
        lease_expires_at: DateTime<Utc>,
    ) -> StandingsResult<bool> {
        self.inner.renew_lease(id, worker_id, lease_expires_at).await
    }

    async fn find_processing_for_key(&self, key: StandingsKey) -> StandingsResult<Vec<Job>> {
        self.inner.find_processing_for_key(key).await
    }

    async fn mark_completed(
        &self,
        id: i64,
        result: &JobResult,
        now: DateTime<Utc>,
    ) -> StandingsResult<Job> {
        self.inner.mark_completed(id, result, now).await
    }

    async fn mark_retry(
        &self,
        id: i64,
        attempts: i32,
        error: &str,
        available_at: DateTime<Utc>,
    ) -> StandingsResult<Job> {
        self.inner.mark_retry(id, attempts, error, available_at).await
    }

    async fn mark_failed(
        &self,
        id: i64,
        attempts: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> StandingsResult<Job> {
        self.inner.mark_failed(id, attempts, error, now).await
    }

    async fn find_expired_leases(&self, now: DateTime<Utc>) -> StandingsResult<Vec<Job>> {
        self.inner.find_expired_leases(now).await
    }

    async fn delete_pending(&self, id: i64) -> StandingsResult<()> {
        self.inner.delete_pending(id).await
    }

    async fn delete_terminal_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> StandingsResult<u64> {
        self.inner.delete_terminal_before(cutoff, limit).await
    }
}

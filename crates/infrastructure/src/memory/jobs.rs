use async_trait::async_trait;
use chrono::{DateTime, Utc};
use standings_domain::{
    entities::{EnqueueOutcome, EnqueueRequest, Job, JobFilter, JobResult, JobStatus},
    repositories::JobRepository,
    value_objects::StandingsKey,
};
use standings_errors::{StandingsError, StandingsResult};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct JobStore {
    next_id: i64,
    jobs: BTreeMap<i64, Job>,
}

/// 进程内任务仓储，单把锁保证每个操作原子
#[derive(Default)]
pub struct InMemoryJobRepository {
    store: Mutex<JobStore>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入一条任务，测试用来构造历史数据
    pub async fn insert(&self, mut job: Job) -> Job {
        let mut store = self.store.lock().await;
        if job.id == 0 {
            store.next_id += 1;
            job.id = store.next_id;
        } else {
            store.next_id = store.next_id.max(job.id);
        }
        store.jobs.insert(job.id, job.clone());
        job
    }

    pub async fn count(&self) -> usize {
        self.store.lock().await.jobs.len()
    }

    /// 在锁内对 PROCESSING 任务执行一次迁移
    async fn transition<F>(&self, id: i64, to: JobStatus, apply: F) -> StandingsResult<Job>
    where
        F: FnOnce(&mut Job) -> StandingsResult<()> + Send,
    {
        let mut store = self.store.lock().await;
        let job = store
            .jobs
            .get_mut(&id)
            .ok_or_else(|| StandingsError::job_not_found(id))?;
        if job.status != JobStatus::Processing {
            return Err(StandingsError::invalid_transition(id, job.status, to));
        }
        apply(job)?;
        job.status = to;
        Ok(job.clone())
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn upsert_active(
        &self,
        request: &EnqueueRequest,
        now: DateTime<Utc>,
    ) -> StandingsResult<EnqueueOutcome> {
        let mut store = self.store.lock().await;
        let key = request.key();

        if let Some(job) = store
            .jobs
            .values_mut()
            .find(|job| job.key() == key && !job.is_terminal())
        {
            job.coalesce(request);
            return Ok(EnqueueOutcome {
                job: job.clone(),
                created: false,
            });
        }

        store.next_id += 1;
        let mut job = Job::new(request, now);
        job.id = store.next_id;
        store.jobs.insert(job.id, job.clone());
        Ok(EnqueueOutcome { job, created: true })
    }

    async fn get_by_id(&self, id: i64) -> StandingsResult<Option<Job>> {
        Ok(self.store.lock().await.jobs.get(&id).cloned())
    }

    async fn list(&self, filter: &JobFilter) -> StandingsResult<Vec<Job>> {
        let store = self.store.lock().await;
        let mut jobs: Vec<Job> = store
            .jobs
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let limit = filter
            .limit
            .filter(|limit| *limit >= 0)
            .map_or(usize::MAX, |limit| limit as usize);
        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }

    async fn find_next_pending(&self, now: DateTime<Utc>) -> StandingsResult<Option<Job>> {
        let store = self.store.lock().await;
        Ok(store
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending && job.available_at <= now)
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            })
            .cloned())
    }

    async fn try_claim(
        &self,
        id: i64,
        worker_id: &str,
        lease_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StandingsResult<Option<Job>> {
        let mut store = self.store.lock().await;
        match store.jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Processing;
                job.worker_id = Some(worker_id.to_string());
                job.lease_expires_at = Some(lease_expires_at);
                job.started_at = Some(now);
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn renew_lease(
        &self,
        id: i64,
        worker_id: &str,
        lease_expires_at: DateTime<Utc>,
    ) -> StandingsResult<bool> {
        let mut store = self.store.lock().await;
        match store.jobs.get_mut(&id) {
            Some(job)
                if job.status == JobStatus::Processing
                    && job.worker_id.as_deref() == Some(worker_id) =>
            {
                job.lease_expires_at = Some(lease_expires_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_processing_for_key(&self, key: StandingsKey) -> StandingsResult<Vec<Job>> {
        let store = self.store.lock().await;
        Ok(store
            .jobs
            .values()
            .filter(|job| job.key() == key && job.status == JobStatus::Processing)
            .cloned()
            .collect())
    }

    async fn mark_completed(
        &self,
        id: i64,
        result: &JobResult,
        now: DateTime<Utc>,
    ) -> StandingsResult<Job> {
        let result = result.clone();
        self.transition(id, JobStatus::Completed, move |job| {
            job.completed_at = Some(now);
            job.result = Some(result);
            job.lease_expires_at = None;
            job.last_error = None;
            Ok(())
        })
        .await
    }

    async fn mark_retry(
        &self,
        id: i64,
        attempts: i32,
        error: &str,
        available_at: DateTime<Utc>,
    ) -> StandingsResult<Job> {
        let error = error.to_string();
        self.transition(id, JobStatus::Pending, move |job| {
            job.attempts = attempts;
            job.last_error = Some(error);
            job.available_at = available_at;
            job.worker_id = None;
            job.lease_expires_at = None;
            job.started_at = None;
            job.rerun_requested = false;
            Ok(())
        })
        .await
    }

    async fn mark_failed(
        &self,
        id: i64,
        attempts: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> StandingsResult<Job> {
        let error = error.to_string();
        self.transition(id, JobStatus::Failed, move |job| {
            job.attempts = attempts;
            job.last_error = Some(error);
            job.completed_at = Some(now);
            job.lease_expires_at = None;
            Ok(())
        })
        .await
    }

    async fn find_expired_leases(&self, now: DateTime<Utc>) -> StandingsResult<Vec<Job>> {
        let store = self.store.lock().await;
        let mut expired: Vec<Job> = store
            .jobs
            .values()
            .filter(|job| job.is_lease_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|job| job.lease_expires_at);
        Ok(expired)
    }

    async fn delete_pending(&self, id: i64) -> StandingsResult<()> {
        let mut store = self.store.lock().await;
        match store.jobs.get(&id) {
            None => Err(StandingsError::job_not_found(id)),
            Some(job) if job.status != JobStatus::Pending => Err(
                StandingsError::invalid_transition(id, job.status, "CANCELLED"),
            ),
            Some(_) => {
                store.jobs.remove(&id);
                Ok(())
            }
        }
    }

    async fn delete_terminal_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> StandingsResult<u64> {
        let mut store = self.store.lock().await;
        let mut expired: Vec<(DateTime<Utc>, i64)> = store
            .jobs
            .values()
            .filter(|job| job.is_terminal())
            .filter_map(|job| job.completed_at.map(|at| (at, job.id)))
            .filter(|(completed_at, _)| *completed_at < cutoff)
            .collect();
        expired.sort();
        expired.truncate(limit.max(0) as usize);

        for (_, id) in &expired {
            store.jobs.remove(id);
        }
        Ok(expired.len() as u64)
    }
}

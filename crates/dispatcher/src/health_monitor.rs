use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use standings_config::MonitoringConfig;
use standings_domain::{
    AuditLogRepository, Job, JobFilter, JobRepository, JobStatus, SnapshotRepository,
    StandingsRepository,
};
use standings_errors::StandingsResult;

/// 队列视图中的一组 (状态, 优先级)
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueueStatusGroup {
    pub status: JobStatus,
    pub priority: i32,
    pub count: i64,
    /// 窗口内已结束任务从开始到结束的平均秒数，没有样本时为空
    pub avg_duration_seconds: Option<f64>,
    pub oldest_created_at: Option<DateTime<Utc>>,
    pub newest_created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueHealth {
    pub generated_at: DateTime<Utc>,
    pub duration_window_hours: u32,
    pub groups: Vec<QueueStatusGroup>,
}

impl QueueHealth {
    pub fn count_for(&self, status: JobStatus) -> i64 {
        self.groups
            .iter()
            .filter(|group| group.status == status)
            .map(|group| group.count)
            .sum()
    }
}

/// 系统视图中的一个组件，不适用的计数为 0
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ComponentHealth {
    pub component: String,
    pub total: i64,
    pub pending: i64,
    pub processing: i64,
    pub failed: i64,
    /// 最近窗口内新增或更新的数量
    pub recent: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub generated_at: DateTime<Utc>,
    pub recent_window_minutes: u32,
    pub components: Vec<ComponentHealth>,
}

impl SystemHealth {
    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.iter().find(|c| c.component == name)
    }
}

#[derive(Default)]
struct GroupAccumulator {
    count: i64,
    duration_total: f64,
    duration_samples: u32,
    oldest: Option<DateTime<Utc>>,
    newest: Option<DateTime<Utc>>,
}

/// 只读的运行状况视图，每次查询时重新计算，不保存任何状态
pub struct HealthMonitor {
    jobs: Arc<dyn JobRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    standings: Arc<dyn StandingsRepository>,
    audit_logs: Arc<dyn AuditLogRepository>,
    config: MonitoringConfig,
}

impl HealthMonitor {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        standings: Arc<dyn StandingsRepository>,
        audit_logs: Arc<dyn AuditLogRepository>,
        config: MonitoringConfig,
    ) -> Self {
        Self {
            jobs,
            snapshots,
            standings,
            audit_logs,
            config,
        }
    }

    pub async fn queue_health(&self) -> StandingsResult<QueueHealth> {
        let now = Utc::now();
        let jobs = self.jobs.list(&JobFilter::default()).await?;
        let window_start = now - Duration::hours(i64::from(self.config.duration_window_hours));

        Ok(QueueHealth {
            generated_at: now,
            duration_window_hours: self.config.duration_window_hours,
            groups: Self::group_jobs(&jobs, window_start),
        })
    }

    fn group_jobs(jobs: &[Job], window_start: DateTime<Utc>) -> Vec<QueueStatusGroup> {
        let mut groups: BTreeMap<(JobStatus, i32), GroupAccumulator> = BTreeMap::new();

        for job in jobs {
            let group = groups.entry((job.status, job.priority)).or_default();
            group.count += 1;
            group.oldest = Some(group.oldest.map_or(job.created_at, |at| at.min(job.created_at)));
            group.newest = Some(group.newest.map_or(job.created_at, |at| at.max(job.created_at)));

            let in_window = job.completed_at.is_some_and(|at| at >= window_start);
            if in_window {
                if let Some(duration) = job.duration_seconds() {
                    group.duration_total += duration;
                    group.duration_samples += 1;
                }
            }
        }

        groups
            .into_iter()
            .map(|((status, priority), group)| QueueStatusGroup {
                status,
                priority,
                count: group.count,
                avg_duration_seconds: (group.duration_samples > 0)
                    .then(|| group.duration_total / f64::from(group.duration_samples)),
                oldest_created_at: group.oldest,
                newest_created_at: group.newest,
            })
            .collect()
    }

    pub async fn system_health(&self) -> StandingsResult<SystemHealth> {
        let now = Utc::now();
        let recent_since = now - Duration::minutes(i64::from(self.config.recent_window_minutes));
        let jobs = self.jobs.list(&JobFilter::default()).await?;

        let count_status = |status: JobStatus| jobs.iter().filter(|job| job.status == status).count() as i64;
        let jobs_component = ComponentHealth {
            component: "jobs".to_string(),
            total: jobs.len() as i64,
            pending: count_status(JobStatus::Pending),
            processing: count_status(JobStatus::Processing),
            failed: count_status(JobStatus::Failed),
            recent: jobs.iter().filter(|job| job.created_at >= recent_since).count() as i64,
        };

        let components = vec![
            jobs_component,
            Self::counter_component(
                "snapshots",
                self.snapshots.count(None).await?,
                self.snapshots.count(Some(recent_since)).await?,
            ),
            Self::counter_component(
                "standings",
                self.standings.count(None).await?,
                self.standings.count(Some(recent_since)).await?,
            ),
            Self::counter_component(
                "audit_logs",
                self.audit_logs.count(None).await?,
                self.audit_logs.count(Some(recent_since)).await?,
            ),
        ];

        Ok(SystemHealth {
            generated_at: now,
            recent_window_minutes: self.config.recent_window_minutes,
            components,
        })
    }

    fn counter_component(name: &str, total: i64, recent: i64) -> ComponentHealth {
        ComponentHealth {
            component: name.to_string(),
            total,
            pending: 0,
            processing: 0,
            failed: 0,
            recent,
        }
    }
}

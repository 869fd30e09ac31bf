use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::calculation::CalculationWarning;
use crate::value_objects::StandingsKey;

/// 积分榜重算任务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: i64,
    pub league_id: i64,
    pub season_id: i64,
    pub priority: i32,
    pub status: JobStatus,
    /// 已失败的执行次数
    pub attempts: i32,
    /// 触发原因，合并请求时追加
    pub reasons: Vec<String>,
    /// 处理中被合并了新的请求，完成后需要再算一次
    pub rerun_requested: bool,
    pub worker_id: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// 退避结束前不可被领取
    pub available_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub result: Option<JobResult>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}

/// 任务成功提交后的摘要
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobResult {
    pub snapshot_id: Option<i64>,
    pub standings_version: i64,
    pub before_hash: String,
    pub after_hash: String,
    pub warnings: Vec<CalculationWarning>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFilter {
    pub league_id: Option<i64>,
    pub season_id: Option<i64>,
    pub status: Option<JobStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl JobFilter {
    pub fn for_key(key: StandingsKey) -> Self {
        Self {
            league_id: Some(key.league_id),
            season_id: Some(key.season_id),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.league_id.is_none_or(|id| job.league_id == id)
            && self.season_id.is_none_or(|id| job.season_id == id)
            && self.status.is_none_or(|status| job.status == status)
    }
}

/// 入队请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub league_id: i64,
    pub season_id: i64,
    pub priority: i32,
    pub reason: String,
}

impl EnqueueRequest {
    pub fn new(league_id: i64, season_id: i64, priority: i32, reason: impl Into<String>) -> Self {
        Self {
            league_id,
            season_id,
            priority,
            reason: reason.into(),
        }
    }

    pub fn key(&self) -> StandingsKey {
        StandingsKey::new(self.league_id, self.season_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnqueueOutcome {
    pub job: Job,
    /// false 表示合并进了已存在的非终态任务
    pub created: bool,
}

impl Job {
    pub fn new(request: &EnqueueRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: 0, // 将由存储层生成
            league_id: request.league_id,
            season_id: request.season_id,
            priority: request.priority,
            status: JobStatus::Pending,
            attempts: 0,
            reasons: vec![request.reason.clone()],
            rerun_requested: false,
            worker_id: None,
            lease_expires_at: None,
            available_at: now,
            created_at: now,
            started_at: None,
            completed_at: None,
            last_error: None,
            result: None,
        }
    }

    pub fn key(&self) -> StandingsKey {
        StandingsKey::new(self.league_id, self.season_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 合并一个新的入队请求：优先级取较大值，原因追加
    pub fn coalesce(&mut self, request: &EnqueueRequest) {
        self.priority = self.priority.max(request.priority);
        self.reasons.push(request.reason.clone());
        if self.status == JobStatus::Processing {
            self.rerun_requested = true;
        }
    }

    pub fn is_lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Processing
            && self.lease_expires_at.is_some_and(|expires| expires < now)
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => {
                Some((completed - started).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    }

    pub fn entity_description(&self) -> String {
        format!(
            "重算任务 (ID: {}, 联赛: {}, 赛季: {}, 状态: {})",
            self.id, self.league_id, self.season_id, self.status
        )
    }
}

/// 积分榜中一支球队的一行
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StandingsEntry {
    pub team_id: i64,
    pub team_name: String,
    pub played: u32,
    pub won: u32,
    pub drawn: u32,
    pub lost: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub goal_difference: i32,
    pub points: u32,
    pub rank: u32,
}

impl StandingsEntry {
    pub fn new(team_id: i64, team_name: impl Into<String>) -> Self {
        Self {
            team_id,
            team_name: team_name.into(),
            played: 0,
            won: 0,
            drawn: 0,
            lost: 0,
            goals_for: 0,
            goals_against: 0,
            goal_difference: 0,
            points: 0,
            rank: 0,
        }
    }
}

/// 已提交的积分榜，按 (联赛, 赛季) 带版本号存储
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StandingsTable {
    pub league_id: i64,
    pub season_id: i64,
    /// 0 表示尚未提交过
    pub version: i64,
    pub entries: Vec<StandingsEntry>,
    pub updated_at: Option<DateTime<Utc>>,
    /// 最近一次写入它的任务
    pub job_id: Option<i64>,
}

impl StandingsTable {
    pub fn empty(key: StandingsKey) -> Self {
        Self {
            league_id: key.league_id,
            season_id: key.season_id,
            version: 0,
            entries: Vec::new(),
            updated_at: None,
            job_id: None,
        }
    }

    pub fn key(&self) -> StandingsKey {
        StandingsKey::new(self.league_id, self.season_id)
    }

    pub fn state_hash(&self) -> String {
        crate::hashing::state_hash(&self.entries)
    }
}

/// 重算之前的积分榜副本，创建后不可修改
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub id: i64,
    pub league_id: i64,
    pub season_id: i64,
    pub job_id: Option<i64>,
    pub standings_version: i64,
    pub created_at: DateTime<Utc>,
    /// payload 的字节数
    pub size: i64,
    pub payload: String,
    pub checksum: String,
}

impl Snapshot {
    pub fn key(&self) -> StandingsKey {
        StandingsKey::new(self.league_id, self.season_id)
    }
}

/// 不带 payload 的快照信息，用于列表展示
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotSummary {
    pub id: i64,
    pub league_id: i64,
    pub season_id: i64,
    pub job_id: Option<i64>,
    pub standings_version: i64,
    pub created_at: DateTime<Utc>,
    pub size: i64,
}

impl From<&Snapshot> for SnapshotSummary {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            id: snapshot.id,
            league_id: snapshot.league_id,
            season_id: snapshot.season_id,
            job_id: snapshot.job_id,
            standings_version: snapshot.standings_version,
            created_at: snapshot.created_at,
            size: snapshot.size,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuditAction {
    #[serde(rename = "recalculated")]
    Recalculated,
    #[serde(rename = "rolled_back")]
    RolledBack,
    #[serde(rename = "restored")]
    Restored,
    #[serde(rename = "job_failed")]
    JobFailed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Recalculated => "recalculated",
            AuditAction::RolledBack => "rolled_back",
            AuditAction::Restored => "restored",
            AuditAction::JobFailed => "job_failed",
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recalculated" => Ok(AuditAction::Recalculated),
            "rolled_back" => Ok(AuditAction::RolledBack),
            "restored" => Ok(AuditAction::Restored),
            "job_failed" => Ok(AuditAction::JobFailed),
            _ => Err(format!("Invalid audit action: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Actor {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "manual")]
    Manual,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::System => "system",
            Actor::Manual => "manual",
        }
    }
}

impl FromStr for Actor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Actor::System),
            "manual" => Ok(Actor::Manual),
            _ => Err(format!("Invalid actor: {s}")),
        }
    }
}

/// 追加写入的审计记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLogEntry {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub job_id: Option<i64>,
    pub league_id: i64,
    pub season_id: i64,
    pub action: AuditAction,
    pub before_hash: String,
    pub after_hash: String,
    pub actor: Actor,
    pub details: Option<String>,
}

impl AuditLogEntry {
    pub fn changed_state(&self) -> bool {
        self.before_hash != self.after_hash
    }
}

/// 球队参考数据（只读）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Team {
    pub id: i64,
    pub name: String,
}

/// 一场比赛，比分缺失表示尚未产生最终结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchRecord {
    pub id: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
}

/// 计算引擎的输入：某个 (联赛, 赛季) 的球队与比赛
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchSet {
    pub teams: Vec<Team>,
    pub matches: Vec<MatchRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(priority: i32, reason: &str) -> EnqueueRequest {
        EnqueueRequest::new(1, 2024, priority, reason)
    }

    #[test]
    fn test_job_status_round_trip() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("RUNNING".parse::<JobStatus>().is_err());
        assert!(JobStatus::Completed.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_coalesce_raises_priority_and_appends_reason() {
        let now = Utc::now();
        let mut job = Job::new(&request(5, "比分更新"), now);
        job.coalesce(&request(3, "补录比赛"));
        assert_eq!(job.priority, 5);
        job.coalesce(&request(10, "人工触发"));
        assert_eq!(job.priority, 10);
        assert_eq!(job.reasons, vec!["比分更新", "补录比赛", "人工触发"]);
        assert!(!job.rerun_requested);
    }

    #[test]
    fn test_coalesce_into_processing_job_requests_rerun() {
        let now = Utc::now();
        let mut job = Job::new(&request(5, "比分更新"), now);
        job.status = JobStatus::Processing;
        job.coalesce(&request(1, "再次更新"));
        assert!(job.rerun_requested);
    }

    #[test]
    fn test_lease_expiry() {
        let now = Utc::now();
        let mut job = Job::new(&request(5, "比分更新"), now);
        job.status = JobStatus::Processing;
        job.lease_expires_at = Some(now - Duration::seconds(1));
        assert!(job.is_lease_expired(now));
        job.lease_expires_at = Some(now + Duration::seconds(60));
        assert!(!job.is_lease_expired(now));
    }

    #[test]
    fn test_job_filter_matches() {
        let job = Job::new(&request(5, "比分更新"), Utc::now());
        assert!(JobFilter::default().matches(&job));
        assert!(JobFilter::for_key(job.key()).matches(&job));
        assert!(!JobFilter::for_key(StandingsKey::new(2, 2024)).matches(&job));
        assert!(!JobFilter::default()
            .with_status(JobStatus::Failed)
            .matches(&job));
    }
}

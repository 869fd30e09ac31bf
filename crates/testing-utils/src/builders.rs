//! 测试数据构建器
//!
//! 提供带合理默认值的构建器，测试只需要改动关心的字段。

use chrono::{DateTime, Utc};
use standings_domain::entities::{
    Job, JobStatus, MatchRecord, MatchSet, StandingsEntry, Team,
};

/// 任务构建器，默认是联赛 1 / 赛季 2024 的 PENDING 任务
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            job: Job {
                id: 0,
                league_id: 1,
                season_id: 2024,
                priority: 5,
                status: JobStatus::Pending,
                attempts: 0,
                reasons: vec!["test".to_string()],
                rerun_requested: false,
                worker_id: None,
                lease_expires_at: None,
                available_at: now,
                created_at: now,
                started_at: None,
                completed_at: None,
                last_error: None,
                result: None,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.job.id = id;
        self
    }

    pub fn with_league(mut self, league_id: i64, season_id: i64) -> Self {
        self.job.league_id = league_id;
        self.job.season_id = season_id;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.job.priority = priority;
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn with_attempts(mut self, attempts: i32) -> Self {
        self.job.attempts = attempts;
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.job.reasons = vec![reason.to_string()];
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.job.created_at = created_at;
        self.job.available_at = created_at;
        self
    }

    pub fn with_available_at(mut self, available_at: DateTime<Utc>) -> Self {
        self.job.available_at = available_at;
        self
    }

    /// 同时把创建和开始时间挪到完成时间，保证时间线单调
    pub fn with_completed_at(mut self, completed_at: DateTime<Utc>) -> Self {
        self.job.created_at = self.job.created_at.min(completed_at);
        self.job.started_at = Some(completed_at);
        self.job.completed_at = Some(completed_at);
        self
    }

    /// 设置持有者和租约，状态改为 PROCESSING
    pub fn with_lease(mut self, worker_id: &str, lease_expires_at: DateTime<Utc>) -> Self {
        self.job.status = JobStatus::Processing;
        self.job.worker_id = Some(worker_id.to_string());
        self.job.started_at = Some(self.job.created_at);
        self.job.lease_expires_at = Some(lease_expires_at);
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 比赛数据构建器，比赛 ID 按添加顺序自增
#[derive(Default)]
pub struct MatchSetBuilder {
    match_set: MatchSet,
}

impl MatchSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn team(mut self, id: i64, name: &str) -> Self {
        self.match_set.teams.push(Team {
            id,
            name: name.to_string(),
        });
        self
    }

    /// 添加一场已完赛的比赛
    pub fn result(self, home_team_id: i64, away_team_id: i64, home: i32, away: i32) -> Self {
        self.with_match(home_team_id, away_team_id, Some(home), Some(away))
    }

    /// 添加一场未完赛（没有比分）的比赛
    pub fn scheduled(self, home_team_id: i64, away_team_id: i64) -> Self {
        self.with_match(home_team_id, away_team_id, None, None)
    }

    pub fn with_match(
        mut self,
        home_team_id: i64,
        away_team_id: i64,
        home_score: Option<i32>,
        away_score: Option<i32>,
    ) -> Self {
        let id = self.match_set.matches.len() as i64 + 1;
        self.match_set.matches.push(MatchRecord {
            id,
            home_team_id,
            away_team_id,
            home_score,
            away_score,
        });
        self
    }

    pub fn build(self) -> MatchSet {
        self.match_set
    }
}

/// 三支球队 A/B/C：A 2-1 B，B 2-0 C，C 1-1 A
pub fn three_team_match_set() -> MatchSet {
    MatchSetBuilder::new()
        .team(1, "A")
        .team(2, "B")
        .team(3, "C")
        .result(1, 2, 2, 1)
        .result(2, 3, 2, 0)
        .result(3, 1, 1, 1)
        .build()
}

/// 积分行构建器，用于直接构造已经排好的积分榜
pub struct StandingsEntryBuilder {
    entry: StandingsEntry,
}

impl StandingsEntryBuilder {
    pub fn new(team_id: i64, team_name: &str) -> Self {
        Self {
            entry: StandingsEntry::new(team_id, team_name),
        }
    }

    /// 按胜平负和进失球填充，场次、净胜球和积分由此推出
    pub fn record(mut self, won: u32, drawn: u32, lost: u32, goals_for: u32, goals_against: u32) -> Self {
        self.entry.won = won;
        self.entry.drawn = drawn;
        self.entry.lost = lost;
        self.entry.played = won + drawn + lost;
        self.entry.goals_for = goals_for;
        self.entry.goals_against = goals_against;
        self.entry.goal_difference = goals_for as i32 - goals_against as i32;
        self.entry.points = won * 3 + drawn;
        self
    }

    pub fn rank(mut self, rank: u32) -> Self {
        self.entry.rank = rank;
        self
    }

    pub fn build(self) -> StandingsEntry {
        self.entry
    }
}

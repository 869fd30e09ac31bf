use serde::{Deserialize, Serialize};
use std::fmt;

/// 积分榜的唯一作用域：(联赛, 赛季)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StandingsKey {
    pub league_id: i64,
    pub season_id: i64,
}

impl StandingsKey {
    pub fn new(league_id: i64, season_id: i64) -> Self {
        Self {
            league_id,
            season_id,
        }
    }
}

impl fmt::Display for StandingsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "联赛 {} / 赛季 {}", self.league_id, self.season_id)
    }
}

/// 常用的任务优先级，数值越大越先处理
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobPriority {
    Low = 1,
    Normal = 5,
    High = 10,
    Urgent = 100,
}

impl JobPriority {
    pub fn value(self) -> i32 {
        self as i32
    }
}

impl From<JobPriority> for i32 {
    fn from(priority: JobPriority) -> Self {
        priority.value()
    }
}

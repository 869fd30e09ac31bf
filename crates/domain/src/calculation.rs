//! 积分榜计算引擎
//!
//! `compute` 是纯函数：相同的比赛集合和配置总是得到完全相同的有序结果，
//! 重试和重复提交因此是安全的。

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::entities::{MatchRecord, MatchSet, StandingsEntry};

pub const POINTS_FOR_WIN: u32 = 3;
pub const POINTS_FOR_DRAW: u32 = 1;
/// 单场比分上限，超出视为录入错误
pub const MAX_SCORE: i32 = 999;

/// 同分时的附加排序规则
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TiebreakConfig {
    /// 积分、净胜球、进球都相同时，是否比较相互之间的战绩
    pub head_to_head: bool,
}

impl Default for TiebreakConfig {
    fn default() -> Self {
        Self { head_to_head: true }
    }
}

/// 被排除在统计之外的比赛
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalculationWarning {
    MissingScore {
        match_id: i64,
    },
    InvalidScore {
        match_id: i64,
        home_score: i32,
        away_score: i32,
    },
    UnknownTeam {
        match_id: i64,
        team_id: i64,
    },
    SelfMatch {
        match_id: i64,
        team_id: i64,
    },
    DuplicateTeam {
        team_id: i64,
    },
}

impl fmt::Display for CalculationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalculationWarning::MissingScore { match_id } => {
                write!(f, "比赛 {match_id} 没有最终比分，已排除")
            }
            CalculationWarning::InvalidScore {
                match_id,
                home_score,
                away_score,
            } => write!(
                f,
                "比赛 {match_id} 比分无效 ({home_score}:{away_score})，已排除"
            ),
            CalculationWarning::UnknownTeam { match_id, team_id } => {
                write!(f, "比赛 {match_id} 引用了未知球队 {team_id}，已排除")
            }
            CalculationWarning::SelfMatch { match_id, team_id } => {
                write!(f, "比赛 {match_id} 的主客队相同 ({team_id})，已排除")
            }
            CalculationWarning::DuplicateTeam { team_id } => {
                write!(f, "球队 {team_id} 在名单中重复出现，只保留第一条")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculationOutcome {
    pub entries: Vec<StandingsEntry>,
    pub warnings: Vec<CalculationWarning>,
}

/// 一场可以计入统计的比赛
#[derive(Debug, Clone, Copy)]
struct ScoredMatch {
    home: i64,
    away: i64,
    home_goals: u32,
    away_goals: u32,
}

#[derive(Debug, Default, Clone, Copy)]
struct MiniRecord {
    points: u32,
    goals_for: u32,
    goals_against: u32,
}

impl MiniRecord {
    fn goal_difference(&self) -> i64 {
        i64::from(self.goals_for) - i64::from(self.goals_against)
    }
}

pub fn compute(match_set: &MatchSet, config: &TiebreakConfig) -> CalculationOutcome {
    let mut warnings = Vec::new();

    let mut table: BTreeMap<i64, StandingsEntry> = BTreeMap::new();
    for team in &match_set.teams {
        if table.contains_key(&team.id) {
            warnings.push(CalculationWarning::DuplicateTeam { team_id: team.id });
            continue;
        }
        table.insert(team.id, StandingsEntry::new(team.id, team.name.clone()));
    }

    let mut scored = Vec::with_capacity(match_set.matches.len());
    for record in &match_set.matches {
        match validate_match(record, &table) {
            Ok(m) => scored.push(m),
            Err(warning) => warnings.push(warning),
        }
    }

    for m in &scored {
        apply_result(&mut table, m);
    }

    let mut entries: Vec<StandingsEntry> = table.into_values().collect();
    entries.sort_by(compare_primary);

    if config.head_to_head {
        resolve_with_head_to_head(&mut entries, &scored);
    }

    for (index, entry) in entries.iter_mut().enumerate() {
        entry.rank = index as u32 + 1;
    }

    CalculationOutcome { entries, warnings }
}

fn validate_match(
    record: &MatchRecord,
    table: &BTreeMap<i64, StandingsEntry>,
) -> Result<ScoredMatch, CalculationWarning> {
    let (home_score, away_score) = match (record.home_score, record.away_score) {
        (Some(home), Some(away)) => (home, away),
        _ => {
            return Err(CalculationWarning::MissingScore {
                match_id: record.id,
            })
        }
    };

    if record.home_team_id == record.away_team_id {
        return Err(CalculationWarning::SelfMatch {
            match_id: record.id,
            team_id: record.home_team_id,
        });
    }

    for team_id in [record.home_team_id, record.away_team_id] {
        if !table.contains_key(&team_id) {
            return Err(CalculationWarning::UnknownTeam {
                match_id: record.id,
                team_id,
            });
        }
    }

    if !(0..=MAX_SCORE).contains(&home_score) || !(0..=MAX_SCORE).contains(&away_score) {
        return Err(CalculationWarning::InvalidScore {
            match_id: record.id,
            home_score,
            away_score,
        });
    }

    Ok(ScoredMatch {
        home: record.home_team_id,
        away: record.away_team_id,
        home_goals: home_score as u32,
        away_goals: away_score as u32,
    })
}

fn apply_result(table: &mut BTreeMap<i64, StandingsEntry>, m: &ScoredMatch) {
    for (team_id, scored, conceded) in [
        (m.home, m.home_goals, m.away_goals),
        (m.away, m.away_goals, m.home_goals),
    ] {
        let Some(entry) = table.get_mut(&team_id) else {
            continue;
        };
        entry.played = entry.played.saturating_add(1);
        entry.goals_for = entry.goals_for.saturating_add(scored);
        entry.goals_against = entry.goals_against.saturating_add(conceded);
        match scored.cmp(&conceded) {
            Ordering::Greater => {
                entry.won = entry.won.saturating_add(1);
                entry.points = entry.points.saturating_add(POINTS_FOR_WIN);
            }
            Ordering::Equal => {
                entry.drawn = entry.drawn.saturating_add(1);
                entry.points = entry.points.saturating_add(POINTS_FOR_DRAW);
            }
            Ordering::Less => entry.lost = entry.lost.saturating_add(1),
        }
        let difference = i64::from(entry.goals_for) - i64::from(entry.goals_against);
        entry.goal_difference = difference.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
    }
}

/// 积分、净胜球、进球依次降序，然后球队名称升序，最后按 ID 保证全序
fn compare_primary(a: &StandingsEntry, b: &StandingsEntry) -> Ordering {
    compare_statistics(a, b).then_with(|| compare_identity(a, b))
}

fn compare_statistics(a: &StandingsEntry, b: &StandingsEntry) -> Ordering {
    b.points
        .cmp(&a.points)
        .then_with(|| b.goal_difference.cmp(&a.goal_difference))
        .then_with(|| b.goals_for.cmp(&a.goals_for))
}

fn compare_identity(a: &StandingsEntry, b: &StandingsEntry) -> Ordering {
    a.team_name
        .cmp(&b.team_name)
        .then_with(|| a.team_id.cmp(&b.team_id))
}

/// 对统计完全相同的每一组球队，只用组内球队之间的比赛建一张小积分榜再排序。
/// 小积分榜仍然相同的球队回落到名称排序。
fn resolve_with_head_to_head(entries: &mut [StandingsEntry], scored: &[ScoredMatch]) {
    let mut start = 0;
    while start < entries.len() {
        let mut end = start + 1;
        while end < entries.len()
            && compare_statistics(&entries[start], &entries[end]) == Ordering::Equal
        {
            end += 1;
        }

        if end - start > 1 {
            let group = &mut entries[start..end];
            let mini = mini_table(group, scored);
            group.sort_by(|a, b| {
                let left = mini.get(&a.team_id).copied().unwrap_or_default();
                let right = mini.get(&b.team_id).copied().unwrap_or_default();
                right
                    .points
                    .cmp(&left.points)
                    .then_with(|| right.goal_difference().cmp(&left.goal_difference()))
                    .then_with(|| right.goals_for.cmp(&left.goals_for))
                    .then_with(|| compare_identity(a, b))
            });
        }

        start = end;
    }
}

fn mini_table(group: &[StandingsEntry], scored: &[ScoredMatch]) -> HashMap<i64, MiniRecord> {
    let members: HashSet<i64> = group.iter().map(|entry| entry.team_id).collect();
    let mut records: HashMap<i64, MiniRecord> = HashMap::new();

    for m in scored
        .iter()
        .filter(|m| members.contains(&m.home) && members.contains(&m.away))
    {
        for (team_id, scored, conceded) in [
            (m.home, m.home_goals, m.away_goals),
            (m.away, m.away_goals, m.home_goals),
        ] {
            let record = records.entry(team_id).or_default();
            record.goals_for = record.goals_for.saturating_add(scored);
            record.goals_against = record.goals_against.saturating_add(conceded);
            record.points = record.points.saturating_add(match scored.cmp(&conceded) {
                Ordering::Greater => POINTS_FOR_WIN,
                Ordering::Equal => POINTS_FOR_DRAW,
                Ordering::Less => 0,
            });
        }
    }

    records
}

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use standings_config::CalculationConfig;
use standings_dispatcher::{AuditLogger, AuditRecord, SnapshotManager};
use standings_domain::{
    compute, Actor, AuditAction, CalculationOutcome, Job, JobResult, MatchRepository,
    StandingsEntry, StandingsKey, StandingsRepository, TiebreakConfig,
};
use standings_errors::{StandingsError, StandingsResult};
use tracing::{debug, info, instrument, warn};

/// 单个任务的提交序列：快照 -> 计算 -> 提交积分榜 -> 审计
///
/// 任何一步失败都不会留下部分写入：积分榜只通过带版本的整体替换更新，
/// 失败的任务由队列决定重试或回滚。
pub struct RecalculationExecutor {
    standings: Arc<dyn StandingsRepository>,
    matches: Arc<dyn MatchRepository>,
    snapshots: Arc<SnapshotManager>,
    audit: Arc<AuditLogger>,
    tiebreak: TiebreakConfig,
    calculation_timeout: Duration,
}

impl RecalculationExecutor {
    pub fn new(
        standings: Arc<dyn StandingsRepository>,
        matches: Arc<dyn MatchRepository>,
        snapshots: Arc<SnapshotManager>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            standings,
            matches,
            snapshots,
            audit,
            tiebreak: TiebreakConfig::default(),
            calculation_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_calculation_config(mut self, config: &CalculationConfig) -> Self {
        self.tiebreak = TiebreakConfig {
            head_to_head: config.head_to_head,
        };
        self
    }

    pub fn with_calculation_timeout(mut self, timeout: Duration) -> Self {
        self.calculation_timeout = timeout;
        self
    }

    #[instrument(skip(self, job), fields(
        job_id = job.id,
        league_id = job.league_id,
        season_id = job.season_id,
    ))]
    pub async fn execute(&self, job: &Job) -> StandingsResult<JobResult> {
        let key = job.key();

        let before = self.standings.get(key).await?;
        let snapshot = self.snapshots.capture(&before, Some(job.id)).await?;

        let (outcome, roster_size) = self.load_and_compute(key).await?;
        Self::verify(&outcome.entries, roster_size)?;

        for warning in &outcome.warnings {
            warn!("任务 {}: {}", job.id, warning);
        }

        let after = self
            .standings
            .compare_and_commit(key, before.version, &outcome.entries, Some(job.id), Utc::now())
            .await?;

        let before_hash = before.state_hash();
        let after_hash = after.state_hash();
        self.audit
            .log(
                AuditRecord::new(key, AuditAction::Recalculated, Actor::System)
                    .for_job(Some(job.id))
                    .hashes(before_hash.clone(), after_hash.clone())
                    .details(format!(
                        "版本 {} -> {}, {} 条警告",
                        before.version,
                        after.version,
                        outcome.warnings.len()
                    )),
            )
            .await?;

        info!(
            "{} 重算完成: 版本 {} -> {}, {} 支球队",
            key,
            before.version,
            after.version,
            after.entries.len()
        );

        Ok(JobResult {
            snapshot_id: Some(snapshot.id),
            standings_version: after.version,
            before_hash,
            after_hash,
            warnings: outcome.warnings,
        })
    }

    /// 读取比赛数据并计算，整体受超时约束。计算放在阻塞线程池里执行
    async fn load_and_compute(
        &self,
        key: StandingsKey,
    ) -> StandingsResult<(CalculationOutcome, usize)> {
        let tiebreak = self.tiebreak;
        let matches = self.matches.clone();
        let start_time = Instant::now();

        let work = async move {
            let match_set = matches.load_match_set(key).await?;
            let roster: HashSet<i64> = match_set.teams.iter().map(|team| team.id).collect();
            debug!(
                "读取到 {} 支球队, {} 场比赛",
                match_set.teams.len(),
                match_set.matches.len()
            );

            let outcome = tokio::task::spawn_blocking(move || compute(&match_set, &tiebreak))
                .await
                .map_err(|e| StandingsError::Internal(format!("计算线程异常退出: {e}")))?;
            Ok::<_, StandingsError>((outcome, roster.len()))
        };

        let result = tokio::time::timeout(self.calculation_timeout, work)
            .await
            .map_err(|_| {
                StandingsError::Timeout(format!("积分榜计算超过 {:?}", self.calculation_timeout))
            })??;

        metrics::histogram!("standings_calculation_duration_seconds")
            .record(start_time.elapsed().as_secs_f64());
        Ok(result)
    }

    /// 提交前检查结果：每支球队恰好一行，名次从 1 连续编号
    fn verify(entries: &[StandingsEntry], roster_size: usize) -> StandingsResult<()> {
        if entries.len() != roster_size {
            return Err(StandingsError::InvariantViolation(format!(
                "积分榜有 {} 行，球队名单有 {} 支",
                entries.len(),
                roster_size
            )));
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            if !seen.insert(entry.team_id) {
                return Err(StandingsError::InvariantViolation(format!(
                    "球队 {} 在积分榜中出现多次",
                    entry.team_id
                )));
            }
            if entry.rank as usize != index + 1 {
                return Err(StandingsError::InvariantViolation(format!(
                    "第 {} 行的名次是 {}",
                    index + 1,
                    entry.rank
                )));
            }
            if entry.points != entry.won * 3 + entry.drawn
                || entry.played != entry.won + entry.drawn + entry.lost
            {
                return Err(StandingsError::InvariantViolation(format!(
                    "球队 {} 的统计不自洽",
                    entry.team_id
                )));
            }
        }
        Ok(())
    }
}

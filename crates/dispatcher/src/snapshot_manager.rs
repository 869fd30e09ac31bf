use std::sync::Arc;

use chrono::Utc;
use standings_domain::{
    payload_checksum, state_hash, Actor, AuditAction, Snapshot, SnapshotRepository,
    SnapshotSummary, StandingsEntry, StandingsKey, StandingsRepository, StandingsTable,
};
use standings_errors::{StandingsError, StandingsResult};
use tracing::{debug, info, instrument, warn};

use crate::audit_logger::{AuditLogger, AuditRecord};

/// 并发写入导致版本冲突时，恢复操作重新读取版本再提交的次数
const RESTORE_CAS_ATTEMPTS: u32 = 3;

/// 快照管理：在重算前保存积分榜，在失败或人工请求时恢复
pub struct SnapshotManager {
    snapshots: Arc<dyn SnapshotRepository>,
    standings: Arc<dyn StandingsRepository>,
    audit: Arc<AuditLogger>,
}

impl SnapshotManager {
    pub fn new(
        snapshots: Arc<dyn SnapshotRepository>,
        standings: Arc<dyn StandingsRepository>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            snapshots,
            standings,
            audit,
        }
    }

    /// 读取当前积分榜并保存快照
    pub async fn snapshot(
        &self,
        key: StandingsKey,
        job_id: Option<i64>,
    ) -> StandingsResult<Snapshot> {
        let table = self.standings.get(key).await?;
        self.capture(&table, job_id).await
    }

    /// 保存给定积分榜的快照，调用方已经持有读到的那一版
    #[instrument(skip(self, table), fields(
        league_id = table.league_id,
        season_id = table.season_id,
        version = table.version,
    ))]
    pub async fn capture(
        &self,
        table: &StandingsTable,
        job_id: Option<i64>,
    ) -> StandingsResult<Snapshot> {
        let payload = serde_json::to_string(&table.entries)?;
        let snapshot = Snapshot {
            id: 0,
            league_id: table.league_id,
            season_id: table.season_id,
            job_id,
            standings_version: table.version,
            created_at: Utc::now(),
            size: payload.len() as i64,
            checksum: payload_checksum(&payload),
            payload,
        };

        let snapshot = self.snapshots.create(&snapshot).await?;
        debug!("创建快照 {} ({} 字节)", snapshot.id, snapshot.size);
        Ok(snapshot)
    }

    /// 当前已提交的积分榜
    pub async fn current(&self, key: StandingsKey) -> StandingsResult<StandingsTable> {
        self.standings.get(key).await
    }

    pub async fn get(&self, snapshot_id: i64) -> StandingsResult<Snapshot> {
        self.snapshots
            .get_by_id(snapshot_id)
            .await?
            .ok_or_else(|| StandingsError::snapshot_not_found(snapshot_id))
    }

    pub async fn latest(&self, key: StandingsKey) -> StandingsResult<Option<Snapshot>> {
        self.snapshots.latest_for(key).await
    }

    pub async fn list(&self, key: StandingsKey, limit: i64) -> StandingsResult<Vec<SnapshotSummary>> {
        let snapshots = self.snapshots.list_for(key, limit).await?;
        Ok(snapshots.iter().map(SnapshotSummary::from).collect())
    }

    /// 校验摘要并解析快照内容，任何不一致都视为快照损坏
    pub fn decode(snapshot: &Snapshot) -> StandingsResult<Vec<StandingsEntry>> {
        let actual = payload_checksum(&snapshot.payload);
        if actual != snapshot.checksum {
            return Err(StandingsError::SnapshotCorrupted {
                id: snapshot.id,
                reason: format!("摘要不匹配: 期望 {}, 实际 {}", snapshot.checksum, actual),
            });
        }

        serde_json::from_str(&snapshot.payload).map_err(|e| StandingsError::SnapshotCorrupted {
            id: snapshot.id,
            reason: format!("内容无法解析: {e}"),
        })
    }

    /// 用快照内容覆盖当前积分榜
    ///
    /// 人工操作记为 `restored`，系统回滚记为 `rolled_back`。
    #[instrument(skip(self))]
    pub async fn restore(
        &self,
        snapshot_id: i64,
        actor: Actor,
        job_id: Option<i64>,
    ) -> StandingsResult<StandingsTable> {
        let snapshot = self.get(snapshot_id).await?;
        let entries = Self::decode(&snapshot)?;
        let key = snapshot.key();

        let (before, after) = self.overwrite(key, &entries, job_id).await?;

        let action = match actor {
            Actor::Manual => AuditAction::Restored,
            Actor::System => AuditAction::RolledBack,
        };
        self.audit
            .log(
                AuditRecord::new(key, action, actor)
                    .for_job(job_id)
                    .hashes(before.state_hash(), after.state_hash())
                    .details(format!(
                        "从快照 {} 恢复 (快照版本 {}, 新版本 {})",
                        snapshot.id, snapshot.standings_version, after.version
                    )),
            )
            .await?;

        info!("{} 已从快照 {} 恢复到版本 {}", key, snapshot.id, after.version);
        Ok(after)
    }

    /// 回滚到该任务自己保存的最新快照
    ///
    /// 其他任务的快照不会被使用；任务没有保存过快照或内容已经一致时不写入。
    pub async fn rollback_for_job(
        &self,
        key: StandingsKey,
        job_id: i64,
    ) -> StandingsResult<Option<StandingsTable>> {
        let Some(snapshot) = self.snapshots.latest_for_job(key, job_id).await? else {
            debug!("任务 {} 没有为 {} 保存快照，跳过回滚", job_id, key);
            return Ok(None);
        };

        let entries = Self::decode(&snapshot)?;
        let current = self.standings.get(key).await?;
        if current.state_hash() == state_hash(&entries) {
            debug!("{} 当前积分榜与快照 {} 一致，无需回滚", key, snapshot.id);
            return Ok(None);
        }

        self.restore(snapshot.id, Actor::System, Some(job_id))
            .await
            .map(Some)
    }

    /// 读取当前版本并整体替换，版本被并发改动时重新读取
    async fn overwrite(
        &self,
        key: StandingsKey,
        entries: &[StandingsEntry],
        job_id: Option<i64>,
    ) -> StandingsResult<(StandingsTable, StandingsTable)> {
        let mut attempt = 1;
        loop {
            let before = self.standings.get(key).await?;
            match self
                .standings
                .compare_and_commit(key, before.version, entries, job_id, Utc::now())
                .await
            {
                Ok(after) => return Ok((before, after)),
                Err(e @ StandingsError::VersionConflict { .. }) if attempt < RESTORE_CAS_ATTEMPTS => {
                    warn!("恢复 {} 时版本冲突，重新读取: {}", key, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

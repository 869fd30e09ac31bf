use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use standings_domain::{
    entities::{MatchRecord, MatchSet, Team},
    repositories::MatchRepository,
    value_objects::StandingsKey,
};
use standings_errors::StandingsResult;
use tracing::{debug, instrument};

/// 只读访问外部系统维护的 teams / matches 表
pub struct SqliteMatchRepository {
    pool: SqlitePool,
}

impl SqliteMatchRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MatchRepository for SqliteMatchRepository {
    #[instrument(skip(self), fields(league_id = key.league_id, season_id = key.season_id))]
    async fn load_match_set(&self, key: StandingsKey) -> StandingsResult<MatchSet> {
        let team_rows = sqlx::query(
            "SELECT id, name FROM teams WHERE league_id = $1 AND season_id = $2 ORDER BY id",
        )
        .bind(key.league_id)
        .bind(key.season_id)
        .fetch_all(&self.pool)
        .await?;

        let teams = team_rows
            .iter()
            .map(|row| {
                Ok(Team {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let match_rows = sqlx::query(
            "SELECT id, home_team_id, away_team_id, home_score, away_score \
             FROM matches WHERE league_id = $1 AND season_id = $2 ORDER BY id",
        )
        .bind(key.league_id)
        .bind(key.season_id)
        .fetch_all(&self.pool)
        .await?;

        let matches = match_rows
            .iter()
            .map(|row| {
                Ok(MatchRecord {
                    id: row.try_get("id")?,
                    home_team_id: row.try_get("home_team_id")?,
                    away_team_id: row.try_get("away_team_id")?,
                    home_score: row.try_get("home_score")?,
                    away_score: row.try_get("away_score")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        debug!("加载 {} 支球队, {} 场比赛", teams.len(), matches.len());
        Ok(MatchSet { teams, matches })
    }
}

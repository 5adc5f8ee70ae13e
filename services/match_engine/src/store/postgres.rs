use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres, Transaction};
use std::str::FromStr;
use tracing::{debug, info};

use super::{ChangeSet, MatchRepository, Side, Write};
use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::types::{
    EventType, Formation, FormationType, LineupPosition, Match, MatchEvent, MatchId, NewMatch,
    PlayerId, PlayerMinutes, SquadEntry, SquadStatus, TeamId,
};

pub const SCHEMA: &str = include_str!("../../schema.sql");

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct MatchRow {
    id: String,
    home_team_id: String,
    away_team_id: String,
    score_home: i32,
    score_away: i32,
    formation_type: Option<String>,
    version: i64,
}

#[derive(sqlx::FromRow)]
struct EventRow {
    sequence: i64,
    minute: i32,
    event_type: String,
    player_id: String,
    related_player_id: Option<String>,
    team_id: String,
    recorded_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SquadRow {
    player_id: String,
    status: String,
}

#[derive(sqlx::FromRow)]
struct PositionRow {
    player_id: String,
    position_code: String,
    x: Option<f64>,
    y: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct FormationRow {
    formation_name: String,
    formation_type: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct MinutesRow {
    player_id: String,
    minute_on: i32,
    minute_off: Option<i32>,
}

fn parse_column<T: FromStr>(column: &str, value: &str) -> Result<T, StoreError> {
    value
        .parse::<T>()
        .map_err(|_| StoreError::Corrupt(format!("{column} = '{value}'")))
}

fn unsigned(column: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} = {value}")))
}

fn signed(column: &str, value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} = {value} exceeds INTEGER")))
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig, url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await?;
        info!(max_connections = config.max_connections, "Connected to Postgres");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        info!("Applied match engine schema");
        Ok(())
    }

    async fn apply_write(
        tx: &mut Transaction<'_, Postgres>,
        match_id: &MatchId,
        write: &Write,
    ) -> Result<(), StoreError> {
        match write {
            Write::AppendEvent(event) => {
                sqlx::query(
                    r#"
                    INSERT INTO match_events (
                        match_id, sequence, minute, event_type,
                        player_id, related_player_id, team_id, recorded_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(match_id.as_str())
                .bind(event.sequence as i64)
                .bind(signed("minute", event.minute)?)
                .bind(event.event_type.as_str())
                .bind(event.player_id.as_str())
                .bind(event.related_player_id.as_ref().map(|p| p.as_str()))
                .bind(event.team_id.as_str())
                .bind(event.recorded_at)
                .execute(&mut **tx)
                .await?;
            }
            Write::IncrementScore(side) => {
                let sql = match side {
                    Side::Home => "UPDATE matches SET score_home = score_home + 1 WHERE id = $1",
                    Side::Away => "UPDATE matches SET score_away = score_away + 1 WHERE id = $1",
                };
                sqlx::query(sql)
                    .bind(match_id.as_str())
                    .execute(&mut **tx)
                    .await?;
            }
            Write::SetScore { home, away } => {
                sqlx::query("UPDATE matches SET score_home = $2, score_away = $3 WHERE id = $1")
                    .bind(match_id.as_str())
                    .bind(signed("score_home", *home)?)
                    .bind(signed("score_away", *away)?)
                    .execute(&mut **tx)
                    .await?;
            }
            Write::OpenInterval(interval) => {
                sqlx::query(
                    r#"
                    INSERT INTO player_minutes (match_id, player_id, minute_on, minute_off)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(match_id.as_str())
                .bind(interval.player_id.as_str())
                .bind(signed("minute_on", interval.minute_on)?)
                .bind(
                    interval
                        .minute_off
                        .map(|m| signed("minute_off", m))
                        .transpose()?,
                )
                .execute(&mut **tx)
                .await?;
            }
            Write::CloseInterval {
                player_id,
                minute_off,
            } => {
                sqlx::query(
                    r#"
                    UPDATE player_minutes SET minute_off = $3
                    WHERE match_id = $1 AND player_id = $2 AND minute_off IS NULL
                    "#,
                )
                .bind(match_id.as_str())
                .bind(player_id.as_str())
                .bind(signed("minute_off", *minute_off)?)
                .execute(&mut **tx)
                .await?;
            }
            Write::ReplaceSquad(entries) => {
                sqlx::query("DELETE FROM squad_entries WHERE match_id = $1")
                    .bind(match_id.as_str())
                    .execute(&mut **tx)
                    .await?;
                for entry in entries {
                    sqlx::query(
                        "INSERT INTO squad_entries (match_id, player_id, status) VALUES ($1, $2, $3)",
                    )
                    .bind(match_id.as_str())
                    .bind(entry.player_id.as_str())
                    .bind(entry.status.as_str())
                    .execute(&mut **tx)
                    .await?;
                }
            }
            Write::ReplaceLineup(positions) => {
                sqlx::query("DELETE FROM lineup_positions WHERE match_id = $1")
                    .bind(match_id.as_str())
                    .execute(&mut **tx)
                    .await?;
                for position in positions {
                    sqlx::query(
                        r#"
                        INSERT INTO lineup_positions (match_id, player_id, position_code, x, y)
                        VALUES ($1, $2, $3, $4, $5)
                        "#,
                    )
                    .bind(match_id.as_str())
                    .bind(position.player_id.as_str())
                    .bind(&position.position_code)
                    .bind(position.x)
                    .bind(position.y)
                    .execute(&mut **tx)
                    .await?;
                }
            }
            Write::AppendFormation(formation) => {
                sqlx::query(
                    r#"
                    INSERT INTO formations (match_id, formation_name, formation_type, created_at)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(match_id.as_str())
                .bind(&formation.formation_name)
                .bind(formation.formation_type.as_str())
                .bind(formation.created_at)
                .execute(&mut **tx)
                .await?;
                sqlx::query("UPDATE matches SET formation_type = $2 WHERE id = $1")
                    .bind(match_id.as_str())
                    .bind(formation.formation_type.as_str())
                    .execute(&mut **tx)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MatchRepository for PgStore {
    async fn load(&self, match_id: &MatchId) -> Result<Option<Match>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let Some(row) = sqlx::query_as::<_, MatchRow>(
            r#"
            SELECT id, home_team_id, away_team_id, score_home, score_away, formation_type, version
            FROM matches WHERE id = $1
            "#,
        )
        .bind(match_id.as_str())
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        let events = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT sequence, minute, event_type, player_id, related_player_id, team_id, recorded_at
            FROM match_events WHERE match_id = $1
            ORDER BY sequence
            "#,
        )
        .bind(match_id.as_str())
        .fetch_all(&mut *tx)
        .await?;

        let squad = sqlx::query_as::<_, SquadRow>(
            "SELECT player_id, status FROM squad_entries WHERE match_id = $1 ORDER BY player_id",
        )
        .bind(match_id.as_str())
        .fetch_all(&mut *tx)
        .await?;

        let lineup = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT player_id, position_code, x, y
            FROM lineup_positions WHERE match_id = $1
            ORDER BY player_id
            "#,
        )
        .bind(match_id.as_str())
        .fetch_all(&mut *tx)
        .await?;

        let formations = sqlx::query_as::<_, FormationRow>(
            r#"
            SELECT formation_name, formation_type, created_at
            FROM formations WHERE match_id = $1
            ORDER BY id
            "#,
        )
        .bind(match_id.as_str())
        .fetch_all(&mut *tx)
        .await?;

        let minutes = sqlx::query_as::<_, MinutesRow>(
            "SELECT player_id, minute_on, minute_off FROM player_minutes WHERE match_id = $1 ORDER BY id",
        )
        .bind(match_id.as_str())
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let id = MatchId::new(row.id);
        let mut loaded = Match::new(NewMatch {
            id: id.clone(),
            home_team_id: TeamId::new(row.home_team_id),
            away_team_id: TeamId::new(row.away_team_id),
        });
        loaded.score_home = unsigned("score_home", row.score_home)?;
        loaded.score_away = unsigned("score_away", row.score_away)?;
        loaded.formation_type = row
            .formation_type
            .as_deref()
            .map(|t| parse_column::<FormationType>("formation_type", t))
            .transpose()?;
        loaded.version = row.version;

        for event in events {
            loaded.events.push(MatchEvent {
                match_id: id.clone(),
                sequence: u64::try_from(event.sequence)
                    .map_err(|_| StoreError::Corrupt(format!("sequence = {}", event.sequence)))?,
                minute: unsigned("minute", event.minute)?,
                event_type: parse_column::<EventType>("event_type", &event.event_type)?,
                player_id: PlayerId::new(event.player_id),
                related_player_id: event.related_player_id.map(PlayerId::new),
                team_id: TeamId::new(event.team_id),
                recorded_at: event.recorded_at,
            });
        }
        for entry in squad {
            loaded.squad.push(SquadEntry {
                match_id: id.clone(),
                player_id: PlayerId::new(entry.player_id),
                status: parse_column::<SquadStatus>("status", &entry.status)?,
            });
        }
        for position in lineup {
            loaded.lineup.push(LineupPosition {
                match_id: id.clone(),
                player_id: PlayerId::new(position.player_id),
                position_code: position.position_code,
                x: position.x,
                y: position.y,
            });
        }
        for formation in formations {
            loaded.formations.push(Formation {
                match_id: id.clone(),
                formation_name: formation.formation_name,
                formation_type: parse_column::<FormationType>(
                    "formation_type",
                    &formation.formation_type,
                )?,
                created_at: formation.created_at,
            });
        }
        for interval in minutes {
            loaded.minutes.push(PlayerMinutes {
                match_id: id.clone(),
                player_id: PlayerId::new(interval.player_id),
                minute_on: unsigned("minute_on", interval.minute_on)?,
                minute_off: interval
                    .minute_off
                    .map(|m| unsigned("minute_off", m))
                    .transpose()?,
            });
        }

        Ok(Some(loaded))
    }

    async fn create(&self, new_match: NewMatch) -> Result<Match, StoreError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO matches (id, home_team_id, away_team_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(new_match.id.as_str())
        .bind(new_match.home_team_id.as_str())
        .bind(new_match.away_team_id.as_str())
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::DuplicateMatch);
        }
        Ok(Match::new(new_match))
    }

    async fn commit(&self, changes: &ChangeSet) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let bumped: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE matches SET version = version + 1, updated_at = now()
            WHERE id = $1 AND version = $2
            RETURNING version
            "#,
        )
        .bind(changes.match_id.as_str())
        .bind(changes.expected_version)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(version) = bumped else {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT version FROM matches WHERE id = $1")
                    .bind(changes.match_id.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match exists {
                Some(_) => StoreError::VersionMismatch,
                None => StoreError::MissingMatch,
            });
        };

        for write in &changes.writes {
            Self::apply_write(&mut tx, &changes.match_id, write).await?;
        }
        tx.commit().await?;

        debug!(
            match_id = %changes.match_id,
            writes = changes.writes.len(),
            version,
            "Committed change set"
        );
        Ok(version)
    }

    async fn delete(&self, match_id: &MatchId) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        for sql in [
            "DELETE FROM match_events WHERE match_id = $1",
            "DELETE FROM player_minutes WHERE match_id = $1",
            "DELETE FROM lineup_positions WHERE match_id = $1",
            "DELETE FROM formations WHERE match_id = $1",
            "DELETE FROM squad_entries WHERE match_id = $1",
        ] {
            sqlx::query(sql)
                .bind(match_id.as_str())
                .execute(&mut *tx)
                .await?;
        }
        let deleted = sqlx::query("DELETE FROM matches WHERE id = $1")
            .bind(match_id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(deleted.rows_affected() > 0)
    }
}

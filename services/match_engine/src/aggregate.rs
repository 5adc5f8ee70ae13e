use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::RulesConfig;
use crate::error::{EngineError, EngineResult, StoreError};
use crate::event_store;
use crate::lineup;
use crate::metrics::MetricsCollector;
use crate::minutes::{self, MinutesReport};
use crate::score;
use crate::store::{InMemoryStore, MatchRepository, Staged};
use crate::types::{
    EventType, Formation, FormationInput, LineupInput, Match, MatchEvent, MatchId, MatchView,
    NewEvent, NewMatch, SquadEntry,
};

/// Single entry point for reads and writes against a match.
///
/// Every command loads the match, runs its rules against a staged copy and
/// commits the resulting writes in one change set guarded by the loaded
/// version. When another request got there first the command is re-run on
/// fresh state, unless the caller pinned a version of its own.
#[derive(Clone)]
pub struct MatchService {
    repo: Arc<dyn MatchRepository>,
    rules: RulesConfig,
    metrics: MetricsCollector,
}

pub fn view(mut state: Match) -> MatchView {
    state.events = event_store::list_events(&state);
    let lineup_complete = lineup::lineup_complete(&state);
    MatchView {
        state,
        lineup_complete,
    }
}

impl MatchService {
    pub fn new(repo: Arc<dyn MatchRepository>, rules: RulesConfig) -> Self {
        Self {
            repo,
            rules,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn in_memory(rules: RulesConfig) -> Self {
        Self::new(Arc::new(InMemoryStore::new()), rules)
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn rules(&self) -> &RulesConfig {
        &self.rules
    }

    async fn load(&self, match_id: &MatchId) -> EngineResult<Match> {
        self.repo
            .load(match_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("match {match_id} not found")))
    }

    async fn execute<T, F>(
        &self,
        match_id: &MatchId,
        expected_version: Option<i64>,
        command: F,
    ) -> EngineResult<(T, Match)>
    where
        F: FnMut(&mut Staged) -> EngineResult<T> + Send,
        T: Send,
    {
        let tracker = self.metrics.record_command_start();
        let outcome = self.run(match_id, expected_version, command).await;
        tracker.finish(&outcome);
        if let Err(err) = &outcome {
            warn!(%match_id, class = err.class(), error = %err, "Command rejected");
        }
        outcome
    }

    async fn run<T, F>(
        &self,
        match_id: &MatchId,
        expected_version: Option<i64>,
        mut command: F,
    ) -> EngineResult<(T, Match)>
    where
        F: FnMut(&mut Staged) -> EngineResult<T> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            let loaded = self.load(match_id).await?;
            if let Some(expected) = expected_version {
                if loaded.version != expected {
                    return Err(EngineError::Conflict(format!(
                        "match {} is at version {}, expected {}",
                        match_id, loaded.version, expected
                    )));
                }
            }

            let mut staged = Staged::new(loaded);
            let output = command(&mut staged)?;
            let (changes, mut state) = staged.finish();
            if changes.writes.is_empty() {
                return Ok((output, state));
            }

            match self.repo.commit(&changes).await {
                Ok(version) => {
                    state.version = version;
                    return Ok((output, state));
                }
                Err(StoreError::VersionMismatch)
                    if expected_version.is_none() && attempt < self.rules.conflict_retries =>
                {
                    attempt += 1;
                    self.metrics.record_conflict_retry();
                    warn!(%match_id, attempt, "Concurrent write detected, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    #[instrument(skip(self, new_match), fields(match_id = %new_match.id))]
    pub async fn create_match(&self, new_match: NewMatch) -> EngineResult<MatchView> {
        if new_match.id.as_str().trim().is_empty() {
            return Err(EngineError::missing("id"));
        }
        if new_match.home_team_id.as_str().trim().is_empty() {
            return Err(EngineError::missing("homeTeamId"));
        }
        if new_match.away_team_id.as_str().trim().is_empty() {
            return Err(EngineError::missing("awayTeamId"));
        }
        if new_match.home_team_id == new_match.away_team_id {
            return Err(EngineError::validation(
                "awayTeamId",
                "must differ from homeTeamId",
            ));
        }

        let created = self.repo.create(new_match).await?;
        info!("Match registered");
        Ok(view(created))
    }

    #[instrument(skip(self))]
    pub async fn get_match(&self, match_id: &MatchId) -> EngineResult<MatchView> {
        Ok(view(self.load(match_id).await?))
    }

    pub async fn list_events(&self, match_id: &MatchId) -> EngineResult<Vec<MatchEvent>> {
        Ok(event_store::list_events(&self.load(match_id).await?))
    }

    #[instrument(skip(self, input), fields(event_type = ?input.event_type, minute = ?input.minute))]
    pub async fn record_event(
        &self,
        match_id: &MatchId,
        input: NewEvent,
    ) -> EngineResult<MatchEvent> {
        let strict_squad = self.rules.strict_squad;
        let (event, _) = self
            .execute(match_id, None, |staged| {
                let valid = event_store::validate(&input, staged.state(), strict_squad)?;
                let event = event_store::append(staged, valid, Utc::now());

                match event.event_type {
                    EventType::Goal => score::on_goal(staged, &event.team_id),
                    EventType::SubOn => {
                        minutes::player_enters_at(staged, &event.player_id, event.minute);
                        if let Some(outgoing) = &event.related_player_id {
                            minutes::player_exits_at(staged, outgoing, event.minute)?;
                        }
                    }
                    EventType::SubOff => {
                        minutes::player_exits_at(staged, &event.player_id, event.minute)?;
                    }
                    _ => {}
                }

                // A player leaving at kick-off is not put back on the field.
                if event.minute == 0 && event.event_type != EventType::SubOff {
                    minutes::bootstrap_starter(staged, &event.player_id);
                }

                Ok(event)
            })
            .await?;

        info!(sequence = event.sequence, "Event recorded");
        Ok(event)
    }

    #[instrument(skip(self, player_ids), fields(players = player_ids.len()))]
    pub async fn set_squad(
        &self,
        match_id: &MatchId,
        player_ids: Vec<String>,
        expected_version: Option<i64>,
    ) -> EngineResult<Vec<SquadEntry>> {
        let (entries, _) = self
            .execute(match_id, expected_version, |staged| {
                Ok(lineup::set_squad(staged, &player_ids))
            })
            .await?;
        info!(squad = entries.len(), "Squad replaced");
        Ok(entries)
    }

    #[instrument(skip(self, input), fields(formation = %input.formation_name, positions = input.positions.len()))]
    pub async fn set_lineup(
        &self,
        match_id: &MatchId,
        input: LineupInput,
        expected_version: Option<i64>,
    ) -> EngineResult<MatchView> {
        let (_, state) = self
            .execute(match_id, expected_version, |staged| {
                lineup::set_lineup(staged, &input, Utc::now())
            })
            .await?;
        info!(starting = state.lineup.len(), "Lineup replaced");
        Ok(view(state))
    }

    #[instrument(skip(self, input), fields(formation = %input.formation_name))]
    pub async fn set_formation(
        &self,
        match_id: &MatchId,
        input: FormationInput,
        expected_version: Option<i64>,
    ) -> EngineResult<Formation> {
        let (formation, _) = self
            .execute(match_id, expected_version, |staged| {
                lineup::set_formation(staged, &input, Utc::now())
            })
            .await?;
        Ok(formation)
    }

    #[instrument(skip(self))]
    pub async fn recompute_score(&self, match_id: &MatchId) -> EngineResult<MatchView> {
        let (changed, state) = self
            .execute(match_id, None, |staged| Ok(score::recompute(staged)))
            .await?;
        info!(changed, home = state.score_home, away = state.score_away, "Score recomputed");
        Ok(view(state))
    }

    #[instrument(skip(self))]
    pub async fn kick_off(&self, match_id: &MatchId) -> EngineResult<MatchView> {
        let (opened, state) = self
            .execute(match_id, None, |staged| Ok(minutes::kick_off(staged)))
            .await?;
        info!(opened, "Kick-off intervals opened");
        Ok(view(state))
    }

    pub async fn minutes_report(
        &self,
        match_id: &MatchId,
        at: Option<u32>,
    ) -> EngineResult<MinutesReport> {
        let state = self.load(match_id).await?;
        Ok(minutes::report(
            &state,
            at.unwrap_or(self.rules.regulation_minutes),
        ))
    }

    #[instrument(skip(self))]
    pub async fn delete_match(&self, match_id: &MatchId) -> EngineResult<()> {
        let tracker = self.metrics.record_command_start();
        let outcome = match self.repo.delete(match_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(EngineError::NotFound(format!("match {match_id} not found"))),
            Err(err) => Err(err.into()),
        };
        tracker.finish(&outcome);
        if outcome.is_ok() {
            info!("Match deleted with all events, minutes, lineup, formations and squad");
        }
        outcome
    }
}

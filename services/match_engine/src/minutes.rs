use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::store::{Staged, Write};
use crate::types::{Match, MatchId, PlayerId, PlayerMinutes, SquadStatus};

/// Opens an interval for the player unless one is already open.
///
/// Returns false when the call was a no-op. The interval that is already
/// open wins; a later entry is dropped rather than merged.
pub fn player_enters_at(staged: &mut Staged, player_id: &PlayerId, minute: u32) -> bool {
    if staged.state().open_interval(player_id).is_some() {
        debug!(%player_id, minute, "Player already on field, entry ignored");
        return false;
    }
    let match_id = staged.state().id.clone();
    staged.push(Write::OpenInterval(PlayerMinutes {
        match_id,
        player_id: player_id.clone(),
        minute_on: minute,
        minute_off: None,
    }));
    true
}

/// Closes the player's open interval at `minute`.
///
/// An exit without a recorded entry is a no-op. An exit before the open
/// interval started is rejected, since it would leave `minuteOff < minuteOn`.
pub fn player_exits_at(
    staged: &mut Staged,
    player_id: &PlayerId,
    minute: u32,
) -> EngineResult<bool> {
    let Some(open) = staged.state().open_interval(player_id) else {
        debug!(%player_id, minute, "No open interval, exit ignored");
        return Ok(false);
    };
    if minute < open.minute_on {
        return Err(EngineError::validation(
            "minute",
            format!(
                "player {} entered at minute {} and cannot leave at minute {}",
                player_id, open.minute_on, minute
            ),
        ));
    }
    staged.push(Write::CloseInterval {
        player_id: player_id.clone(),
        minute_off: minute,
    });
    Ok(true)
}

/// Opens `[0, open)` for a starting player that has never been on the field.
///
/// A starter with any recorded interval is left alone, so a substituted
/// starter is not put back on at minute 0.
pub fn bootstrap_starter(staged: &mut Staged, player_id: &PlayerId) -> bool {
    let state = staged.state();
    let starting = state
        .squad_entry(player_id)
        .is_some_and(|e| e.status == SquadStatus::Starting);
    if !starting || state.has_minutes(player_id) {
        return false;
    }
    player_enters_at(staged, player_id, 0)
}

/// Opens a minute-0 interval for every starting player with no minutes yet.
pub fn kick_off(staged: &mut Staged) -> usize {
    let starters: Vec<PlayerId> = staged
        .state()
        .squad
        .iter()
        .filter(|entry| entry.status == SquadStatus::Starting)
        .map(|entry| entry.player_id.clone())
        .collect();

    starters
        .iter()
        .filter(|player_id| bootstrap_starter(staged, player_id))
        .count()
}

/// Intervals grouped by player, each group ordered by `minuteOn`.
pub fn list_intervals(state: &Match) -> BTreeMap<PlayerId, Vec<PlayerMinutes>> {
    let mut grouped: BTreeMap<PlayerId, Vec<PlayerMinutes>> = BTreeMap::new();
    for interval in &state.minutes {
        grouped
            .entry(interval.player_id.clone())
            .or_default()
            .push(interval.clone());
    }
    for intervals in grouped.values_mut() {
        intervals.sort_by_key(|i| (i.minute_on, i.minute_off.is_none()));
    }
    grouped
}

/// Total minutes on the field, counting open intervals up to `at`.
pub fn played_minutes(intervals: &[PlayerMinutes], at: u32) -> u32 {
    intervals
        .iter()
        .map(|i| i.minute_off.unwrap_or(at).saturating_sub(i.minute_on))
        .sum()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMinutesSummary {
    pub player_id: PlayerId,
    pub on_field: bool,
    pub played: u32,
    pub intervals: Vec<PlayerMinutes>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinutesReport {
    pub match_id: MatchId,
    pub at: u32,
    pub players: Vec<PlayerMinutesSummary>,
}

pub fn report(state: &Match, at: u32) -> MinutesReport {
    let players = list_intervals(state)
        .into_iter()
        .map(|(player_id, intervals)| PlayerMinutesSummary {
            player_id,
            on_field: intervals.iter().any(PlayerMinutes::is_open),
            played: played_minutes(&intervals, at),
            intervals,
        })
        .collect();

    MinutesReport {
        match_id: state.id.clone(),
        at,
        players,
    }
}

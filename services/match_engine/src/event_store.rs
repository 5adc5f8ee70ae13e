use chrono::{DateTime, Utc};

use crate::error::{EngineError, EngineResult};
use crate::store::{Staged, Write};
use crate::types::{EventType, Match, MatchEvent, NewEvent, PlayerId, TeamId};

/// An event input that passed validation against the match it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidEvent {
    pub minute: u32,
    pub event_type: EventType,
    pub player_id: PlayerId,
    pub related_player_id: Option<PlayerId>,
    pub team_id: TeamId,
}

/// Largest minute the INTEGER columns of the Postgres store can hold.
pub const MAX_MINUTE: u32 = i32::MAX as u32;

fn present<'a>(value: &'a Option<String>) -> Option<&'a str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(value: &'a Option<String>, field: &str) -> EngineResult<&'a str> {
    present(value).ok_or_else(|| EngineError::missing(field))
}

pub fn validate(input: &NewEvent, state: &Match, strict_squad: bool) -> EngineResult<ValidEvent> {
    let minute = input.minute.ok_or_else(|| EngineError::missing("minute"))?;
    let minute = u32::try_from(minute)
        .map_err(|_| EngineError::validation("minute", "must be a non-negative integer"))?;
    if minute > MAX_MINUTE {
        return Err(EngineError::validation(
            "minute",
            format!("must not exceed {MAX_MINUTE}"),
        ));
    }

    let event_type = required(&input.event_type, "type")?
        .parse::<EventType>()
        .map_err(|e| EngineError::validation("type", e.to_string()))?;

    let player_id = PlayerId::from(required(&input.player_id, "playerId")?);
    let team_id = TeamId::from(required(&input.team_id, "teamId")?);

    let related_player_id = if event_type.is_substitution() {
        let related = PlayerId::from(required(&input.related_player_id, "relatedPlayerId")?);
        if related == player_id {
            return Err(EngineError::validation(
                "relatedPlayerId",
                "must differ from playerId for a substitution",
            ));
        }
        Some(related)
    } else {
        present(&input.related_player_id).map(PlayerId::from)
    };

    if team_id != state.home_team_id && team_id != state.away_team_id {
        return Err(EngineError::validation(
            "teamId",
            format!("team {} is not playing in match {}", team_id, state.id),
        ));
    }

    if strict_squad {
        for player in std::iter::once(&player_id).chain(related_player_id.iter()) {
            if state.squad_entry(player).is_none() {
                return Err(EngineError::NotFound(format!(
                    "player {} is not in the squad for match {}",
                    player, state.id
                )));
            }
        }
    }

    Ok(ValidEvent {
        minute,
        event_type,
        player_id,
        related_player_id,
        team_id,
    })
}

pub fn append(staged: &mut Staged, event: ValidEvent, recorded_at: DateTime<Utc>) -> MatchEvent {
    let state = staged.state();
    let appended = MatchEvent {
        match_id: state.id.clone(),
        sequence: state.next_sequence(),
        minute: event.minute,
        event_type: event.event_type,
        player_id: event.player_id,
        related_player_id: event.related_player_id,
        team_id: event.team_id,
        recorded_at,
    };
    staged.push(Write::AppendEvent(appended.clone()));
    appended
}

/// Events ordered by minute; entries at the same minute keep append order.
pub fn list_events(state: &Match) -> Vec<MatchEvent> {
    let mut events = state.events.clone();
    events.sort_by_key(|e| (e.minute, e.sequence));
    events
}

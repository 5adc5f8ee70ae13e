use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::store::{Staged, Write};
use crate::types::{
    Formation, FormationInput, FormationType, LineupInput, LineupPosition, Match, PlayerId,
    PositionInput, SquadEntry, SquadStatus,
};

/// Replaces the whole squad. Every listed player is `Called`; anyone not
/// listed loses their entry.
pub fn set_squad(staged: &mut Staged, player_ids: &[String]) -> Vec<SquadEntry> {
    let match_id = staged.state().id.clone();
    let mut seen = HashSet::new();
    let mut entries: Vec<SquadEntry> = player_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && seen.insert(id.to_string()))
        .map(|id| SquadEntry {
            match_id: match_id.clone(),
            player_id: PlayerId::from(id),
            status: SquadStatus::Called,
        })
        .collect();
    entries.sort_by(|a, b| a.player_id.cmp(&b.player_id));

    staged.push(Write::ReplaceSquad(entries.clone()));
    entries
}

/// Keeps the first assignment per player and drops entries without a player.
pub fn dedupe_positions(positions: &[PositionInput]) -> Vec<PositionInput> {
    let mut seen = HashSet::new();
    positions
        .iter()
        .filter(|p| {
            let player_id = p.player_id.trim();
            !player_id.is_empty() && seen.insert(player_id.to_string())
        })
        .cloned()
        .collect()
}

fn validate_formation_name(name: &str) -> EngineResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::missing("formationName"));
    }
    Ok(name.to_string())
}

fn record_formation(
    staged: &mut Staged,
    formation_name: String,
    formation_type: FormationType,
    now: DateTime<Utc>,
) -> Formation {
    let formation = Formation {
        match_id: staged.state().id.clone(),
        formation_name,
        formation_type,
        created_at: now,
    };
    staged.push(Write::AppendFormation(formation.clone()));
    formation
}

pub fn set_lineup(staged: &mut Staged, input: &LineupInput, now: DateTime<Utc>) -> EngineResult<()> {
    let formation_name = validate_formation_name(&input.formation_name)?;
    let assignments = dedupe_positions(&input.positions);

    let state = staged.state();
    let mut positions = Vec::with_capacity(assignments.len());
    for assignment in &assignments {
        let player_id = PlayerId::from(assignment.player_id.trim());
        let position_code = assignment.position_code.trim();
        if position_code.is_empty() {
            return Err(EngineError::validation(
                "positionCode",
                format!("is required for player {player_id}"),
            ));
        }
        if state.squad_entry(&player_id).is_none() {
            return Err(EngineError::NotFound(format!(
                "player {} is not in the squad for match {}",
                player_id, state.id
            )));
        }
        positions.push(LineupPosition {
            match_id: state.id.clone(),
            player_id,
            position_code: position_code.to_string(),
            x: assignment.x,
            y: assignment.y,
        });
    }

    let starting: HashSet<&PlayerId> = positions.iter().map(|p| &p.player_id).collect();
    let mut squad = Vec::with_capacity(state.squad.len());
    for entry in &state.squad {
        let mut status = entry.status.reset_for_lineup();
        if starting.contains(&entry.player_id) {
            status = status
                .assign_position()
                .map_err(|e| EngineError::Conflict(e.to_string()))?;
        }
        squad.push(SquadEntry {
            status,
            ..entry.clone()
        });
    }

    let formation_changed = match state.current_formation() {
        Some(latest) => {
            latest.formation_name != formation_name
                || latest.formation_type != input.formation_type
        }
        None => true,
    };

    debug!(
        positions = positions.len(),
        squad = squad.len(),
        formation_changed,
        "Replacing lineup"
    );
    staged.push(Write::ReplaceLineup(positions));
    staged.push(Write::ReplaceSquad(squad));
    if formation_changed {
        record_formation(staged, formation_name, input.formation_type, now);
    }
    Ok(())
}

/// Appends to the formation history without touching position rows.
pub fn set_formation(
    staged: &mut Staged,
    input: &FormationInput,
    now: DateTime<Utc>,
) -> EngineResult<Formation> {
    let formation_name = validate_formation_name(&input.formation_name)?;
    Ok(record_formation(staged, formation_name, input.formation_type, now))
}

pub fn lineup_complete(state: &Match) -> bool {
    state
        .formation_type
        .is_some_and(|t| state.lineup.len() == t.required_slots())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchId, NewMatch, TeamId};
    use pretty_assertions::assert_eq;

    fn staged_with_squad(players: &[&str]) -> Staged {
        let mut staged = Staged::new(Match::new(NewMatch {
            id: MatchId::from("m1"),
            home_team_id: TeamId::from("home"),
            away_team_id: TeamId::from("away"),
        }));
        let ids: Vec<String> = players.iter().map(|p| p.to_string()).collect();
        set_squad(&mut staged, &ids);
        staged
    }

    fn position(player: &str, code: &str) -> PositionInput {
        PositionInput {
            player_id: player.to_string(),
            position_code: code.to_string(),
            x: None,
            y: None,
        }
    }

    fn lineup(positions: Vec<PositionInput>) -> LineupInput {
        LineupInput {
            formation_name: "4-3-3".to_string(),
            formation_type: FormationType::ElevenVEleven,
            positions,
        }
    }

    fn statuses(state: &Match) -> Vec<(String, SquadStatus)> {
        state
            .squad
            .iter()
            .map(|e| (e.player_id.0.clone(), e.status))
            .collect()
    }

    #[test]
    fn test_set_squad_dedupes_and_calls_everyone() {
        let mut staged = staged_with_squad(&["a"]);
        let entries = set_squad(
            &mut staged,
            &["b".to_string(), "c".to_string(), "b".to_string(), "".to_string()],
        );

        assert_eq!(entries.len(), 2);
        assert_eq!(
            statuses(staged.state()),
            vec![
                ("b".to_string(), SquadStatus::Called),
                ("c".to_string(), SquadStatus::Called)
            ]
        );
    }

    #[test]
    fn test_lineup_marks_exactly_positioned_players_starting() {
        let mut staged = staged_with_squad(&["a", "b", "c"]);
        set_lineup(
            &mut staged,
            &lineup(vec![position("a", "GK"), position("b", "ST")]),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(
            statuses(staged.state()),
            vec![
                ("a".to_string(), SquadStatus::Starting),
                ("b".to_string(), SquadStatus::Starting),
                ("c".to_string(), SquadStatus::Bench)
            ]
        );
        assert_eq!(staged.state().lineup.len(), 2);
        assert_eq!(
            staged.state().formation_type,
            Some(FormationType::ElevenVEleven)
        );
    }

    #[test]
    fn test_duplicate_and_empty_players_dropped() {
        let deduped = dedupe_positions(&[
            position("a", "GK"),
            position("", "CB"),
            position("a", "ST"),
            position("b", "CB"),
        ]);
        let codes: Vec<(&str, &str)> = deduped
            .iter()
            .map(|p| (p.player_id.as_str(), p.position_code.as_str()))
            .collect();
        assert_eq!(codes, vec![("a", "GK"), ("b", "CB")]);
    }

    #[test]
    fn test_unassigned_player_returns_to_bench() {
        let mut staged = staged_with_squad(&["a", "b"]);
        set_lineup(&mut staged, &lineup(vec![position("a", "GK")]), Utc::now()).unwrap();
        set_lineup(&mut staged, &lineup(vec![position("b", "GK")]), Utc::now()).unwrap();

        assert_eq!(
            statuses(staged.state()),
            vec![
                ("a".to_string(), SquadStatus::Bench),
                ("b".to_string(), SquadStatus::Starting)
            ]
        );
    }

    #[test]
    fn test_player_outside_squad_rejected() {
        let mut staged = staged_with_squad(&["a"]);
        let err = set_lineup(&mut staged, &lineup(vec![position("z", "GK")]), Utc::now())
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn test_repeated_lineup_does_not_grow_formation_history() {
        let mut staged = staged_with_squad(&["a"]);
        let input = lineup(vec![position("a", "GK")]);
        set_lineup(&mut staged, &input, Utc::now()).unwrap();
        set_lineup(&mut staged, &input, Utc::now()).unwrap();
        assert_eq!(staged.state().formations.len(), 1);
    }

    #[test]
    fn test_set_formation_keeps_positions() {
        let mut staged = staged_with_squad(&["a"]);
        set_lineup(&mut staged, &lineup(vec![position("a", "GK")]), Utc::now()).unwrap();

        let formation = set_formation(
            &mut staged,
            &FormationInput {
                formation_name: "3-2-3".to_string(),
                formation_type: FormationType::NineVNine,
            },
            Utc::now(),
        )
        .unwrap();

        assert_eq!(formation.formation_type, FormationType::NineVNine);
        assert_eq!(staged.state().lineup.len(), 1);
        assert_eq!(staged.state().formations.len(), 2);
        assert_eq!(staged.state().formation_type, Some(FormationType::NineVNine));
    }

    #[test]
    fn test_lineup_complete_tracks_slot_count() {
        let players: Vec<String> = (0..7).map(|i| format!("p{i}")).collect();
        let refs: Vec<&str> = players.iter().map(String::as_str).collect();
        let mut staged = staged_with_squad(&refs);
        let mut input = LineupInput {
            formation_name: "2-3-1".to_string(),
            formation_type: FormationType::SevenVSeven,
            positions: players.iter().map(|p| position(p, "CM")).collect(),
        };

        input.positions.pop();
        set_lineup(&mut staged, &input, Utc::now()).unwrap();
        assert!(!lineup_complete(staged.state()));

        input.positions.push(position("p6", "ST"));
        set_lineup(&mut staged, &input, Utc::now()).unwrap();
        assert!(lineup_complete(staged.state()));
    }

    #[test]
    fn test_called_player_cannot_start_directly() {
        assert!(SquadStatus::Called.assign_position().is_err());
        assert_eq!(
            SquadStatus::Called.reset_for_lineup().assign_position(),
            Ok(SquadStatus::Starting)
        );
    }
}

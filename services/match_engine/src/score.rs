use tracing::{info, warn};

use crate::store::{Side, Staged, Write};
use crate::types::{EventType, Match, MatchEvent, TeamId};

fn side_of(state: &Match, team_id: &TeamId) -> Side {
    if team_id == &state.home_team_id {
        Side::Home
    } else {
        Side::Away
    }
}

/// Adds exactly one goal to the scoring side. The score is never rebuilt
/// from history here, so removing a GOAL event does not lower it.
pub fn on_goal(staged: &mut Staged, team_id: &TeamId) {
    let side = side_of(staged.state(), team_id);
    staged.push(Write::IncrementScore(side));
}

/// Goals per side according to the event log.
pub fn tally(state: &Match, events: &[MatchEvent]) -> (u32, u32) {
    events
        .iter()
        .filter(|e| e.event_type == EventType::Goal)
        .fold((0, 0), |(home, away), e| match side_of(state, &e.team_id) {
            Side::Home => (home + 1, away),
            Side::Away => (home, away + 1),
        })
}

/// Rebuilds both scores from the GOAL events. Returns true if they changed.
pub fn recompute(staged: &mut Staged) -> bool {
    let state = staged.state();
    let (home, away) = tally(state, &state.events);
    if (home, away) == (state.score_home, state.score_away) {
        return false;
    }

    warn!(
        match_id = %state.id,
        stored_home = state.score_home,
        stored_away = state.score_away,
        home,
        away,
        "Stored score drifted from goal events"
    );
    staged.push(Write::SetScore { home, away });
    info!(home, away, "Score reconciled");
    true
}

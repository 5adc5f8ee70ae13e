pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{
    Formation, LineupPosition, Match, MatchEvent, MatchId, NewMatch, PlayerId, PlayerMinutes,
    SquadEntry,
};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

/// One mutation of a match's row set.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    AppendEvent(MatchEvent),
    IncrementScore(Side),
    SetScore { home: u32, away: u32 },
    OpenInterval(PlayerMinutes),
    CloseInterval { player_id: PlayerId, minute_off: u32 },
    ReplaceSquad(Vec<SquadEntry>),
    ReplaceLineup(Vec<LineupPosition>),
    AppendFormation(Formation),
}

impl Match {
    pub fn apply(&mut self, write: &Write) {
        match write {
            Write::AppendEvent(event) => self.events.push(event.clone()),
            Write::IncrementScore(Side::Home) => self.score_home += 1,
            Write::IncrementScore(Side::Away) => self.score_away += 1,
            Write::SetScore { home, away } => {
                self.score_home = *home;
                self.score_away = *away;
            }
            Write::OpenInterval(interval) => self.minutes.push(interval.clone()),
            Write::CloseInterval {
                player_id,
                minute_off,
            } => {
                if let Some(open) = self
                    .minutes
                    .iter_mut()
                    .find(|m| &m.player_id == player_id && m.is_open())
                {
                    open.minute_off = Some(*minute_off);
                }
            }
            // Rows are kept by player id, the order the Postgres store loads them in.
            Write::ReplaceSquad(entries) => {
                self.squad = entries.clone();
                self.squad.sort_by(|a, b| a.player_id.cmp(&b.player_id));
            }
            Write::ReplaceLineup(positions) => {
                self.lineup = positions.clone();
                self.lineup.sort_by(|a, b| a.player_id.cmp(&b.player_id));
            }
            Write::AppendFormation(formation) => {
                self.formation_type = Some(formation.formation_type);
                self.formations.push(formation.clone());
            }
        }
    }
}

/// Writes of one command, committed together or not at all.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub match_id: MatchId,
    pub expected_version: i64,
    pub writes: Vec<Write>,
}

/// Working copy of a match that records every write applied to it.
///
/// Domain rules read the copy, so a later step in a command sees the effect
/// of an earlier one before anything reaches the store.
#[derive(Debug)]
pub struct Staged {
    working: Match,
    expected_version: i64,
    writes: Vec<Write>,
}

impl Staged {
    pub fn new(loaded: Match) -> Self {
        let expected_version = loaded.version;
        Self {
            working: loaded,
            expected_version,
            writes: Vec::new(),
        }
    }

    pub fn state(&self) -> &Match {
        &self.working
    }

    pub fn push(&mut self, write: Write) {
        self.working.apply(&write);
        self.writes.push(write);
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Splits into the change set to commit and the state it produces.
    pub fn finish(self) -> (ChangeSet, Match) {
        let mut state = self.working;
        let changes = ChangeSet {
            match_id: state.id.clone(),
            expected_version: self.expected_version,
            writes: self.writes,
        };
        if !changes.writes.is_empty() {
            state.version = self.expected_version + 1;
        }
        (changes, state)
    }
}

#[async_trait]
pub trait MatchRepository: Send + Sync {
    async fn load(&self, match_id: &MatchId) -> Result<Option<Match>, StoreError>;

    async fn create(&self, new_match: NewMatch) -> Result<Match, StoreError>;

    /// Applies every write atomically and returns the new version.
    async fn commit(&self, changes: &ChangeSet) -> Result<i64, StoreError>;

    /// Removes the match and all of its rows. Returns false if it was absent.
    async fn delete(&self, match_id: &MatchId) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchId, TeamId};

    fn fresh() -> Match {
        Match::new(NewMatch {
            id: MatchId::from("m1"),
            home_team_id: TeamId::from("home"),
            away_team_id: TeamId::from("away"),
        })
    }

    #[test]
    fn test_close_interval_only_touches_open_row() {
        let mut m = fresh();
        let p = PlayerId::from("p1");
        m.apply(&Write::OpenInterval(PlayerMinutes {
            match_id: m.id.clone(),
            player_id: p.clone(),
            minute_on: 0,
            minute_off: Some(20),
        }));
        m.apply(&Write::OpenInterval(PlayerMinutes {
            match_id: m.id.clone(),
            player_id: p.clone(),
            minute_on: 40,
            minute_off: None,
        }));
        m.apply(&Write::CloseInterval {
            player_id: p.clone(),
            minute_off: 70,
        });

        assert_eq!(m.minutes[0].minute_off, Some(20));
        assert_eq!(m.minutes[1].minute_off, Some(70));
    }

    #[test]
    fn test_squad_and_lineup_rows_ordered_by_player() {
        let mut m = fresh();
        let entry = |id: &str| SquadEntry {
            match_id: MatchId::from("m1"),
            player_id: PlayerId::from(id),
            status: crate::types::SquadStatus::Called,
        };
        let slot = |id: &str| LineupPosition {
            match_id: MatchId::from("m1"),
            player_id: PlayerId::from(id),
            position_code: "CM".to_string(),
            x: None,
            y: None,
        };
        m.apply(&Write::ReplaceSquad(vec![entry("zed"), entry("amy"), entry("max")]));
        m.apply(&Write::ReplaceLineup(vec![slot("max"), slot("amy")]));

        let squad: Vec<&str> = m.squad.iter().map(|e| e.player_id.as_str()).collect();
        let lineup: Vec<&str> = m.lineup.iter().map(|p| p.player_id.as_str()).collect();
        assert_eq!(squad, vec!["amy", "max", "zed"]);
        assert_eq!(lineup, vec!["amy", "max"]);
    }

    #[test]
    fn test_staged_finish_bumps_version_only_when_written() {
        let untouched = Staged::new(fresh());
        let (changes, state) = untouched.finish();
        assert!(changes.writes.is_empty());
        assert_eq!(state.version, 0);

        let mut staged = Staged::new(fresh());
        staged.push(Write::IncrementScore(Side::Away));
        assert_eq!(staged.state().score_away, 1);
        let (changes, state) = staged.finish();
        assert_eq!(changes.expected_version, 0);
        assert_eq!(state.version, 1);
    }
}

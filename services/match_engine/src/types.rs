use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(MatchId);
string_id!(PlayerId);
string_id!(TeamId);

/// Returned by `FromStr` on the text-backed enums below.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown value '{0}'")]
pub struct UnknownVariant(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Goal,
    Assist,
    YellowCard,
    RedCard,
    SubOn,
    SubOff,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Goal => "GOAL",
            EventType::Assist => "ASSIST",
            EventType::YellowCard => "YELLOW_CARD",
            EventType::RedCard => "RED_CARD",
            EventType::SubOn => "SUB_ON",
            EventType::SubOff => "SUB_OFF",
        }
    }

    pub fn is_substitution(&self) -> bool {
        matches!(self, EventType::SubOn | EventType::SubOff)
    }
}

impl FromStr for EventType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GOAL" => Ok(EventType::Goal),
            "ASSIST" => Ok(EventType::Assist),
            "YELLOW_CARD" => Ok(EventType::YellowCard),
            "RED_CARD" => Ok(EventType::RedCard),
            "SUB_ON" => Ok(EventType::SubOn),
            "SUB_OFF" => Ok(EventType::SubOff),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Squad membership state of one player in one match.
///
/// `Called` is the entry state after a squad call-up. The only way into
/// `Starting` is through a lineup assignment, which first resets a player
/// to `Bench`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SquadStatus {
    Called,
    Bench,
    Starting,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot move from {} to {}", .from.as_str(), .to.as_str())]
pub struct IllegalTransition {
    pub from: SquadStatus,
    pub to: SquadStatus,
}

impl SquadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SquadStatus::Called => "CALLED",
            SquadStatus::Bench => "BENCH",
            SquadStatus::Starting => "STARTING",
        }
    }

    /// Every squad member drops to the bench when a lineup is replaced.
    pub fn reset_for_lineup(self) -> SquadStatus {
        SquadStatus::Bench
    }

    pub fn assign_position(self) -> Result<SquadStatus, IllegalTransition> {
        match self {
            SquadStatus::Bench | SquadStatus::Starting => Ok(SquadStatus::Starting),
            SquadStatus::Called => Err(IllegalTransition {
                from: self,
                to: SquadStatus::Starting,
            }),
        }
    }
}

impl FromStr for SquadStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CALLED" => Ok(SquadStatus::Called),
            "BENCH" => Ok(SquadStatus::Bench),
            "STARTING" => Ok(SquadStatus::Starting),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormationType {
    ElevenVEleven,
    NineVNine,
    SevenVSeven,
}

impl FormationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormationType::ElevenVEleven => "ELEVEN_V_ELEVEN",
            FormationType::NineVNine => "NINE_V_NINE",
            FormationType::SevenVSeven => "SEVEN_V_SEVEN",
        }
    }

    pub fn required_slots(&self) -> usize {
        match self {
            FormationType::ElevenVEleven => 11,
            FormationType::NineVNine => 9,
            FormationType::SevenVSeven => 7,
        }
    }
}

impl FromStr for FormationType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ELEVEN_V_ELEVEN" => Ok(FormationType::ElevenVEleven),
            "NINE_V_NINE" => Ok(FormationType::NineVNine),
            "SEVEN_V_SEVEN" => Ok(FormationType::SevenVSeven),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEvent {
    pub match_id: MatchId,
    pub sequence: u64,
    pub minute: u32,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub player_id: PlayerId,
    pub related_player_id: Option<PlayerId>,
    pub team_id: TeamId,
    pub recorded_at: DateTime<Utc>,
}

/// Raw event input as it arrives from a client. Every field is optional so
/// that a missing one produces a validation error naming it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub minute: Option<i64>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub player_id: Option<String>,
    pub related_player_id: Option<String>,
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SquadEntry {
    pub match_id: MatchId,
    pub player_id: PlayerId,
    pub status: SquadStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineupPosition {
    pub match_id: MatchId,
    pub player_id: PlayerId,
    pub position_code: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionInput {
    #[serde(default)]
    pub player_id: String,
    #[serde(default)]
    pub position_code: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineupInput {
    pub formation_name: String,
    pub formation_type: FormationType,
    #[serde(default)]
    pub positions: Vec<PositionInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormationInput {
    pub formation_name: String,
    pub formation_type: FormationType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Formation {
    pub match_id: MatchId,
    pub formation_name: String,
    pub formation_type: FormationType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMinutes {
    pub match_id: MatchId,
    pub player_id: PlayerId,
    pub minute_on: u32,
    pub minute_off: Option<u32>,
}

impl PlayerMinutes {
    pub fn is_open(&self) -> bool {
        self.minute_off.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMatch {
    pub id: MatchId,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
}

/// Aggregate root for one match and everything that hangs off it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub score_home: u32,
    pub score_away: u32,
    pub formation_type: Option<FormationType>,
    pub version: i64,
    pub events: Vec<MatchEvent>,
    pub squad: Vec<SquadEntry>,
    pub lineup: Vec<LineupPosition>,
    pub formations: Vec<Formation>,
    pub minutes: Vec<PlayerMinutes>,
}

impl Match {
    pub fn new(new_match: NewMatch) -> Self {
        Self {
            id: new_match.id,
            home_team_id: new_match.home_team_id,
            away_team_id: new_match.away_team_id,
            score_home: 0,
            score_away: 0,
            formation_type: None,
            version: 0,
            events: Vec::new(),
            squad: Vec::new(),
            lineup: Vec::new(),
            formations: Vec::new(),
            minutes: Vec::new(),
        }
    }

    pub fn squad_entry(&self, player_id: &PlayerId) -> Option<&SquadEntry> {
        self.squad.iter().find(|entry| &entry.player_id == player_id)
    }

    pub fn open_interval(&self, player_id: &PlayerId) -> Option<&PlayerMinutes> {
        self.minutes
            .iter()
            .find(|interval| &interval.player_id == player_id && interval.is_open())
    }

    /// True once any interval, open or closed, exists for the player.
    pub fn has_minutes(&self, player_id: &PlayerId) -> bool {
        self.minutes.iter().any(|interval| &interval.player_id == player_id)
    }

    pub fn current_formation(&self) -> Option<&Formation> {
        self.formations.last()
    }

    pub fn next_sequence(&self) -> u64 {
        self.events.iter().map(|e| e.sequence).max().unwrap_or(0) + 1
    }
}

/// Client-facing view of a match with the derived read-model flags.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    #[serde(flatten)]
    pub state: Match,
    pub lineup_complete: bool,
}

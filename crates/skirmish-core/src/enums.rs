//! Enumeration types used throughout the match.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Side a participant plays for.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Blue,
    Red,
    /// Joined but not yet on a side (spectators, explicit directors).
    #[default]
    Unassigned,
}

impl Team {
    /// The two playable sides, in rotation order.
    pub const PLAYABLE: [Team; 2] = [Team::Blue, Team::Red];

    pub fn is_playable(self) -> bool {
        !matches!(self, Team::Unassigned)
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Team::Blue => "blue",
            Team::Red => "red",
            Team::Unassigned => "unassigned",
        };
        f.write_str(s)
    }
}

/// Top-level match phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Sector, zones and deployment are being set up.
    #[default]
    Preparation,
    /// Turns are being played.
    Combat,
    /// Match finished; no further transitions.
    Ended,
}

/// Sub-state within a phase, controlling which actions are legal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subphase {
    /// Director draws the operating sector.
    #[default]
    SectorDefinition,
    /// Director draws one deployment zone per team.
    ZoneDefinition,
    /// Participants place units inside their zone.
    Deployment,
    /// Planning: order intents are collected.
    Movement,
    /// Validated orders are being executed.
    Execution,
    /// Execution log is on display before the turn advances.
    Review,
}

impl Subphase {
    /// The phase this subphase belongs to.
    pub fn phase(self) -> Phase {
        match self {
            Subphase::SectorDefinition | Subphase::ZoneDefinition | Subphase::Deployment => {
                Phase::Preparation
            }
            Subphase::Movement | Subphase::Execution | Subphase::Review => Phase::Combat,
        }
    }

    /// Position in the phase progression, used to refuse backwards remote updates.
    pub fn ordinal(self) -> u8 {
        match self {
            Subphase::SectorDefinition => 0,
            Subphase::ZoneDefinition => 1,
            Subphase::Deployment => 2,
            Subphase::Movement => 3,
            Subphase::Execution => 4,
            Subphase::Review => 5,
        }
    }
}

/// What a unit is told to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Move,
    Attack,
    Defend,
    Wait,
    Recon,
}

/// Order lifecycle.
///
/// `Pending` → `Validated` | `Rejected`; `Validated` → `Executing` →
/// `Completed` | `Failed`. A rejected order can be amended back to `Pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    #[default]
    Pending,
    Validated,
    Rejected,
    Executing,
    Completed,
    Failed,
}

impl OrderState {
    /// Orders in these states are archived at the end of review.
    pub fn is_finished(self) -> bool {
        matches!(self, OrderState::Completed | OrderState::Failed)
    }
}

/// Connection state of the sync channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    /// Waiting for a scheduled retry.
    Reconnecting,
    /// Retries exhausted; only a manual reconnect can recover.
    Failed,
}

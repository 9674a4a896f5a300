use thiserror::Error;

use skirmish_core::enums::{Phase, Subphase, Team};

#[derive(Debug, Error, PartialEq)]
pub enum TurnError {
    #[error("only the director may {action}")]
    NotDirector { action: &'static str },

    #[error("wrong subphase: expected {expected:?}, currently {actual:?}")]
    WrongSubphase { expected: Subphase, actual: Subphase },

    #[error("wrong phase: expected {expected:?}, currently {actual:?}")]
    WrongPhase { expected: Phase, actual: Phase },

    #[error("unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("team {0} cannot hold a zone")]
    NotPlayable(Team),

    #[error("invalid area: {0}")]
    InvalidArea(&'static str),

    #[error("not all participants are ready ({waiting} waiting)")]
    NotAllReady { waiting: usize },

    #[error("team {0} has no participants")]
    MissingTeam(Team),

    #[error("no participant is eligible to hold a turn")]
    NoEligibleParticipant,

    #[error("{participant} is not the active participant")]
    NotActive { participant: String },

    #[error("turn mismatch: local turn {local}, claimed {claimed}")]
    TurnMismatch { local: u32, claimed: u32 },

    #[error("the director never holds a turn")]
    DirectorActive,

    #[error("match has ended")]
    MatchEnded,
}

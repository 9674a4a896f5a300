use thiserror::Error;

use skirmish_core::enums::{OrderState, Subphase, Team};
use skirmish_core::order::OrderId;
use skirmish_turns::TurnError;

#[derive(Debug, Error, PartialEq)]
pub enum OrderError {
    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error("order {id} is {state:?} and can no longer change")]
    NotEditable { id: OrderId, state: OrderState },

    #[error("order belongs to team {order}, queue is {queue}")]
    WrongTeam { queue: Team, order: Team },
}

#[derive(Debug, Error, PartialEq)]
pub enum OrchestratorError {
    #[error("orders can only be changed during movement (currently {0:?})")]
    NotPlanning(Subphase),

    #[error("team {0} has no order queue")]
    UnknownTeam(Team),

    #[error("it is not this client's turn")]
    NotYourTurn,

    #[error("{failed} order(s) failed validation")]
    ValidationFailed { failed: usize },

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Turn(#[from] TurnError),
}

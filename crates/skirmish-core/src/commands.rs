//! Player commands sent from the UI to the client session.
//!
//! Commands are applied locally first and broadcast afterwards.

use serde::{Deserialize, Serialize};

use crate::enums::*;
use crate::order::{OrderId, OrderIntent};
use crate::types::{LatLng, UnitElement, UnitId, ZoneStyle};

/// All user-initiated actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerCommand {
    // --- Preparation (director) ---
    /// Confirm the drawn operating sector.
    ConfirmSector { coordinates: Vec<LatLng> },
    /// Confirm a team's deployment zone.
    ConfirmZone {
        team: Team,
        coordinates: Vec<LatLng>,
        style: Option<ZoneStyle>,
    },
    /// Send everyone back to deployment, clearing readiness.
    ReenterDeployment,
    /// Advance from deployment to combat.
    StartCombat,
    /// Finish the match.
    EndMatch {
        winner: Option<Team>,
        reason: String,
    },

    // --- Deployment ---
    /// Place a unit on the map.
    CreateElement { element: UnitElement },
    /// Drag a unit to a new position.
    MoveElement { unit_id: UnitId, position: LatLng },
    /// Remove a unit.
    DeleteElement { unit_id: UnitId },
    /// Mark the local participant deployment-ready.
    MarkDeploymentReady,

    // --- Combat ---
    /// Queue an order during planning.
    IssueOrder { intent: OrderIntent },
    /// Withdraw a queued order.
    WithdrawOrder { team: Team, order_id: OrderId },
    /// Replace a rejected order with a corrected intent.
    AmendOrder {
        team: Team,
        order_id: OrderId,
        intent: OrderIntent,
    },
    /// Validate all queues and, if clean, execute them.
    ConfirmOrders,
    /// Dismiss the execution log and advance the turn.
    FinishReview,
    /// End the local participant's turn early.
    EndTurn,

    // --- Session ---
    /// Ask the relay for a full snapshot.
    RequestState,
    /// Leave the match and stop the session.
    Leave,
}

impl PlayerCommand {
    /// Short name for logs and error reports.
    pub fn name(&self) -> &'static str {
        match self {
            PlayerCommand::ConfirmSector { .. } => "confirm_sector",
            PlayerCommand::ConfirmZone { .. } => "confirm_zone",
            PlayerCommand::ReenterDeployment => "reenter_deployment",
            PlayerCommand::StartCombat => "start_combat",
            PlayerCommand::EndMatch { .. } => "end_match",
            PlayerCommand::CreateElement { .. } => "create_element",
            PlayerCommand::MoveElement { .. } => "move_element",
            PlayerCommand::DeleteElement { .. } => "delete_element",
            PlayerCommand::MarkDeploymentReady => "mark_deployment_ready",
            PlayerCommand::IssueOrder { .. } => "issue_order",
            PlayerCommand::WithdrawOrder { .. } => "withdraw_order",
            PlayerCommand::AmendOrder { .. } => "amend_order",
            PlayerCommand::ConfirmOrders => "confirm_orders",
            PlayerCommand::FinishReview => "finish_review",
            PlayerCommand::EndTurn => "end_turn",
            PlayerCommand::RequestState => "request_state",
            PlayerCommand::Leave => "leave",
        }
    }
}

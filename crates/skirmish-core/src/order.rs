//! Orders given to units during planning.

use serde::{Deserialize, Serialize};

use crate::enums::{OrderKind, OrderState, Team};
use crate::types::{Bounds, LatLng, UnitId};

/// Queue-local order sequence number.
pub type OrderId = u64;

/// Kind-dependent order target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderTarget {
    /// Destination of a `move`.
    Destination { point: LatLng },
    /// Objective of an `attack`: another unit, or a point on the map.
    Unit { unit_id: UnitId },
    Point { point: LatLng },
    /// Area swept by a `recon`.
    Area { bounds: Bounds },
    /// `defend` and `wait` act in place.
    None,
}

/// What the UI submits when a player issues an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderIntent {
    pub unit_id: UnitId,
    pub team: Team,
    pub kind: OrderKind,
    pub target: OrderTarget,
    #[serde(default)]
    pub priority: i32,
    /// Requested duration. Mandatory (and positive) for `wait`.
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

/// An order held in a team queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub unit_id: UnitId,
    pub team: Team,
    pub kind: OrderKind,
    /// Unit position when the order was issued.
    pub origin: Option<LatLng>,
    pub target: OrderTarget,
    pub priority: i32,
    pub state: OrderState,
    pub estimated_duration_secs: f64,
    /// Human-readable reasons accumulated by validation or execution.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl Order {
    /// Build a pending order from an intent.
    pub fn from_intent(id: OrderId, intent: OrderIntent, origin: Option<LatLng>) -> Self {
        Self {
            id,
            unit_id: intent.unit_id,
            team: intent.team,
            kind: intent.kind,
            origin,
            target: intent.target,
            priority: intent.priority,
            state: OrderState::Pending,
            estimated_duration_secs: intent.duration_secs.unwrap_or(0.0),
            errors: Vec::new(),
        }
    }
}

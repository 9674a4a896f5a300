//! Per-order validation rules.

use skirmish_core::enums::OrderKind;
use skirmish_core::order::{Order, OrderTarget};
use skirmish_core::types::LatLng;

use crate::battlefield::Battlefield;

/// Result of validating one order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Verdict {
    pub errors: Vec<String>,
    /// Unit position at validation time.
    pub origin: Option<LatLng>,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check one order against the battlefield. Never mutates the order.
pub async fn validate(order: &Order, field: &dyn Battlefield) -> Verdict {
    let mut verdict = Verdict::default();
    let errors = &mut verdict.errors;

    match (order.kind, &order.target) {
        (OrderKind::Move, OrderTarget::Destination { point }) => {
            match field.unit_position(&order.unit_id).await {
                Some(from) => {
                    verdict.origin = Some(from);
                    if !field.is_reachable(&from, point).await {
                        errors.push("destination is not reachable".to_string());
                    }
                }
                None => errors.push(format!("unit {} has no known position", order.unit_id)),
            }
        }
        (OrderKind::Move, _) => errors.push("move needs a destination".to_string()),

        (OrderKind::Attack, target @ (OrderTarget::Unit { .. } | OrderTarget::Point { .. })) => {
            verdict.origin = field.unit_position(&order.unit_id).await;
            if field.resolve_target(target).await.is_none() {
                errors.push("attack objective cannot be resolved".to_string());
            }
        }
        (OrderKind::Attack, _) => errors.push("attack needs a unit or point objective".to_string()),

        (OrderKind::Defend, _) => {
            verdict.origin = field.unit_position(&order.unit_id).await;
            if verdict.origin.is_none() {
                errors.push(format!("unit {} has no known position", order.unit_id));
            }
        }

        (OrderKind::Recon, OrderTarget::Area { bounds }) => {
            verdict.origin = field.unit_position(&order.unit_id).await;
            if verdict.origin.is_none() {
                errors.push(format!("unit {} has no known position", order.unit_id));
            }
            if bounds.is_degenerate() {
                errors.push("recon area has no extent".to_string());
            }
        }
        (OrderKind::Recon, _) => errors.push("recon needs an area".to_string()),

        (OrderKind::Wait, _) => {
            let secs = order.estimated_duration_secs;
            if secs.is_nan() || secs <= 0.0 {
                errors.push("wait needs a positive duration".to_string());
            }
        }
    }
    verdict
}

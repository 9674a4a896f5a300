//! Per-team order queue.
//!
//! Orders keep insertion order. Validation runs every pending order
//! concurrently; execution walks validated orders one at a time in
//! ascending priority, ties broken by insertion.

use std::collections::BTreeMap;

use futures::future::join_all;
use tracing::{debug, info, warn};

use skirmish_core::enums::{OrderKind, OrderState, Team};
use skirmish_core::order::{Order, OrderId, OrderIntent};
use skirmish_core::types::{LatLng, UnitId};

use crate::battlefield::Battlefield;
use crate::error::OrderError;
use crate::validate::validate;

/// Outcome of [`OrderQueue::validate_all`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationReport {
    /// No order in the queue is rejected.
    pub success: bool,
    pub per_order_errors: BTreeMap<OrderId, Vec<String>>,
}

impl ValidationReport {
    pub fn failed(&self) -> usize {
        self.per_order_errors.len()
    }
}

/// Outcome of executing one order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub order_id: OrderId,
    pub unit_id: UnitId,
    pub kind: OrderKind,
    pub success: bool,
    pub narrative: String,
    pub moved_to: Option<LatLng>,
}

#[derive(Debug, Clone)]
pub struct OrderQueue {
    team: Team,
    orders: Vec<Order>,
    next_id: OrderId,
}

impl OrderQueue {
    pub fn new(team: Team) -> Self {
        Self {
            team,
            orders: Vec::new(),
            next_id: 1,
        }
    }

    pub fn team(&self) -> Team {
        self.team
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    pub fn count_in(&self, state: OrderState) -> usize {
        self.orders.iter().filter(|o| o.state == state).count()
    }

    fn position(&self, id: OrderId) -> Result<usize, OrderError> {
        self.orders
            .iter()
            .position(|o| o.id == id)
            .ok_or(OrderError::NotFound(id))
    }

    fn check_team(&self, intent: &OrderIntent) -> Result<(), OrderError> {
        if intent.team != self.team {
            return Err(OrderError::WrongTeam {
                queue: self.team,
                order: intent.team,
            });
        }
        Ok(())
    }

    /// Append as `pending`. No validation happens here.
    pub fn add(&mut self, intent: OrderIntent) -> Result<OrderId, OrderError> {
        self.check_team(&intent)?;
        let id = self.next_id;
        self.next_id += 1;
        debug!(team = %self.team, order = id, unit = %intent.unit_id, kind = ?intent.kind, "order queued");
        self.orders.push(Order::from_intent(id, intent, None));
        Ok(id)
    }

    /// Remove an order that has not started executing.
    pub fn withdraw(&mut self, id: OrderId) -> Result<Order, OrderError> {
        let pos = self.position(id)?;
        let state = self.orders[pos].state;
        if state == OrderState::Executing || state.is_finished() {
            return Err(OrderError::NotEditable { id, state });
        }
        Ok(self.orders.remove(pos))
    }

    /// Replace an order's content in place. The order goes back to `pending`
    /// and its errors are cleared so it can be validated again.
    pub fn amend(&mut self, id: OrderId, intent: OrderIntent) -> Result<&Order, OrderError> {
        self.check_team(&intent)?;
        let pos = self.position(id)?;
        let state = self.orders[pos].state;
        if state == OrderState::Executing || state.is_finished() {
            return Err(OrderError::NotEditable { id, state });
        }
        self.orders[pos] = Order::from_intent(id, intent, None);
        Ok(&self.orders[pos])
    }

    /// Validate every pending order concurrently.
    ///
    /// A rejection never blocks its siblings. Orders rejected earlier and not
    /// amended since still count against `success`.
    pub async fn validate_all(&mut self, field: &dyn Battlefield) -> ValidationReport {
        let checks = self
            .orders
            .iter()
            .filter(|o| o.state == OrderState::Pending)
            .map(|order| async move {
                let verdict = validate(order, field).await;
                let mut probe = order.clone();
                probe.origin = verdict.origin.or(order.origin);
                let duration = if verdict.is_valid() {
                    field.estimate_duration(&probe).await
                } else {
                    order.estimated_duration_secs
                };
                (order.id, verdict, duration)
            });
        let verdicts = join_all(checks).await;

        for (id, verdict, duration) in verdicts {
            let Some(order) = self.orders.iter_mut().find(|o| o.id == id) else {
                continue;
            };
            order.origin = verdict.origin.or(order.origin);
            if verdict.is_valid() {
                order.state = OrderState::Validated;
                order.estimated_duration_secs = duration;
            } else {
                order.state = OrderState::Rejected;
                order.errors = verdict.errors;
            }
        }

        let per_order_errors: BTreeMap<OrderId, Vec<String>> = self
            .orders
            .iter()
            .filter(|o| o.state == OrderState::Rejected)
            .map(|o| (o.id, o.errors.clone()))
            .collect();
        if !per_order_errors.is_empty() {
            warn!(team = %self.team, rejected = per_order_errors.len(), "orders rejected");
        }
        ValidationReport {
            success: per_order_errors.is_empty(),
            per_order_errors,
        }
    }

    /// Execute validated orders one after another.
    ///
    /// Failures are recorded on the order and never stop the rest.
    pub async fn execute_sequentially(&mut self, field: &dyn Battlefield) -> Vec<ExecutionResult> {
        let mut schedule: Vec<usize> = (0..self.orders.len())
            .filter(|&i| self.orders[i].state == OrderState::Validated)
            .collect();
        // Stable sort keeps insertion order among equal priorities.
        schedule.sort_by_key(|&i| self.orders[i].priority);

        let mut results = Vec::with_capacity(schedule.len());
        for i in schedule {
            self.orders[i].state = OrderState::Executing;
            let order = self.orders[i].clone();
            let outcome = field.execute(&order).await;

            let result = match outcome {
                Ok(effect) => {
                    self.orders[i].state = OrderState::Completed;
                    ExecutionResult {
                        order_id: order.id,
                        unit_id: order.unit_id,
                        kind: order.kind,
                        success: true,
                        narrative: effect.narrative,
                        moved_to: effect.moved_to,
                    }
                }
                Err(reason) => {
                    warn!(team = %self.team, order = order.id, reason = %reason, "order failed");
                    self.orders[i].state = OrderState::Failed;
                    self.orders[i].errors.push(reason.clone());
                    ExecutionResult {
                        order_id: order.id,
                        unit_id: order.unit_id,
                        kind: order.kind,
                        success: false,
                        narrative: reason,
                        moved_to: None,
                    }
                }
            };
            results.push(result);
        }
        info!(team = %self.team, executed = results.len(), "queue executed");
        results
    }

    /// Drop completed and failed orders. Pending ones stay for the next cycle.
    pub fn clear_completed(&mut self) -> usize {
        let before = self.orders.len();
        self.orders.retain(|o| !o.state.is_finished());
        before - self.orders.len()
    }

    /// Drop everything (orders were settled on another client).
    pub fn clear(&mut self) {
        self.orders.clear();
    }
}

//! Order cycle of a combat turn: planning → execution → review.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use skirmish_core::enums::{Phase, Subphase, Team};
use skirmish_core::events::Event;
use skirmish_core::order::{OrderId, OrderIntent};
use skirmish_sync::IntentSender;
use skirmish_turns::{PhaseTurnStateMachine, TurnAdvance, TurnError};

use crate::battlefield::Battlefield;
use crate::error::OrchestratorError;
use crate::queue::{ExecutionResult, OrderQueue, ValidationReport};

/// One executed order, as shown during review.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionLogEntry {
    pub turn_number: u32,
    pub team: Team,
    pub result: ExecutionResult,
}

pub struct OrderOrchestrator {
    machine: PhaseTurnStateMachine,
    queues: BTreeMap<Team, OrderQueue>,
    field: Arc<dyn Battlefield>,
    intents: IntentSender,
    log: Vec<ExecutionLogEntry>,
}

impl OrderOrchestrator {
    pub fn new(machine: PhaseTurnStateMachine, field: Arc<dyn Battlefield>, intents: IntentSender) -> Self {
        let queues = Team::PLAYABLE
            .iter()
            .map(|&team| (team, OrderQueue::new(team)))
            .collect();
        Self {
            machine,
            queues,
            field,
            intents,
            log: Vec::new(),
        }
    }

    pub fn machine(&self) -> &PhaseTurnStateMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut PhaseTurnStateMachine {
        &mut self.machine
    }

    pub fn field(&self) -> &Arc<dyn Battlefield> {
        &self.field
    }

    pub fn queue(&self, team: Team) -> Option<&OrderQueue> {
        self.queues.get(&team)
    }

    /// Log of the last execution, kept until the next one starts.
    pub fn execution_log(&self) -> &[ExecutionLogEntry] {
        &self.log
    }

    fn require_planning(&self) -> Result<(), OrchestratorError> {
        let state = self.machine.state();
        if state.phase != Phase::Combat || state.subphase != Subphase::Movement {
            return Err(OrchestratorError::NotPlanning(state.subphase));
        }
        Ok(())
    }

    fn queue_mut(&mut self, team: Team) -> Result<&mut OrderQueue, OrchestratorError> {
        self.queues
            .get_mut(&team)
            .ok_or(OrchestratorError::UnknownTeam(team))
    }

    // --- Planning ---

    /// Queue a locally issued order and share it with the other clients.
    pub fn submit(&mut self, intent: OrderIntent) -> Result<OrderId, OrchestratorError> {
        self.require_planning()?;
        let id = self.queue_mut(intent.team)?.add(intent.clone())?;
        info!(team = %intent.team, order = id, unit = %intent.unit_id, "order submitted");
        self.intents.publish(Event::OrderSubmitted { order: intent });
        Ok(id)
    }

    /// Mirror an order another client submitted.
    pub fn apply_remote_order(&mut self, intent: OrderIntent) -> Result<OrderId, OrchestratorError> {
        self.require_planning()?;
        let id = self.queue_mut(intent.team)?.add(intent)?;
        debug!(order = id, "remote order mirrored");
        Ok(id)
    }

    pub fn withdraw(&mut self, team: Team, id: OrderId) -> Result<(), OrchestratorError> {
        self.require_planning()?;
        self.queue_mut(team)?.withdraw(id)?;
        Ok(())
    }

    pub fn amend(&mut self, team: Team, id: OrderId, intent: OrderIntent) -> Result<(), OrchestratorError> {
        self.require_planning()?;
        self.queue_mut(team)?.amend(id, intent)?;
        Ok(())
    }

    // --- Confirm ---

    /// Validate every queue. Any rejection keeps the turn in planning.
    pub async fn confirm(&mut self) -> Result<BTreeMap<Team, ValidationReport>, OrchestratorError> {
        self.require_planning()?;
        if !self.machine.is_local_turn() && !self.machine.is_local_director() {
            return Err(OrchestratorError::NotYourTurn);
        }

        let field = Arc::clone(&self.field);
        let checks = self.queues.iter_mut().map(|(team, queue)| {
            let field = &*field;
            async move { (*team, queue.validate_all(field).await) }
        });
        let reports: BTreeMap<Team, ValidationReport> = join_all(checks).await.into_iter().collect();

        let failed: usize = reports.values().map(ValidationReport::failed).sum();
        if failed > 0 {
            warn!(failed, "orders refused, staying in planning");
            return Err(OrchestratorError::ValidationFailed { failed });
        }
        self.machine.begin_execution()?;
        Ok(reports)
    }

    // --- Execution ---

    /// Run every team's queue concurrently; each queue runs its own orders in sequence.
    pub async fn execute(&mut self) -> Result<&[ExecutionLogEntry], OrchestratorError> {
        let state = self.machine.state();
        if state.subphase != Subphase::Execution {
            return Err(TurnError::WrongSubphase {
                expected: Subphase::Execution,
                actual: state.subphase,
            }
            .into());
        }

        let field = Arc::clone(&self.field);
        let runs = self.queues.iter_mut().map(|(team, queue)| {
            let field = &*field;
            async move { (*team, queue.execute_sequentially(field).await) }
        });
        let outcomes = join_all(runs).await;

        self.log.clear();
        for (team, results) in outcomes {
            for result in results {
                if let Some(position) = result.moved_to {
                    self.intents.publish(Event::ElementMoved {
                        unit_id: result.unit_id.clone(),
                        position,
                        creator_id: self.machine.session().participant_id.clone(),
                    });
                }
                self.log.push(ExecutionLogEntry {
                    turn_number: state.turn_number,
                    team,
                    result,
                });
            }
        }
        info!(turn = state.turn_number, entries = self.log.len(), "execution finished");

        self.machine.begin_review()?;
        Ok(&self.log)
    }

    // --- Review ---

    /// Review done: settled orders are dropped and the turn moves on.
    pub fn finish_review(&mut self) -> Result<Option<TurnAdvance>, OrchestratorError> {
        if self.machine.state().subphase != Subphase::Review {
            return Err(TurnError::WrongSubphase {
                expected: Subphase::Review,
                actual: self.machine.state().subphase,
            }
            .into());
        }
        let cleared: usize = self.queues.values_mut().map(OrderQueue::clear_completed).sum();
        debug!(cleared, "settled orders cleared");
        Ok(self.machine.complete_review()?)
    }

    /// Another client executed this turn's orders; drop our copies.
    pub fn discard_settled(&mut self) {
        for queue in self.queues.values_mut() {
            queue.clear();
        }
        self.log.clear();
    }
}

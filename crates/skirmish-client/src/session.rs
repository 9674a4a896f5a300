//! Client session loop.
//!
//! One task per client owns the sync channel, the phase/turn machine (inside
//! the order orchestrator), the local board and the battlefield. It waits on
//! three queues: transport traffic and outbound intents from the channel,
//! clock ticks, and commands from the UI. After each step the latest
//! [`ClientView`] is republished on a watch channel.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use skirmish_core::commands::PlayerCommand;
use skirmish_core::enums::{ConnectionState, Subphase, Team};
use skirmish_core::events::{Event, SyncEnvelope};
use skirmish_core::order::Order;
use skirmish_core::participant::Participant;
use skirmish_core::state::{MatchBoard, MatchPhaseState, MatchSnapshot, Viewer};
use skirmish_core::types::{LatLng, ParticipantId, Sector, UnitElement, UnitId, Zone};
use skirmish_orders::{ExecutionLogEntry, OrchestratorError, OrderOrchestrator, TerrainBattlefield};
use skirmish_sync::{ChannelInput, ChannelSignal, IntentSender, LocalRelay, SyncChannel, SyncError};
use skirmish_terrain::MapGrid;
use skirmish_turns::{ClockTick, PhaseTurnStateMachine, RemoteOutcome, TickOutcome, TurnError};

use crate::config::ClientConfig;

/// Commands sent from the UI to the session loop.
#[derive(Debug)]
pub enum LoopCommand {
    /// A player command to apply locally and broadcast.
    Player(PlayerCommand),
    /// Start connecting again after reconnection was abandoned.
    Reconnect,
    /// Stop the loop without leaving the match.
    Shutdown,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Turn(#[from] TurnError),

    #[error(transparent)]
    Orders(#[from] OrchestratorError),

    #[error("units can only be placed during deployment (now {0:?})")]
    NotDeploying(Subphase),

    #[error("unit {0} is not on the board")]
    UnknownElement(UnitId),

    #[error("unit {0} belongs to another team")]
    NotYourUnit(UnitId),

    #[error("position lies outside the {0} deployment zone")]
    OutsideZone(Team),

    #[error("orders for {0} belong to another player")]
    NotYourTeam(Team),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub winner: Option<Team>,
    pub reason: String,
}

/// Everything the UI renders, rebuilt after every loop step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientView {
    pub connection: ConnectionState,
    /// Attempts made before reconnection was abandoned. Cleared on reconnect.
    pub reconnection_failed: Option<u32>,
    pub phase: MatchPhaseState,
    pub participants: Vec<Participant>,
    pub director_id: Option<ParticipantId>,
    pub active_participant_id: Option<ParticipantId>,
    pub board: MatchBoard,
    pub orders: BTreeMap<Team, Vec<Order>>,
    pub execution_log: Vec<ExecutionLogEntry>,
    /// Last refused command and why.
    pub last_error: Option<String>,
    pub outcome: Option<MatchOutcome>,
}

/// The UI side of a running [`ClientSession`].
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<LoopCommand>,
    view: watch::Receiver<ClientView>,
}

impl SessionHandle {
    /// Queue a player command. Returns false once the session has stopped.
    pub fn send(&self, command: PlayerCommand) -> bool {
        self.commands.send(LoopCommand::Player(command)).is_ok()
    }

    pub fn reconnect(&self) -> bool {
        self.commands.send(LoopCommand::Reconnect).is_ok()
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(LoopCommand::Shutdown);
    }

    /// Latest published view.
    pub fn view(&self) -> ClientView {
        self.view.borrow().clone()
    }

    /// Wait until the view satisfies `predicate`. `None` if the session
    /// stopped first.
    pub async fn wait_for(&mut self, predicate: impl FnMut(&ClientView) -> bool) -> Option<ClientView> {
        self.view
            .wait_for(predicate)
            .await
            .ok()
            .map(|view| ClientView::clone(&view))
    }
}

pub struct ClientSession {
    channel: SyncChannel,
    orders: OrderOrchestrator,
    field: Arc<TerrainBattlefield>,
    board: MatchBoard,
    intents: IntentSender,
    ticks: mpsc::UnboundedReceiver<ClockTick>,
    commands: mpsc::UnboundedReceiver<LoopCommand>,
    view_tx: watch::Sender<ClientView>,
    grid_size: (u32, u32),
    reconnection_failed: Option<u32>,
    last_error: Option<String>,
    outcome: Option<MatchOutcome>,
    leaving: bool,
}

impl ClientSession {
    pub fn new(config: &ClientConfig, channel: SyncChannel) -> (Self, SessionHandle) {
        let intents = channel.intent_sender();
        let (machine, ticks) =
            PhaseTurnStateMachine::new(channel.session().clone(), config.turn_config(), intents.clone());
        let field = Arc::new(TerrainBattlefield::unmapped().with_time_scale(config.orders.execution_time_scale));
        let orders = OrderOrchestrator::new(machine, field.clone(), intents.clone());

        let (command_tx, commands) = mpsc::unbounded_channel();
        let (view_tx, view) = watch::channel(ClientView::default());
        let session = Self {
            channel,
            orders,
            field,
            board: MatchBoard::new(),
            intents,
            ticks,
            commands,
            view_tx,
            grid_size: (config.orders.grid_width, config.orders.grid_height),
            reconnection_failed: None,
            last_error: None,
            outcome: None,
            leaving: false,
        };
        session.publish_view();
        (
            session,
            SessionHandle {
                commands: command_tx,
                view,
            },
        )
    }

    /// Session attached to a room of a [`LocalRelay`].
    pub fn over_relay(config: &ClientConfig, relay: &LocalRelay) -> (Self, SessionHandle) {
        let channel = SyncChannel::over_relay(config.session_context(), relay, config.reconnect_policy());
        Self::new(config, channel)
    }

    pub fn machine(&self) -> &PhaseTurnStateMachine {
        self.orders.machine()
    }

    pub fn orchestrator(&self) -> &OrderOrchestrator {
        &self.orders
    }

    pub fn channel(&self) -> &SyncChannel {
        &self.channel
    }

    pub fn board(&self) -> &MatchBoard {
        &self.board
    }

    pub fn field(&self) -> &TerrainBattlefield {
        &self.field
    }

    /// Run until shutdown or leave. Hands the session back for inspection.
    pub async fn run(mut self) -> Self {
        self.connect().await;
        self.publish_view();

        loop {
            tokio::select! {
                input = self.channel.next_input() => match input {
                    Some(ChannelInput::Transport(event)) => {
                        let signal = self.channel.handle_transport_event(event);
                        self.on_signal(signal);
                    }
                    Some(ChannelInput::Intent(event)) => self.send(event).await,
                    None => break,
                },
                Some(tick) = self.ticks.recv() => self.on_tick(tick),
                command = self.commands.recv() => match command {
                    Some(LoopCommand::Player(command)) => self.apply(command).await,
                    Some(LoopCommand::Reconnect) => self.reconnect().await,
                    Some(LoopCommand::Shutdown) | None => break,
                },
            }
            self.publish_view();
            if self.leaving {
                break;
            }
        }

        let flushed = self.channel.flush_intents().await;
        info!(
            participant = %self.machine().session().participant_id,
            flushed,
            "session stopped"
        );
        self.publish_view();
        self
    }

    // --- Views ---

    fn view(&self) -> ClientView {
        let machine = self.orders.machine();
        ClientView {
            connection: self.channel.state(),
            reconnection_failed: self.reconnection_failed,
            phase: machine.state(),
            participants: machine.participants().to_vec(),
            director_id: machine.effective_director().map(|p| p.id.clone()),
            active_participant_id: machine.active_participant().map(|p| p.id.clone()),
            board: self.board.clone(),
            orders: Team::PLAYABLE
                .iter()
                .filter_map(|&team| Some((team, self.orders.queue(team)?.orders().to_vec())))
                .collect(),
            execution_log: self.orders.execution_log().to_vec(),
            last_error: self.last_error.clone(),
            outcome: self.outcome.clone(),
        }
    }

    fn publish_view(&self) {
        let next = self.view();
        self.view_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn viewer(&self) -> Viewer {
        Viewer {
            team: self.machine().session().team,
            is_director: self.machine().is_local_director(),
        }
    }

    fn local_id(&self) -> ParticipantId {
        self.machine().session().participant_id.clone()
    }

    /// Full state as this client knows it.
    pub fn snapshot(&self) -> MatchSnapshot {
        let machine = self.orders.machine();
        let state = machine.state();
        MatchSnapshot {
            phase: state.phase,
            subphase: state.subphase,
            sector: self.board.sector.clone(),
            zones: self.board.zones.values().cloned().collect(),
            elements: self.board.elements.values().cloned().collect(),
            participants: machine.participants().to_vec(),
            turn_number: state.turn_number,
            active_participant_id: machine.active_participant().map(|p| p.id.clone()),
            timestamp: Utc::now(),
        }
    }

    // --- Connectivity ---

    async fn connect(&mut self) {
        match self.channel.connect().await {
            Ok(signal) => self.on_signal(signal),
            Err(SyncError::ReconnectionFailed { attempts }) => self.reconnection_failed = Some(attempts),
            Err(e) => warn!(error = %e, "initial connection failed, retrying"),
        }
    }

    async fn reconnect(&mut self) {
        self.reconnection_failed = None;
        match self.channel.manual_reconnect().await {
            Ok(signal) => self.on_signal(signal),
            Err(SyncError::ReconnectionFailed { attempts }) => self.reconnection_failed = Some(attempts),
            Err(e) => warn!(error = %e, "manual reconnect failed, retrying"),
        }
    }

    async fn send(&mut self, event: Event) {
        match self.channel.send_intent(event).await {
            Ok(_) | Err(SyncError::NotConnected(_)) => {}
            Err(e) => warn!(error = %e, "intent not delivered"),
        }
    }

    fn on_signal(&mut self, signal: ChannelSignal) {
        match signal {
            ChannelSignal::Connected { resumed } => {
                self.reconnection_failed = None;
                debug!(resumed, "session online");
            }
            ChannelSignal::ReconnectionFailed { attempts } => self.reconnection_failed = Some(attempts),
            ChannelSignal::Remote(envelope) => self.on_remote(envelope),
            ChannelSignal::Disconnected { .. }
            | ChannelSignal::RetryScheduled { .. }
            | ChannelSignal::Dropped { .. } => {}
        }
    }

    // --- Inbound ---

    fn on_remote(&mut self, envelope: SyncEnvelope) {
        match self.orders.machine_mut().apply_remote(&envelope) {
            // The turn moved on elsewhere; whatever we mirrored for it is settled.
            Ok(RemoteOutcome::TurnChanged { .. } | RemoteOutcome::TurnAdvanced(_)) => {
                self.orders.discard_settled();
            }
            Ok(RemoteOutcome::Ignored(why)) => {
                debug!(event = %envelope.kind(), why, "phase machine ignored event");
            }
            Ok(RemoteOutcome::Applied | RemoteOutcome::MatchEnded { .. }) => {}
            Err(e) => warn!(
                event = %envelope.kind(),
                origin = %envelope.origin_participant_id,
                error = %e,
                "remote event refused"
            ),
        }
        self.apply_board_event(&envelope);
    }

    fn apply_board_event(&mut self, envelope: &SyncEnvelope) {
        let viewer = self.viewer();
        match &envelope.event {
            Event::FullState(snapshot) => {
                self.board.merge_snapshot(snapshot, viewer);
                self.field.sync_elements(self.board.elements.values());
                if let Some(sector) = &snapshot.sector {
                    self.lay_grid(sector);
                }
            }
            Event::RequestState { participant_id, .. } | Event::RequestStateRefresh { participant_id, .. } => {
                self.serve_state(participant_id);
            }
            Event::SectorConfirmed {
                coordinates, bounds, ..
            } => {
                let sector = Sector {
                    coordinates: coordinates.clone(),
                    bounds: *bounds,
                };
                self.lay_grid(&sector);
                self.board.sector = Some(sector);
            }
            Event::ZoneConfirmed {
                team,
                coordinates,
                bounds,
                style,
            } => {
                let zone = Zone {
                    team: *team,
                    coordinates: coordinates.clone(),
                    bounds: *bounds,
                    style: style.clone(),
                };
                if !self.board.apply_zone(zone, viewer) {
                    debug!(team = %team, "zone of another team not shown");
                }
            }
            Event::ElementCreated(element) => {
                self.board.upsert_element(element.clone());
                self.field.place(element.clone());
            }
            Event::ElementMoved { unit_id, position, .. } => match self.board.elements.get_mut(unit_id) {
                Some(element) => {
                    element.position = *position;
                    self.field.place(element.clone());
                }
                None => debug!(unit = %unit_id, "move of unknown unit ignored"),
            },
            Event::ElementDeleted { unit_id, .. } => {
                self.board.remove_element(unit_id);
                self.field.remove(unit_id);
            }
            Event::OrderSubmitted { order } => {
                if let Err(e) = self.orders.apply_remote_order(order.clone()) {
                    debug!(unit = %order.unit_id, error = %e, "remote order not mirrored");
                }
            }
            Event::MatchEnded { winner, reason } => {
                self.outcome = Some(MatchOutcome {
                    winner: *winner,
                    reason: reason.clone(),
                });
            }
            Event::JoinMatch { .. }
            | Event::LeaveMatch { .. }
            | Event::PhaseChanged { .. }
            | Event::TurnChanged { .. }
            | Event::DeploymentReady { .. }
            | Event::TurnEnded { .. } => {}
        }
    }

    /// The configured director answers state requests with a full snapshot.
    fn serve_state(&self, requester: &str) {
        let machine = self.machine();
        if !machine.session().is_director || !machine.is_local_director() {
            return;
        }
        info!(requester, "serving match state");
        self.intents.publish(Event::FullState(self.snapshot()));
    }

    fn lay_grid(&self, sector: &Sector) {
        let (width, height) = self.grid_size;
        self.field.set_grid(MapGrid::from_sector(sector, width, height));
    }

    fn on_tick(&mut self, tick: ClockTick) {
        match self.orders.machine_mut().on_tick(tick) {
            TickOutcome::Expired { advance: Some(advance) } => {
                info!(active = %advance.active_participant_id, turn = advance.turn_number, "turn forced on");
                self.orders.discard_settled();
            }
            TickOutcome::Expired { advance: None } => debug!("turn expired, waiting for the director"),
            TickOutcome::Stale | TickOutcome::Idle | TickOutcome::Counting { .. } => {}
        }
    }

    // --- Commands ---

    async fn apply(&mut self, command: PlayerCommand) {
        let name = command.name();
        match self.execute(command).await {
            Ok(()) => self.last_error = None,
            Err(e) => {
                warn!(command = name, error = %e, "command refused");
                self.last_error = Some(format!("{name}: {e}"));
            }
        }
    }

    async fn execute(&mut self, command: PlayerCommand) -> Result<(), SessionError> {
        match command {
            PlayerCommand::ConfirmSector { coordinates } => {
                let sector = self.orders.machine_mut().confirm_sector(coordinates)?;
                self.lay_grid(&sector);
                self.board.sector = Some(sector);
            }
            PlayerCommand::ConfirmZone {
                team,
                coordinates,
                style,
            } => {
                let zone = self.orders.machine_mut().confirm_zone(team, coordinates, style)?;
                self.board.zones.insert(zone.team, zone);
            }
            PlayerCommand::ReenterDeployment => {
                self.orders.machine_mut().reenter_deployment()?;
                self.orders.discard_settled();
            }
            PlayerCommand::StartCombat => {
                self.orders.machine_mut().start_combat()?;
            }
            PlayerCommand::EndMatch { winner, reason } => {
                self.orders.machine_mut().end_match(winner, reason.clone())?;
                self.outcome = Some(MatchOutcome { winner, reason });
            }
            PlayerCommand::CreateElement { element } => self.create_element(element)?,
            PlayerCommand::MoveElement { unit_id, position } => self.move_element(&unit_id, position)?,
            PlayerCommand::DeleteElement { unit_id } => self.delete_element(&unit_id)?,
            PlayerCommand::MarkDeploymentReady => self.orders.machine_mut().mark_deployment_ready()?,
            PlayerCommand::IssueOrder { intent } => {
                self.check_order(intent.team, Some(&intent.unit_id))?;
                self.orders.submit(intent)?;
            }
            PlayerCommand::WithdrawOrder { team, order_id } => {
                self.check_order(team, None)?;
                self.orders.withdraw(team, order_id)?;
            }
            PlayerCommand::AmendOrder {
                team,
                order_id,
                intent,
            } => {
                self.check_order(team, None)?;
                self.check_order(intent.team, Some(&intent.unit_id))?;
                self.orders.amend(team, order_id, intent)?;
            }
            PlayerCommand::ConfirmOrders => {
                self.orders.confirm().await?;
                let log = self.orders.execute().await?;
                for entry in log {
                    if let Some(position) = entry.result.moved_to {
                        if let Some(element) = self.board.elements.get_mut(&entry.result.unit_id) {
                            element.position = position;
                        }
                    }
                }
            }
            PlayerCommand::FinishReview => {
                self.orders.finish_review()?;
            }
            PlayerCommand::EndTurn => {
                self.orders.machine_mut().end_turn(false)?;
                self.orders.discard_settled();
            }
            PlayerCommand::RequestState => {
                let session = self.machine().session();
                self.intents.publish(Event::RequestStateRefresh {
                    match_code: session.match_code.clone(),
                    participant_id: session.participant_id.clone(),
                    team: session.team,
                });
            }
            PlayerCommand::Leave => {
                self.intents.publish(Event::LeaveMatch {
                    participant_id: self.local_id(),
                });
                self.leaving = true;
            }
        }
        Ok(())
    }

    /// Players edit their own team's units inside their zone; the director edits anything.
    fn check_deployment(&self, team: Team, unit_id: &str, position: Option<&LatLng>) -> Result<(), SessionError> {
        let machine = self.machine();
        let subphase = machine.state().subphase;
        if subphase != Subphase::Deployment {
            return Err(SessionError::NotDeploying(subphase));
        }
        if machine.is_local_director() {
            return Ok(());
        }
        if team != machine.session().team {
            return Err(SessionError::NotYourUnit(unit_id.to_string()));
        }
        if let (Some(position), Some(zone)) = (position, self.board.zones.get(&team)) {
            if !zone.contains(position) {
                return Err(SessionError::OutsideZone(team));
            }
        }
        Ok(())
    }

    /// Players order their own team's units only; the director orders anyone.
    fn check_order(&self, team: Team, unit_id: Option<&str>) -> Result<(), SessionError> {
        let machine = self.machine();
        if machine.is_local_director() {
            return Ok(());
        }
        if team != machine.session().team {
            return Err(SessionError::NotYourTeam(team));
        }
        if let Some(element) = unit_id.and_then(|id| self.board.elements.get(id)) {
            if element.team != team {
                return Err(SessionError::NotYourUnit(element.id.clone()));
            }
        }
        Ok(())
    }

    fn element_team(&self, unit_id: &str) -> Result<Team, SessionError> {
        self.board
            .elements
            .get(unit_id)
            .map(|e| e.team)
            .ok_or_else(|| SessionError::UnknownElement(unit_id.to_string()))
    }

    fn create_element(&mut self, mut element: UnitElement) -> Result<(), SessionError> {
        self.check_deployment(element.team, &element.id, Some(&element.position))?;
        element.creator_id = self.local_id();
        self.board.upsert_element(element.clone());
        self.field.place(element.clone());
        info!(unit = %element.id, team = %element.team, "unit placed");
        self.intents.publish(Event::ElementCreated(element));
        Ok(())
    }

    fn move_element(&mut self, unit_id: &str, position: LatLng) -> Result<(), SessionError> {
        let team = self.element_team(unit_id)?;
        self.check_deployment(team, unit_id, Some(&position))?;
        if let Some(element) = self.board.elements.get_mut(unit_id) {
            element.position = position;
            self.field.place(element.clone());
        }
        self.intents.publish(Event::ElementMoved {
            unit_id: unit_id.to_string(),
            position,
            creator_id: self.local_id(),
        });
        Ok(())
    }

    fn delete_element(&mut self, unit_id: &str) -> Result<(), SessionError> {
        let team = self.element_team(unit_id)?;
        self.check_deployment(team, unit_id, None)?;
        self.board.remove_element(unit_id);
        self.field.remove(unit_id);
        self.intents.publish(Event::ElementDeleted {
            unit_id: unit_id.to_string(),
            creator_id: self.local_id(),
        });
        Ok(())
    }
}

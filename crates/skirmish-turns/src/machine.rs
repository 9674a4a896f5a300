//! Phase/turn state machine.
//!
//! `PhaseTurnStateMachine` is the only writer of [`MatchPhaseState`]. It
//! applies local transitions immediately and queues their broadcast on the
//! [`IntentSender`]; remote transitions come in through [`apply_remote`]
//! and are filtered by authority and monotonicity.
//!
//! [`apply_remote`]: PhaseTurnStateMachine::apply_remote

use std::collections::BTreeSet;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use skirmish_core::constants::DEFAULT_TURN_DURATION_SECS;
use skirmish_core::enums::{Phase, Subphase, Team};
use skirmish_core::events::{Event, SyncEnvelope};
use skirmish_core::participant::{effective_director_index, Participant};
use skirmish_core::session::SessionContext;
use skirmish_core::state::{MatchPhaseState, MatchSnapshot};
use skirmish_core::types::{Bounds, LatLng, ParticipantId, Sector, Zone, ZoneStyle};
use skirmish_sync::IntentSender;

use crate::clock::{ClockTick, TurnClock};
use crate::error::TurnError;
use crate::rotation::{first_eligible, next_active};

/// Turn settings shared by every client of a match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnConfig {
    pub turn_duration_secs: u32,
    /// Team whose first participant directs when nobody is explicit director.
    pub default_director_team: Team,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            turn_duration_secs: DEFAULT_TURN_DURATION_SECS,
            default_director_team: Team::Blue,
        }
    }
}

/// A change of active participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnAdvance {
    /// `None` when combat just started.
    pub ended_participant_id: Option<ParticipantId>,
    pub active_participant_id: ParticipantId,
    pub turn_number: u32,
    pub forced: bool,
}

/// Deployment readiness tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub ready: usize,
    pub total: usize,
    pub blue: usize,
    pub red: usize,
}

impl Readiness {
    pub fn all_ready(&self) -> bool {
        self.total > 0 && self.ready == self.total
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick from a cancelled clock.
    Stale,
    /// No turn is running.
    Idle,
    Counting { remaining: u32 },
    /// Time ran out. Only the authority advances the turn.
    Expired { advance: Option<TurnAdvance> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    Applied,
    Ignored(&'static str),
    /// The authority rotated after a remote `finTurno`.
    TurnAdvanced(TurnAdvance),
    /// A remote `cambioTurno` was applied.
    TurnChanged {
        active_participant_id: ParticipantId,
        turn_number: u32,
    },
    MatchEnded { winner: Option<Team> },
}

pub struct PhaseTurnStateMachine {
    session: SessionContext,
    config: TurnConfig,
    state: MatchPhaseState,
    participants: Vec<Participant>,
    sector: Option<Sector>,
    confirmed_zones: BTreeSet<Team>,
    /// Deployment was entered from remote zone confirmations and the
    /// director's own announcement of that entry has not arrived yet.
    deployment_entry_pending: bool,
    clock: TurnClock,
    intents: IntentSender,
}

impl PhaseTurnStateMachine {
    /// New machine in `preparation.sector_definition` with the local
    /// participant on the roster. Clock ticks arrive on the returned receiver
    /// and must be fed back through [`on_tick`](Self::on_tick).
    pub fn new(
        session: SessionContext,
        config: TurnConfig,
        intents: IntentSender,
    ) -> (Self, mpsc::UnboundedReceiver<ClockTick>) {
        let (clock, ticks) = TurnClock::channel();
        let participants = vec![session.as_participant()];
        (
            Self {
                session,
                config,
                state: MatchPhaseState::default(),
                participants,
                sector: None,
                confirmed_zones: BTreeSet::new(),
                deployment_entry_pending: false,
                clock,
                intents,
            },
            ticks,
        )
    }

    // --- Queries ---

    pub fn state(&self) -> MatchPhaseState {
        self.state
    }

    pub fn config(&self) -> TurnConfig {
        self.config
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn sector(&self) -> Option<&Sector> {
        self.sector.as_ref()
    }

    pub fn is_zone_confirmed(&self, team: Team) -> bool {
        self.confirmed_zones.contains(&team)
    }

    pub fn clock_generation(&self) -> u64 {
        self.clock.generation()
    }

    pub fn is_clock_running(&self) -> bool {
        self.clock.is_running()
    }

    fn director_index(&self) -> Option<usize> {
        effective_director_index(&self.participants, self.config.default_director_team)
    }

    pub fn effective_director(&self) -> Option<&Participant> {
        self.director_index().map(|i| &self.participants[i])
    }

    pub fn is_local_director(&self) -> bool {
        self.effective_director()
            .is_some_and(|p| self.session.is(&p.id))
    }

    /// Whether this client decides phase and turn changes.
    ///
    /// The effective director, or the active participant when the roster has
    /// no director at all.
    pub fn is_authority(&self) -> bool {
        match self.director_index() {
            Some(_) => self.is_local_director(),
            None => self.is_local_turn(),
        }
    }

    pub fn active_participant(&self) -> Option<&Participant> {
        if self.state.phase != Phase::Combat || !self.state.has_active_turn() {
            return None;
        }
        self.participants.get(self.state.active_participant_index)
    }

    pub fn is_local_turn(&self) -> bool {
        self.active_participant()
            .is_some_and(|p| self.session.is(&p.id))
    }

    pub fn readiness(&self) -> Readiness {
        let mut tally = Readiness {
            total: self.participants.len(),
            ..Readiness::default()
        };
        for p in &self.participants {
            if p.is_deployment_ready {
                tally.ready += 1;
            }
            match p.team {
                Team::Blue => tally.blue += 1,
                Team::Red => tally.red += 1,
                Team::Unassigned => {}
            }
        }
        tally
    }

    // --- Guards ---

    fn require_director(&self, action: &'static str) -> Result<(), TurnError> {
        if self.is_local_director() {
            Ok(())
        } else {
            Err(TurnError::NotDirector { action })
        }
    }

    fn require_subphase(&self, expected: Subphase) -> Result<(), TurnError> {
        if self.state.phase == Phase::Ended {
            return Err(TurnError::MatchEnded);
        }
        if self.state.subphase != expected {
            return Err(TurnError::WrongSubphase {
                expected,
                actual: self.state.subphase,
            });
        }
        Ok(())
    }

    fn require_combat(&self) -> Result<(), TurnError> {
        match self.state.phase {
            Phase::Combat => Ok(()),
            Phase::Ended => Err(TurnError::MatchEnded),
            actual => Err(TurnError::WrongPhase {
                expected: Phase::Combat,
                actual,
            }),
        }
    }

    // --- Internal mutation ---

    fn broadcast(&self, event: Event) {
        self.intents.publish(event);
    }

    fn announce_phase(&self) {
        self.broadcast(Event::PhaseChanged {
            phase: self.state.phase,
            subphase: self.state.subphase,
            participant_id: self.session.participant_id.clone(),
        });
    }

    fn set_subphase(&mut self, subphase: Subphase) {
        self.state.phase = subphase.phase();
        self.state.subphase = subphase;
    }

    /// Full clock for a new active participant.
    fn reset_clock(&mut self) {
        self.state.clock_remaining_secs = self.config.turn_duration_secs;
        self.clock.restart();
    }

    fn stop_clock(&mut self) {
        self.clock.cancel();
        self.state.clock_remaining_secs = 0;
    }

    fn finish(&mut self) {
        self.state.phase = Phase::Ended;
        self.stop_clock();
    }

    fn clear_turn(&mut self) {
        self.state.turn_number = 0;
        self.state.active_participant_index = 0;
        self.stop_clock();
    }

    fn active_id(&self) -> Option<ParticipantId> {
        self.active_participant().map(|p| p.id.clone())
    }

    // --- Roster ---

    /// Add a participant or refresh an existing entry. Returns true if new.
    pub fn join(&mut self, participant: Participant) -> bool {
        if let Some(existing) = self.participants.iter_mut().find(|p| p.id == participant.id) {
            existing.name = participant.name;
            existing.team = participant.team;
            existing.is_director |= participant.is_director;
            return false;
        }
        info!(participant = %participant.id, team = %participant.team, "participant joined");
        self.participants.push(participant);
        true
    }

    /// Remove a participant, keeping the active index on the same person.
    ///
    /// If the active participant leaves, the next eligible one takes over
    /// and, when this client is the authority, the new turn is broadcast.
    pub fn leave(&mut self, participant_id: &str) -> Result<Option<TurnAdvance>, TurnError> {
        let pos = self
            .participants
            .iter()
            .position(|p| p.id == participant_id)
            .ok_or_else(|| TurnError::UnknownParticipant(participant_id.to_string()))?;
        let in_turn = self.active_participant().is_some();
        let was_active = in_turn && pos == self.state.active_participant_index;
        self.participants.remove(pos);
        info!(participant = participant_id, "participant left");

        if !in_turn {
            return Ok(None);
        }
        if pos < self.state.active_participant_index {
            self.state.active_participant_index -= 1;
        }
        if !was_active && Some(self.state.active_participant_index) != self.director_index() {
            return Ok(None);
        }

        let count = self.participants.len();
        let mut start = self.state.active_participant_index;
        if start >= count {
            start = 0;
            self.state.turn_number += 1;
        }
        let Some(index) = first_eligible(count, start, self.director_index()) else {
            warn!("no eligible participant left, turn cleared");
            self.clear_turn();
            return Ok(None);
        };
        self.state.active_participant_index = index;
        self.state.subphase = Subphase::Movement;
        self.reset_clock();
        let active = self.participants[index].id.clone();
        if self.is_authority() {
            self.broadcast(Event::TurnChanged {
                active_participant_id: active.clone(),
                turn_number: self.state.turn_number,
            });
        }
        Ok(Some(TurnAdvance {
            ended_participant_id: Some(participant_id.to_string()),
            active_participant_id: active,
            turn_number: self.state.turn_number,
            forced: true,
        }))
    }

    /// Replace the roster wholesale (from a snapshot). The local participant
    /// is kept even if the snapshot predates our join.
    pub fn replace_roster(&mut self, mut participants: Vec<Participant>) {
        let active = self.active_id();
        if !participants.iter().any(|p| self.session.is(&p.id)) {
            participants.push(self.session.as_participant());
        }
        self.participants = participants;
        if let Some(active) = active {
            match self.participants.iter().position(|p| p.id == active) {
                Some(index) => self.state.active_participant_index = index,
                None => {
                    let count = self.participants.len();
                    self.state.active_participant_index =
                        first_eligible(count, 0, self.director_index()).unwrap_or(0);
                }
            }
        }
    }

    // --- Preparation ---

    /// Director confirms the playable sector. `sector_definition → zone_definition`.
    pub fn confirm_sector(&mut self, coordinates: Vec<LatLng>) -> Result<Sector, TurnError> {
        self.require_director("confirm the sector")?;
        self.require_subphase(Subphase::SectorDefinition)?;
        let bounds = polygon_bounds(&coordinates)?;

        let sector = Sector {
            coordinates: coordinates.clone(),
            bounds,
        };
        self.sector = Some(sector.clone());
        self.set_subphase(Subphase::ZoneDefinition);
        info!("sector confirmed");

        self.broadcast(Event::SectorConfirmed {
            coordinates,
            bounds,
            participant_id: self.session.participant_id.clone(),
        });
        self.announce_phase();
        Ok(sector)
    }

    /// Director confirms one team's deployment zone. Once both teams have
    /// one, `zone_definition → deployment`.
    pub fn confirm_zone(
        &mut self,
        team: Team,
        coordinates: Vec<LatLng>,
        style: Option<ZoneStyle>,
    ) -> Result<Zone, TurnError> {
        self.require_director("confirm a zone")?;
        self.require_subphase(Subphase::ZoneDefinition)?;
        if !team.is_playable() {
            return Err(TurnError::NotPlayable(team));
        }
        let bounds = polygon_bounds(&coordinates)?;
        if let Some(sector) = &self.sector {
            if !coordinates.iter().all(|p| sector.contains(p)) {
                return Err(TurnError::InvalidArea("zone lies outside the sector"));
            }
        }

        let zone = Zone {
            team,
            coordinates,
            bounds,
            style: Some(style.unwrap_or_else(|| ZoneStyle::for_team(team))),
        };
        self.confirmed_zones.insert(team);
        info!(team = %team, "zone confirmed");
        self.broadcast(Event::ZoneConfirmed {
            team,
            coordinates: zone.coordinates.clone(),
            bounds,
            style: zone.style.clone(),
        });

        if self.zones_complete() {
            self.set_subphase(Subphase::Deployment);
            self.announce_phase();
        }
        Ok(zone)
    }

    fn zones_complete(&self) -> bool {
        Team::PLAYABLE.iter().all(|t| self.confirmed_zones.contains(t))
    }

    /// The local participant finished deploying.
    pub fn mark_deployment_ready(&mut self) -> Result<(), TurnError> {
        self.require_subphase(Subphase::Deployment)?;
        let id = self.session.participant_id.clone();
        self.set_ready(&id)?;
        self.broadcast(Event::DeploymentReady { participant_id: id });
        Ok(())
    }

    fn set_ready(&mut self, participant_id: &str) -> Result<(), TurnError> {
        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.id == participant_id)
            .ok_or_else(|| TurnError::UnknownParticipant(participant_id.to_string()))?;
        participant.is_deployment_ready = true;
        let tally = self.readiness();
        info!(participant = participant_id, ready = tally.ready, total = tally.total, "deployment ready");
        Ok(())
    }

    /// Combat may start once every participant is ready and both teams are staffed.
    pub fn can_start_combat(&self) -> Result<(), TurnError> {
        self.require_subphase(Subphase::Deployment)?;
        let tally = self.readiness();
        if tally.blue == 0 {
            return Err(TurnError::MissingTeam(Team::Blue));
        }
        if tally.red == 0 {
            return Err(TurnError::MissingTeam(Team::Red));
        }
        if !tally.all_ready() {
            return Err(TurnError::NotAllReady {
                waiting: tally.total - tally.ready,
            });
        }
        Ok(())
    }

    /// `deployment → combat.movement`, turn 1, first non-director participant active.
    pub fn start_combat(&mut self) -> Result<TurnAdvance, TurnError> {
        self.require_director("start combat")?;
        self.can_start_combat()?;
        let index = first_eligible(self.participants.len(), 0, self.director_index())
            .ok_or(TurnError::NoEligibleParticipant)?;

        self.set_subphase(Subphase::Movement);
        self.state.turn_number = 1;
        self.state.active_participant_index = index;
        self.reset_clock();

        let active = self.participants[index].id.clone();
        info!(active = %active, "combat started");
        self.announce_phase();
        self.broadcast(Event::TurnChanged {
            active_participant_id: active.clone(),
            turn_number: 1,
        });
        Ok(TurnAdvance {
            ended_participant_id: None,
            active_participant_id: active,
            turn_number: 1,
            forced: false,
        })
    }

    /// Back to deployment: readiness and turn state are reset.
    pub fn reenter_deployment(&mut self) -> Result<(), TurnError> {
        self.require_director("reopen deployment")?;
        match self.state.phase {
            Phase::Ended => return Err(TurnError::MatchEnded),
            Phase::Preparation if self.state.subphase != Subphase::Deployment => {
                return Err(TurnError::WrongSubphase {
                    expected: Subphase::Deployment,
                    actual: self.state.subphase,
                });
            }
            _ => {}
        }
        self.reset_deployment();
        info!("deployment reopened");
        self.announce_phase();
        Ok(())
    }

    fn reset_deployment(&mut self) {
        for p in &mut self.participants {
            p.is_deployment_ready = false;
        }
        self.clear_turn();
        self.set_subphase(Subphase::Deployment);
    }

    // --- Combat ---

    /// End the current turn.
    ///
    /// The authority rotates immediately. A non-authority active participant
    /// sends `finTurno` and waits for the authority's `cambioTurno`.
    pub fn end_turn(&mut self, forced: bool) -> Result<Option<TurnAdvance>, TurnError> {
        self.require_combat()?;
        let active = self.active_id().ok_or(TurnError::NoEligibleParticipant)?;
        if self.is_authority() {
            return self.rotate(forced, true).map(Some);
        }
        if !self.session.is(&active) {
            return Err(TurnError::NotActive {
                participant: self.session.participant_id.clone(),
            });
        }
        self.participants[self.state.active_participant_index].turns_completed += 1;
        self.broadcast(Event::TurnEnded {
            participant_id: active,
            turn_number: self.state.turn_number,
            forced,
        });
        Ok(None)
    }

    /// Advance to the next non-director participant and broadcast it.
    fn rotate(&mut self, forced: bool, announce_end: bool) -> Result<TurnAdvance, TurnError> {
        let ended_index = self.state.active_participant_index;
        let ended_turn = self.state.turn_number;
        let rotation = next_active(self.participants.len(), ended_index, self.director_index())
            .ok_or(TurnError::NoEligibleParticipant)?;

        let ended = &mut self.participants[ended_index];
        ended.turns_completed += 1;
        let ended_id = ended.id.clone();

        self.state.active_participant_index = rotation.index;
        self.state.turn_number += rotation.wraps;
        self.state.subphase = Subphase::Movement;
        self.reset_clock();

        let active = self.participants[rotation.index].id.clone();
        info!(
            ended = %ended_id,
            active = %active,
            turn = self.state.turn_number,
            forced,
            "turn advanced"
        );
        if announce_end {
            self.broadcast(Event::TurnEnded {
                participant_id: ended_id.clone(),
                turn_number: ended_turn,
                forced,
            });
        }
        self.broadcast(Event::TurnChanged {
            active_participant_id: active.clone(),
            turn_number: self.state.turn_number,
        });
        Ok(TurnAdvance {
            ended_participant_id: Some(ended_id),
            active_participant_id: active,
            turn_number: self.state.turn_number,
            forced,
        })
    }

    /// One second of the turn clock.
    pub fn on_tick(&mut self, tick: ClockTick) -> TickOutcome {
        if !self.clock.is_current(tick) {
            debug!(generation = tick.generation, "stale clock tick ignored");
            return TickOutcome::Stale;
        }
        if self.active_participant().is_none() {
            self.stop_clock();
            return TickOutcome::Idle;
        }
        self.state.clock_remaining_secs = self.state.clock_remaining_secs.saturating_sub(1);
        if self.state.clock_remaining_secs > 0 {
            return TickOutcome::Counting {
                remaining: self.state.clock_remaining_secs,
            };
        }

        self.clock.cancel();
        if !self.is_authority() {
            return TickOutcome::Expired { advance: None };
        }
        info!(turn = self.state.turn_number, "turn clock expired");
        match self.rotate(true, true) {
            Ok(advance) => TickOutcome::Expired {
                advance: Some(advance),
            },
            Err(e) => {
                warn!(error = %e, "forced turn end failed");
                TickOutcome::Expired { advance: None }
            }
        }
    }

    // --- Order cycle hooks ---

    /// Orders confirmed: `movement → execution`.
    pub fn begin_execution(&mut self) -> Result<(), TurnError> {
        self.require_subphase(Subphase::Movement)?;
        self.set_subphase(Subphase::Execution);
        self.clock.restart();
        debug!(turn = self.state.turn_number, "execution started");
        Ok(())
    }

    /// Execution finished: `execution → review`.
    pub fn begin_review(&mut self) -> Result<(), TurnError> {
        self.require_subphase(Subphase::Execution)?;
        self.set_subphase(Subphase::Review);
        self.clock.restart();
        debug!(turn = self.state.turn_number, "review started");
        Ok(())
    }

    /// Review acknowledged: back to `movement` and, if this client may, end the turn.
    pub fn complete_review(&mut self) -> Result<Option<TurnAdvance>, TurnError> {
        self.require_subphase(Subphase::Review)?;
        self.set_subphase(Subphase::Movement);
        if self.is_authority() || self.is_local_turn() {
            self.end_turn(false)
        } else {
            self.clock.restart();
            Ok(None)
        }
    }

    /// Director ends the match.
    pub fn end_match(&mut self, winner: Option<Team>, reason: impl Into<String>) -> Result<(), TurnError> {
        self.require_director("end the match")?;
        if self.state.phase == Phase::Ended {
            return Err(TurnError::MatchEnded);
        }
        let reason = reason.into();
        self.finish();
        info!(?winner, reason = %reason, "match ended");
        self.broadcast(Event::MatchEnded { winner, reason });
        Ok(())
    }

    // --- Remote ---

    /// Apply an envelope that already passed the channel's filters.
    pub fn apply_remote(&mut self, envelope: &SyncEnvelope) -> Result<RemoteOutcome, TurnError> {
        match &envelope.event {
            Event::JoinMatch {
                participant_id,
                name,
                team,
                is_director,
                ..
            } => {
                let mut participant = Participant::new(participant_id.clone(), name.clone(), *team);
                participant.is_director = *is_director;
                self.join(participant);
                Ok(RemoteOutcome::Applied)
            }
            Event::LeaveMatch { participant_id } => {
                if self.participant(participant_id).is_none() {
                    return Ok(RemoteOutcome::Ignored("unknown participant left"));
                }
                Ok(match self.leave(participant_id)? {
                    Some(advance) => RemoteOutcome::TurnAdvanced(advance),
                    None => RemoteOutcome::Applied,
                })
            }
            Event::RequestState { .. } | Event::RequestStateRefresh { .. } => {
                Ok(RemoteOutcome::Ignored("state requests are served by the session"))
            }
            Event::FullState(snapshot) => Ok(self.apply_snapshot(snapshot)),
            Event::PhaseChanged { phase, subphase, .. } => Ok(self.apply_remote_phase(*phase, *subphase)),
            Event::SectorConfirmed {
                coordinates,
                bounds,
                ..
            } => {
                if self.is_authority() {
                    return Ok(RemoteOutcome::Ignored("local machine is authoritative"));
                }
                self.sector = Some(Sector {
                    coordinates: coordinates.clone(),
                    bounds: *bounds,
                });
                if self.state.subphase == Subphase::SectorDefinition {
                    self.set_subphase(Subphase::ZoneDefinition);
                }
                Ok(RemoteOutcome::Applied)
            }
            Event::ZoneConfirmed { team, .. } => {
                self.confirmed_zones.insert(*team);
                if self.state.subphase == Subphase::ZoneDefinition && self.zones_complete() {
                    self.set_subphase(Subphase::Deployment);
                    self.deployment_entry_pending = true;
                }
                Ok(RemoteOutcome::Applied)
            }
            Event::TurnChanged {
                active_participant_id,
                turn_number,
            } => self.apply_remote_turn(active_participant_id, *turn_number),
            Event::DeploymentReady { participant_id } => {
                if self.state.subphase != Subphase::Deployment {
                    return Ok(RemoteOutcome::Ignored("not in deployment"));
                }
                self.set_ready(participant_id)?;
                Ok(RemoteOutcome::Applied)
            }
            Event::TurnEnded {
                participant_id,
                turn_number,
                forced,
            } => self.apply_remote_turn_end(participant_id, *turn_number, *forced),
            Event::MatchEnded { winner, reason } => {
                if self.state.phase == Phase::Ended {
                    return Ok(RemoteOutcome::Ignored("match already ended"));
                }
                self.finish();
                info!(?winner, reason = %reason, "match ended remotely");
                Ok(RemoteOutcome::MatchEnded { winner: *winner })
            }
            Event::ElementCreated(_)
            | Event::ElementMoved { .. }
            | Event::ElementDeleted { .. }
            | Event::OrderSubmitted { .. } => Ok(RemoteOutcome::Ignored("not a phase event")),
        }
    }

    fn apply_remote_phase(&mut self, phase: Phase, subphase: Subphase) -> RemoteOutcome {
        if self.is_authority() {
            return RemoteOutcome::Ignored("local machine is authoritative");
        }
        if self.state.phase == Phase::Ended {
            return RemoteOutcome::Ignored("match already ended");
        }
        if phase == Phase::Ended {
            self.finish();
            return RemoteOutcome::Applied;
        }
        if subphase == Subphase::Deployment {
            let reopened = match self.state.phase {
                Phase::Combat => true,
                // The first announcement after zone confirmation is the entry itself.
                _ if self.state.subphase == Subphase::Deployment => {
                    !std::mem::take(&mut self.deployment_entry_pending)
                }
                _ => false,
            };
            if reopened {
                self.reset_deployment();
                info!("deployment reopened by director");
                return RemoteOutcome::Applied;
            }
            if self.state.subphase == Subphase::Deployment {
                return RemoteOutcome::Applied;
            }
        }
        if is_backwards(self.state, phase, subphase) {
            debug!(?phase, ?subphase, "phase change would move backwards, ignored");
            return RemoteOutcome::Ignored("phase change moves backwards");
        }
        self.set_subphase(subphase);
        self.deployment_entry_pending = false;
        info!(?phase, ?subphase, "phase changed remotely");
        RemoteOutcome::Applied
    }

    fn apply_remote_turn(
        &mut self,
        active_participant_id: &str,
        turn_number: u32,
    ) -> Result<RemoteOutcome, TurnError> {
        if self.is_authority() {
            return Ok(RemoteOutcome::Ignored("local machine is authoritative"));
        }
        if self.state.phase == Phase::Ended {
            return Ok(RemoteOutcome::Ignored("match already ended"));
        }
        let index = self
            .participants
            .iter()
            .position(|p| p.id == active_participant_id)
            .ok_or_else(|| TurnError::UnknownParticipant(active_participant_id.to_string()))?;
        if Some(index) == self.director_index() {
            return Err(TurnError::DirectorActive);
        }
        let current = (self.state.turn_number, self.state.active_participant_index);
        if self.active_participant().is_some() && (turn_number, index) <= current {
            debug!(turn_number, active = active_participant_id, "stale turn change ignored");
            return Ok(RemoteOutcome::Ignored("turn change is not newer"));
        }

        self.set_subphase(Subphase::Movement);
        self.state.turn_number = turn_number;
        self.state.active_participant_index = index;
        self.reset_clock();
        info!(active = active_participant_id, turn = turn_number, "turn changed remotely");
        Ok(RemoteOutcome::TurnChanged {
            active_participant_id: active_participant_id.to_string(),
            turn_number,
        })
    }

    fn apply_remote_turn_end(
        &mut self,
        participant_id: &str,
        turn_number: u32,
        forced: bool,
    ) -> Result<RemoteOutcome, TurnError> {
        if self.state.phase != Phase::Combat {
            return Ok(RemoteOutcome::Ignored("no turn in progress"));
        }
        let active = self.active_id().ok_or(TurnError::NoEligibleParticipant)?;
        if self.is_authority() {
            if active != participant_id {
                return Err(TurnError::NotActive {
                    participant: participant_id.to_string(),
                });
            }
            if turn_number != self.state.turn_number {
                return Err(TurnError::TurnMismatch {
                    local: self.state.turn_number,
                    claimed: turn_number,
                });
            }
            return self
                .rotate(forced, false)
                .map(RemoteOutcome::TurnAdvanced);
        }
        if active != participant_id || turn_number != self.state.turn_number {
            return Ok(RemoteOutcome::Ignored("turn end does not match the active turn"));
        }
        self.participants[self.state.active_participant_index].turns_completed += 1;
        Ok(RemoteOutcome::Applied)
    }

    /// Adopt roster and phase from a full-state snapshot.
    fn apply_snapshot(&mut self, snapshot: &MatchSnapshot) -> RemoteOutcome {
        if !snapshot.participants.is_empty() {
            self.replace_roster(snapshot.participants.clone());
        }
        if self.is_local_director() {
            return RemoteOutcome::Applied;
        }
        if let Some(sector) = &snapshot.sector {
            self.sector = Some(sector.clone());
        }
        self.confirmed_zones
            .extend(snapshot.zones.iter().map(|z| z.team));

        if snapshot.phase == Phase::Ended {
            self.finish();
            return RemoteOutcome::Applied;
        }
        let previous = (self.state.turn_number, self.active_id());
        self.deployment_entry_pending = false;
        self.state.phase = snapshot.phase;
        self.state.subphase = snapshot.subphase;
        self.state.turn_number = snapshot.turn_number;

        let active_index = snapshot
            .active_participant_id
            .as_deref()
            .and_then(|id| self.participants.iter().position(|p| p.id == id));
        match (snapshot.phase, active_index) {
            (Phase::Combat, Some(index)) => {
                self.state.active_participant_index = index;
                if previous != (snapshot.turn_number, snapshot.active_participant_id.clone()) {
                    self.reset_clock();
                }
            }
            _ => self.stop_clock(),
        }
        debug!(phase = ?snapshot.phase, subphase = ?snapshot.subphase, "phase adopted from snapshot");
        RemoteOutcome::Applied
    }
}

/// Bounds of a confirmed polygon: at least three points, non-zero extent.
fn polygon_bounds(coordinates: &[LatLng]) -> Result<Bounds, TurnError> {
    if coordinates.len() < 3 {
        return Err(TurnError::InvalidArea("needs at least three points"));
    }
    let bounds = Bounds::enclosing(coordinates).ok_or(TurnError::InvalidArea("no points"))?;
    if bounds.is_degenerate() {
        return Err(TurnError::InvalidArea("polygon has no extent"));
    }
    Ok(bounds)
}

fn phase_rank(phase: Phase) -> u8 {
    match phase {
        Phase::Preparation => 0,
        Phase::Combat => 1,
        Phase::Ended => 2,
    }
}

/// A remote phase change is backwards if it names an earlier phase, or an
/// earlier (or the same) preparation step. Combat subphases cycle locally
/// and are never taken from the wire.
fn is_backwards(current: MatchPhaseState, phase: Phase, subphase: Subphase) -> bool {
    match phase_rank(phase).cmp(&phase_rank(current.phase)) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => {
            phase == Phase::Combat || subphase.ordinal() <= current.subphase.ordinal()
        }
    }
}

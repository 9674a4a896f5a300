//! Integration tests for the phase/turn state machine.

use std::time::Duration;

use tokio::sync::mpsc;

use skirmish_core::enums::{Phase, Subphase, Team};
use skirmish_core::events::{Event, EventKind, SyncEnvelope};
use skirmish_core::participant::Participant;
use skirmish_core::session::SessionContext;
use skirmish_core::state::MatchSnapshot;
use skirmish_core::types::LatLng;
use skirmish_sync::IntentSender;

use crate::clock::ClockTick;
use crate::error::TurnError;
use crate::machine::{PhaseTurnStateMachine, RemoteOutcome, TickOutcome, TurnConfig};

struct Harness {
    machine: PhaseTurnStateMachine,
    ticks: mpsc::UnboundedReceiver<ClockTick>,
    sent: mpsc::UnboundedReceiver<Event>,
}

impl Harness {
    fn new(local: &str, team: Team, duration: u32) -> Self {
        let session = SessionContext::new(local, local.to_uppercase(), team, "ABC123");
        let (intents, sent) = IntentSender::detached();
        let config = TurnConfig {
            turn_duration_secs: duration,
            ..TurnConfig::default()
        };
        let (machine, ticks) = PhaseTurnStateMachine::new(session, config, intents);
        Self {
            machine,
            ticks,
            sent,
        }
    }

    fn sent_kinds(&mut self) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        while let Ok(ev) = self.sent.try_recv() {
            kinds.push(ev.kind());
        }
        kinds
    }

    fn remote(&mut self, origin: &str, event: Event) -> Result<RemoteOutcome, TurnError> {
        self.machine.apply_remote(&SyncEnvelope::new(event, origin))
    }

    /// Run the director through sector and zone definition into deployment.
    fn prepare(&mut self) {
        self.machine.confirm_sector(square(0.0, 1.0)).unwrap();
        self.machine.confirm_zone(Team::Blue, square(0.1, 0.3), None).unwrap();
        self.machine.confirm_zone(Team::Red, square(0.6, 0.3), None).unwrap();
        assert_eq!(self.machine.state().subphase, Subphase::Deployment);
    }

    fn everyone_ready(&mut self) {
        let ids: Vec<String> = self
            .machine
            .participants()
            .iter()
            .map(|p| p.id.clone())
            .collect();
        for id in ids {
            if self.machine.session().is(&id) {
                self.machine.mark_deployment_ready().unwrap();
            } else {
                self.remote(&id, Event::DeploymentReady {
                    participant_id: id.clone(),
                })
                .unwrap();
            }
        }
    }

    fn active_id(&self) -> String {
        self.machine.active_participant().unwrap().id.clone()
    }

    fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(ev) = self.sent.try_recv() {
            events.push(ev);
        }
        events
    }
}

fn square(origin: f64, size: f64) -> Vec<LatLng> {
    vec![
        LatLng::new(origin, origin),
        LatLng::new(origin + size, origin),
        LatLng::new(origin + size, origin + size),
        LatLng::new(origin, origin + size),
    ]
}

/// Director "d" (explicit, blue) sits last; p1/p2 blue, p3 red.
fn four_player_match() -> Harness {
    let mut h = Harness::new("d", Team::Blue, 60);
    h.machine.replace_roster(vec![
        Participant::new("p1", "P1", Team::Blue),
        Participant::new("p2", "P2", Team::Blue),
        Participant::new("p3", "P3", Team::Red),
        Participant::new("d", "D", Team::Blue).director(),
    ]);
    h.prepare();
    h.everyone_ready();
    h
}

// ---- Scenarios ----

#[tokio::test]
async fn test_four_participant_rotation() {
    let mut h = four_player_match();
    assert!(h.machine.is_local_director());
    h.sent_kinds();

    let start = h.machine.start_combat().unwrap();
    assert_eq!(start.turn_number, 1);
    assert_eq!(start.active_participant_id, "p1");
    assert_eq!(h.machine.state().active_participant_index, 0);
    assert_eq!(h.machine.state().phase, Phase::Combat);
    assert_eq!(h.machine.state().clock_remaining_secs, 60);
    assert_eq!(
        h.sent_kinds(),
        vec![EventKind::PhaseChanged, EventKind::TurnChanged]
    );

    let mut seen = Vec::new();
    for _ in 0..3 {
        let advance = h.machine.end_turn(false).unwrap().unwrap();
        seen.push((advance.active_participant_id, advance.turn_number));
    }
    assert_eq!(
        seen,
        vec![
            ("p2".to_string(), 1),
            ("p3".to_string(), 1),
            ("p1".to_string(), 2)
        ]
    );
    assert_eq!(h.machine.state().turn_number, 2);
    assert_eq!(h.machine.participant("p3").unwrap().turns_completed, 1);
    assert_eq!(h.machine.participant("d").unwrap().turns_completed, 0);
}

#[tokio::test]
async fn test_director_never_becomes_active() {
    // Explicit director at every roster position in turn.
    for director_at in 0..4 {
        let ids = ["a", "b", "c", "e"];
        let mut roster: Vec<Participant> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let team = if i % 2 == 0 { Team::Blue } else { Team::Red };
                Participant::new(*id, id.to_uppercase(), team)
            })
            .collect();
        roster[director_at].is_director = true;
        let local = ids[director_at];

        let mut h = Harness::new(local, roster[director_at].team, 30);
        h.machine.replace_roster(roster);
        h.prepare();
        h.everyone_ready();
        h.machine.start_combat().unwrap();

        for _ in 0..10 {
            assert_ne!(h.active_id(), local);
            h.machine.end_turn(false).unwrap();
        }
        assert_ne!(h.active_id(), local);
    }
}

#[tokio::test]
async fn test_deployment_readiness_gates_combat() {
    let mut h = four_player_match();
    assert!(h.machine.readiness().all_ready());
    assert!(h.machine.can_start_combat().is_ok());

    // Same roster without red: refused.
    let mut h = Harness::new("d", Team::Blue, 60);
    h.machine.replace_roster(vec![
        Participant::new("p1", "P1", Team::Blue),
        Participant::new("d", "D", Team::Blue).director(),
    ]);
    h.prepare();
    h.everyone_ready();
    assert_eq!(
        h.machine.start_combat().unwrap_err(),
        TurnError::MissingTeam(Team::Red)
    );
    assert_eq!(h.machine.state().phase, Phase::Preparation);
}

#[tokio::test]
async fn test_not_all_ready_is_refused() {
    let mut h = Harness::new("d", Team::Blue, 60);
    h.machine.replace_roster(vec![
        Participant::new("d", "D", Team::Blue),
        Participant::new("r", "R", Team::Red),
    ]);
    h.prepare();
    h.machine.mark_deployment_ready().unwrap();
    assert_eq!(
        h.machine.start_combat().unwrap_err(),
        TurnError::NotAllReady { waiting: 1 }
    );
}

#[tokio::test]
async fn test_reentering_deployment_resets_readiness() {
    let mut h = four_player_match();
    h.machine.start_combat().unwrap();
    h.machine.reenter_deployment().unwrap();

    let state = h.machine.state();
    assert_eq!(state.subphase, Subphase::Deployment);
    assert_eq!(state.turn_number, 0);
    assert!(!h.machine.is_clock_running());
    assert_eq!(h.machine.readiness().ready, 0);
}

#[tokio::test]
async fn test_reopened_deployment_resets_player_readiness() {
    let roster = vec![
        Participant::new("p1", "P1", Team::Blue),
        Participant::new("p2", "P2", Team::Red),
        Participant::new("d", "D", Team::Blue).director(),
    ];
    let mut d = Harness::new("d", Team::Blue, 60);
    d.machine.replace_roster(roster.clone());
    let mut p1 = Harness::new("p1", Team::Blue, 60);
    p1.machine.replace_roster(roster);

    d.prepare();
    let mut events = d.drain();
    let entry = events.pop().unwrap();
    assert_eq!(entry.kind(), EventKind::PhaseChanged);
    for ev in events {
        p1.remote("d", ev).unwrap();
    }
    assert_eq!(p1.machine.state().subphase, Subphase::Deployment);

    // The player marks ready before the director's entry announcement lands.
    p1.machine.mark_deployment_ready().unwrap();
    assert_eq!(p1.remote("d", entry).unwrap(), RemoteOutcome::Applied);
    assert_eq!(p1.machine.readiness().ready, 1);

    p1.everyone_ready();
    assert_eq!(p1.machine.readiness().ready, 3);
    d.everyone_ready();
    d.drain();

    d.machine.reenter_deployment().unwrap();
    assert_eq!(d.machine.readiness().ready, 0);
    for ev in d.drain() {
        assert_eq!(p1.remote("d", ev).unwrap(), RemoteOutcome::Applied);
    }
    assert_eq!(p1.machine.state().subphase, Subphase::Deployment);
    assert_eq!(p1.machine.readiness().ready, 0);
}

// ---- Preparation guards ----

#[tokio::test]
async fn test_only_director_confirms_sector() {
    let mut h = Harness::new("p1", Team::Red, 60);
    h.machine.join(Participant::new("d", "D", Team::Blue));
    assert!(matches!(
        h.machine.confirm_sector(square(0.0, 1.0)),
        Err(TurnError::NotDirector { .. })
    ));
}

#[tokio::test]
async fn test_zone_outside_sector_is_rejected() {
    let mut h = Harness::new("d", Team::Blue, 60);
    h.machine.confirm_sector(square(0.0, 1.0)).unwrap();
    assert_eq!(
        h.machine.confirm_zone(Team::Blue, square(0.8, 0.5), None).unwrap_err(),
        TurnError::InvalidArea("zone lies outside the sector")
    );
    assert_eq!(
        h.machine.confirm_zone(Team::Unassigned, square(0.1, 0.1), None).unwrap_err(),
        TurnError::NotPlayable(Team::Unassigned)
    );
    assert_eq!(h.machine.state().subphase, Subphase::ZoneDefinition);
}

#[tokio::test]
async fn test_zone_must_fit_the_sector_polygon() {
    let mut h = Harness::new("d", Team::Blue, 60);
    let triangle = vec![
        LatLng::new(0.0, 0.0),
        LatLng::new(0.0, 1.0),
        LatLng::new(1.0, 0.0),
    ];
    h.machine.confirm_sector(triangle).unwrap();
    // Inside the bounding box, but the far corner pokes past the hypotenuse.
    assert_eq!(
        h.machine.confirm_zone(Team::Blue, square(0.6, 0.3), None).unwrap_err(),
        TurnError::InvalidArea("zone lies outside the sector")
    );
    h.machine.confirm_zone(Team::Blue, square(0.1, 0.3), None).unwrap();
    assert!(h.machine.is_zone_confirmed(Team::Blue));
}

#[tokio::test]
async fn test_degenerate_sector_is_rejected() {
    let mut h = Harness::new("d", Team::Blue, 60);
    let line = vec![
        LatLng::new(0.0, 0.0),
        LatLng::new(0.0, 1.0),
        LatLng::new(0.0, 2.0),
    ];
    assert!(matches!(
        h.machine.confirm_sector(line),
        Err(TurnError::InvalidArea(_))
    ));
    assert_eq!(h.machine.state().subphase, Subphase::SectorDefinition);
}

// ---- Remote application ----

#[tokio::test]
async fn test_player_follows_director_broadcasts() {
    let mut h = Harness::new("p1", Team::Blue, 60);
    h.machine.replace_roster(vec![
        Participant::new("d", "D", Team::Blue).director(),
        Participant::new("p1", "P1", Team::Blue),
        Participant::new("p2", "P2", Team::Red),
    ]);
    assert!(!h.machine.is_authority());

    h.remote("d", Event::PhaseChanged {
        phase: Phase::Combat,
        subphase: Subphase::Movement,
        participant_id: "d".into(),
    })
    .unwrap();
    let outcome = h
        .remote("d", Event::TurnChanged {
            active_participant_id: "p1".into(),
            turn_number: 1,
        })
        .unwrap();
    assert!(matches!(outcome, RemoteOutcome::TurnChanged { turn_number: 1, .. }));
    assert!(h.machine.is_local_turn());

    // The player ends their own turn: finTurno goes out, no local rotation.
    h.sent_kinds();
    assert_eq!(h.machine.end_turn(false).unwrap(), None);
    assert_eq!(h.sent_kinds(), vec![EventKind::TurnEnded]);
    assert_eq!(h.active_id(), "p1");

    // A stale (older) turn change is ignored; the newer one applies.
    h.remote("d", Event::TurnChanged {
        active_participant_id: "p2".into(),
        turn_number: 1,
    })
    .unwrap();
    let stale = h
        .remote("d", Event::TurnChanged {
            active_participant_id: "p1".into(),
            turn_number: 1,
        })
        .unwrap();
    assert!(matches!(stale, RemoteOutcome::Ignored(_)));
    assert_eq!(h.active_id(), "p2");
}

#[tokio::test]
async fn test_turn_change_naming_director_is_refused() {
    let mut h = Harness::new("p1", Team::Red, 60);
    h.machine.replace_roster(vec![
        Participant::new("d", "D", Team::Blue).director(),
        Participant::new("p1", "P1", Team::Red),
    ]);
    let err = h
        .remote("x", Event::TurnChanged {
            active_participant_id: "d".into(),
            turn_number: 1,
        })
        .unwrap_err();
    assert_eq!(err, TurnError::DirectorActive);
}

#[tokio::test]
async fn test_director_ignores_remote_turn_changes_and_validates_turn_end() {
    let mut h = four_player_match();
    h.machine.start_combat().unwrap();

    let ignored = h
        .remote("p3", Event::TurnChanged {
            active_participant_id: "p3".into(),
            turn_number: 5,
        })
        .unwrap();
    assert!(matches!(ignored, RemoteOutcome::Ignored(_)));
    assert_eq!(h.active_id(), "p1");

    // Wrong participant claims the turn end.
    assert!(matches!(
        h.remote("p2", Event::TurnEnded {
            participant_id: "p2".into(),
            turn_number: 1,
            forced: false,
        }),
        Err(TurnError::NotActive { .. })
    ));

    h.sent_kinds();
    let outcome = h
        .remote("p1", Event::TurnEnded {
            participant_id: "p1".into(),
            turn_number: 1,
            forced: false,
        })
        .unwrap();
    match outcome {
        RemoteOutcome::TurnAdvanced(advance) => assert_eq!(advance.active_participant_id, "p2"),
        other => panic!("expected advance, got {other:?}"),
    }
    // Only the turn change goes out; the player already announced the end.
    assert_eq!(h.sent_kinds(), vec![EventKind::TurnChanged]);
}

#[tokio::test]
async fn test_backwards_phase_change_is_ignored() {
    let mut h = Harness::new("p1", Team::Red, 60);
    h.machine.join(Participant::new("d", "D", Team::Blue).director());
    h.remote("d", Event::PhaseChanged {
        phase: Phase::Preparation,
        subphase: Subphase::Deployment,
        participant_id: "d".into(),
    })
    .unwrap();
    let outcome = h
        .remote("d", Event::PhaseChanged {
            phase: Phase::Preparation,
            subphase: Subphase::ZoneDefinition,
            participant_id: "d".into(),
        })
        .unwrap();
    assert!(matches!(outcome, RemoteOutcome::Ignored(_)));
    assert_eq!(h.machine.state().subphase, Subphase::Deployment);
}

#[tokio::test]
async fn test_snapshot_adopts_roster_and_turn() {
    let mut h = Harness::new("p2", Team::Red, 60);
    let snapshot = MatchSnapshot {
        phase: Phase::Combat,
        subphase: Subphase::Movement,
        sector: None,
        zones: Vec::new(),
        elements: Vec::new(),
        participants: vec![
            Participant::new("d", "D", Team::Blue).director(),
            Participant::new("p1", "P1", Team::Blue),
        ],
        turn_number: 3,
        active_participant_id: Some("p1".into()),
        timestamp: chrono::Utc::now(),
    };
    h.remote("d", Event::FullState(snapshot)).unwrap();

    assert_eq!(h.machine.participants().len(), 3, "local participant kept");
    assert_eq!(h.machine.state().turn_number, 3);
    assert_eq!(h.active_id(), "p1");
    assert!(h.machine.is_clock_running());
}

#[tokio::test]
async fn test_active_participant_leaving_hands_over() {
    let mut h = four_player_match();
    h.machine.start_combat().unwrap();
    h.machine.end_turn(false).unwrap(); // p2 active

    let advance = h.machine.leave("p2").unwrap().unwrap();
    assert_eq!(advance.active_participant_id, "p3");
    assert_eq!(h.active_id(), "p3");

    // Leaving before the active index keeps the same person active.
    h.machine.leave("p1").unwrap();
    assert_eq!(h.active_id(), "p3");
}

#[tokio::test]
async fn test_match_end_stops_everything() {
    let mut h = four_player_match();
    h.machine.start_combat().unwrap();
    h.machine.end_match(Some(Team::Red), "objective taken").unwrap();
    assert_eq!(h.machine.state().phase, Phase::Ended);
    assert!(!h.machine.is_clock_running());
    assert_eq!(h.machine.end_turn(false).unwrap_err(), TurnError::MatchEnded);
}

// ---- Order cycle hooks ----

#[tokio::test]
async fn test_review_cycle_ends_turn() {
    let mut h = four_player_match();
    h.machine.start_combat().unwrap();
    assert!(h.machine.begin_review().is_err());
    h.machine.begin_execution().unwrap();
    h.machine.begin_review().unwrap();
    let advance = h.machine.complete_review().unwrap().unwrap();
    assert_eq!(advance.active_participant_id, "p2");
    assert_eq!(h.machine.state().subphase, Subphase::Movement);
}

// ---- Clock ----

#[tokio::test(start_paused = true)]
async fn test_clock_expiry_forces_turn_end() {
    let mut h = four_player_match();
    h.machine.start_combat().unwrap();
    h.sent_kinds();
    // 60 second turns: 59 counting ticks, then expiry.
    for expected in (1..60).rev() {
        let tick = h.ticks.recv().await.unwrap();
        assert_eq!(
            h.machine.on_tick(tick),
            TickOutcome::Counting {
                remaining: expected
            }
        );
    }
    let tick = h.ticks.recv().await.unwrap();
    match h.machine.on_tick(tick) {
        TickOutcome::Expired {
            advance: Some(advance),
        } => {
            assert!(advance.forced);
            assert_eq!(advance.active_participant_id, "p2");
        }
        other => panic!("expected forced advance, got {other:?}"),
    }
    assert_eq!(
        h.sent_kinds(),
        vec![EventKind::TurnEnded, EventKind::TurnChanged]
    );
    assert_eq!(h.machine.state().clock_remaining_secs, 60);
}

#[tokio::test(start_paused = true)]
async fn test_ticks_from_previous_turn_are_stale() {
    let mut h = four_player_match();
    h.machine.start_combat().unwrap();
    let old = h.ticks.recv().await.unwrap();
    h.machine.end_turn(false).unwrap();
    assert_eq!(h.machine.on_tick(old), TickOutcome::Stale);
    assert_eq!(h.machine.state().clock_remaining_secs, 60);

    let fresh = h.ticks.recv().await.unwrap();
    assert_eq!(
        h.machine.on_tick(fresh),
        TickOutcome::Counting { remaining: 59 }
    );
}

#[tokio::test(start_paused = true)]
async fn test_non_authority_clock_expiry_waits_for_director() {
    let mut h = Harness::new("p1", Team::Blue, 2);
    h.machine.replace_roster(vec![
        Participant::new("d", "D", Team::Blue).director(),
        Participant::new("p1", "P1", Team::Blue),
    ]);
    h.remote("d", Event::TurnChanged {
        active_participant_id: "p1".into(),
        turn_number: 1,
    })
    .unwrap();
    let tick = h.ticks.recv().await.unwrap();
    h.machine.on_tick(tick);
    let tick = h.ticks.recv().await.unwrap();
    assert_eq!(
        h.machine.on_tick(tick),
        TickOutcome::Expired { advance: None }
    );
    assert!(h.sent_kinds().is_empty());
    let idle = tokio::time::timeout(Duration::from_secs(5), h.ticks.recv()).await;
    assert!(idle.is_err(), "clock stops after expiry");
}

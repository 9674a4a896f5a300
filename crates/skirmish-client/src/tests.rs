//! Session tests: several clients playing through one in-process relay.

use std::time::Duration;

use skirmish_core::commands::PlayerCommand;
use skirmish_core::enums::{ConnectionState, OrderKind, Phase, Subphase, Team};
use skirmish_core::order::{OrderIntent, OrderTarget};
use skirmish_core::types::{LatLng, UnitElement};
use skirmish_sync::LocalRelay;

use crate::config::ClientConfig;
use crate::session::{ClientSession, ClientView, SessionHandle};

const WAIT: Duration = Duration::from_secs(5);

fn config(id: &str, team: Team, director: bool) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.session.participant_id = id.into();
    config.session.name = id.to_uppercase();
    config.session.team = team;
    config.session.match_code = "ABC123".into();
    config.session.director = director;
    config.orders.grid_width = 20;
    config.orders.grid_height = 20;
    config
}

async fn until(
    handle: &mut SessionHandle,
    what: &str,
    predicate: impl FnMut(&ClientView) -> bool,
) -> ClientView {
    tokio::time::timeout(WAIT, handle.wait_for(predicate))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .unwrap_or_else(|| panic!("session stopped before {what}"))
}

fn pt(lat: f64, lng: f64) -> LatLng {
    LatLng::new(lat, lng)
}

fn rect(south: f64, west: f64, north: f64, east: f64) -> Vec<LatLng> {
    vec![pt(south, west), pt(south, east), pt(north, east), pt(north, west)]
}

fn sector() -> Vec<LatLng> {
    rect(40.0, -3.0, 40.01, -2.99)
}

fn blue_zone() -> Vec<LatLng> {
    rect(40.001, -2.999, 40.009, -2.996)
}

fn red_zone() -> Vec<LatLng> {
    rect(40.001, -2.994, 40.009, -2.991)
}

fn unit(id: &str, team: Team, position: LatLng) -> UnitElement {
    UnitElement {
        id: id.into(),
        team,
        label: String::new(),
        position,
        creator_id: String::new(),
    }
}

fn move_order(unit_id: &str, team: Team, to: LatLng) -> PlayerCommand {
    PlayerCommand::IssueOrder {
        intent: OrderIntent {
            unit_id: unit_id.into(),
            team,
            kind: OrderKind::Move,
            target: OrderTarget::Destination { point: to },
            priority: 0,
            duration_secs: None,
        },
    }
}

fn active_is(view: &ClientView, id: &str) -> bool {
    view.active_participant_id.as_deref() == Some(id)
}

#[tokio::test]
async fn test_late_joiner_receives_director_state() {
    let relay = LocalRelay::new();
    let (director, mut d) = ClientSession::over_relay(&config("d", Team::Blue, true), &relay);
    let director = tokio::spawn(director.run());
    until(&mut d, "director online", |v| v.connection == ConnectionState::Connected).await;

    d.send(PlayerCommand::ConfirmSector { coordinates: sector() });
    until(&mut d, "zone definition", |v| v.phase.subphase == Subphase::ZoneDefinition).await;

    let (blue, mut b) = ClientSession::over_relay(&config("pb", Team::Blue, false), &relay);
    let blue = tokio::spawn(blue.run());
    let view = until(&mut b, "director snapshot", |v| {
        v.board.sector.is_some() && v.participants.len() == 2
    })
    .await;
    assert_eq!(view.director_id.as_deref(), Some("d"));
    assert_eq!(view.phase.subphase, Subphase::ZoneDefinition);

    b.send(PlayerCommand::ConfirmZone {
        team: Team::Blue,
        coordinates: blue_zone(),
        style: None,
    });
    let view = until(&mut b, "refusal", |v| v.last_error.is_some()).await;
    assert!(view.last_error.unwrap().starts_with("confirm_zone"));
    assert!(view.board.zones.is_empty());

    d.shutdown();
    b.shutdown();
    let director = director.await.unwrap();
    assert_eq!(director.machine().participants().len(), 2);
    let blue = blue.await.unwrap();
    assert!(blue.field().has_grid());
    assert!(!blue.machine().is_local_director());
}

#[tokio::test]
async fn test_three_clients_play_a_turn() {
    let relay = LocalRelay::new();

    let (session, mut d) = ClientSession::over_relay(&config("d", Team::Blue, true), &relay);
    let d_task = tokio::spawn(session.run());
    until(&mut d, "director online", |v| v.connection == ConnectionState::Connected).await;

    let (session, mut b) = ClientSession::over_relay(&config("pb", Team::Blue, false), &relay);
    let b_task = tokio::spawn(session.run());
    until(&mut d, "blue joined", |v| v.participants.len() == 2).await;

    let (session, mut r) = ClientSession::over_relay(&config("pr", Team::Red, false), &relay);
    let r_task = tokio::spawn(session.run());
    until(&mut d, "red joined", |v| v.participants.len() == 3).await;
    until(&mut b, "roster", |v| v.participants.len() == 3).await;
    until(&mut r, "roster", |v| v.participants.len() == 3).await;

    // Preparation.
    d.send(PlayerCommand::ConfirmSector { coordinates: sector() });
    d.send(PlayerCommand::ConfirmZone {
        team: Team::Blue,
        coordinates: blue_zone(),
        style: None,
    });
    d.send(PlayerCommand::ConfirmZone {
        team: Team::Red,
        coordinates: red_zone(),
        style: None,
    });
    let view = until(&mut d, "deployment", |v| v.phase.subphase == Subphase::Deployment).await;
    assert!(view.board.has_zone(Team::Blue) && view.board.has_zone(Team::Red));
    let view = until(&mut b, "deployment", |v| v.phase.subphase == Subphase::Deployment).await;
    assert!(view.board.has_zone(Team::Blue));
    assert!(!view.board.has_zone(Team::Red), "players only see their own zone");
    until(&mut r, "deployment", |v| v.phase.subphase == Subphase::Deployment).await;

    // Deployment.
    b.send(PlayerCommand::CreateElement {
        element: unit("b1", Team::Blue, pt(40.005, -2.998)),
    });
    b.send(PlayerCommand::CreateElement {
        element: unit("b2", Team::Blue, pt(40.005, -2.992)),
    });
    let view = until(&mut b, "zone refusal", |v| v.last_error.is_some()).await;
    assert!(view.board.elements.contains_key("b1"));
    assert!(!view.board.elements.contains_key("b2"));

    r.send(PlayerCommand::CreateElement {
        element: unit("r1", Team::Red, pt(40.005, -2.992)),
    });
    let view = until(&mut d, "units", |v| v.board.elements.len() == 2).await;
    assert_eq!(view.board.elements["b1"].creator_id, "pb");
    until(&mut r, "units", |v| v.board.elements.len() == 2).await;
    until(&mut b, "units", |v| v.board.elements.len() == 2).await;

    d.send(PlayerCommand::StartCombat);
    let view = until(&mut d, "readiness refusal", |v| v.last_error.is_some()).await;
    assert!(view.last_error.unwrap().starts_with("start_combat"));

    for handle in [&d, &b, &r] {
        handle.send(PlayerCommand::MarkDeploymentReady);
    }
    until(&mut d, "everyone ready", |v| {
        v.participants.iter().all(|p| p.is_deployment_ready)
    })
    .await;
    d.send(PlayerCommand::StartCombat);
    until(&mut b, "blue turn", |v| active_is(v, "pb")).await;

    // Blue cannot order the red unit, under either team.
    b.send(move_order("r1", Team::Red, pt(40.002, -2.993)));
    let view = until(&mut b, "foreign team refusal", |v| {
        v.last_error.as_deref().is_some_and(|e| e.starts_with("issue_order"))
    })
    .await;
    assert!(view.last_error.unwrap().contains("red"));
    b.send(move_order("r1", Team::Blue, pt(40.002, -2.993)));
    let view = until(&mut b, "foreign unit refusal", |v| {
        v.last_error.as_deref().is_some_and(|e| e.contains("r1"))
    })
    .await;
    assert!(view.orders.values().all(Vec::is_empty));

    // Blue plans, confirms and executes; the others mirror the order.
    let target = pt(40.008, -2.998);
    b.send(move_order("b1", Team::Blue, target));
    until(&mut r, "mirrored order", |v| v.orders[&Team::Blue].len() == 1).await;

    b.send(PlayerCommand::ConfirmOrders);
    let view = until(&mut b, "review", |v| v.phase.subphase == Subphase::Review).await;
    assert_eq!(view.execution_log.len(), 1);
    assert!(view.execution_log[0].result.success);
    assert_eq!(view.board.elements["b1"].position, target);
    until(&mut r, "move seen", |v| {
        v.board.elements.get("b1").is_some_and(|e| e.position == target)
    })
    .await;

    // Review done: the director rotates to red, everybody drops the settled order.
    b.send(PlayerCommand::FinishReview);
    let view = until(&mut d, "red turn", |v| active_is(v, "pr")).await;
    assert_eq!(view.phase.turn_number, 1);
    assert!(view.orders[&Team::Blue].is_empty());
    let blue = view.participants.iter().find(|p| p.id == "pb").unwrap();
    assert_eq!(blue.turns_completed, 1);
    let view = until(&mut r, "red turn", |v| active_is(v, "pr")).await;
    assert!(view.orders[&Team::Blue].is_empty());
    until(&mut b, "red turn", |v| active_is(v, "pr")).await;

    // Director ends the match; red leaves.
    d.send(PlayerCommand::EndMatch {
        winner: Some(Team::Blue),
        reason: "objective held".into(),
    });
    let view = until(&mut r, "match end", |v| v.outcome.is_some()).await;
    assert_eq!(view.phase.phase, Phase::Ended);
    assert_eq!(view.outcome.unwrap().winner, Some(Team::Blue));

    r.send(PlayerCommand::Leave);
    let red = r_task.await.unwrap();
    assert_eq!(red.machine().state().phase, Phase::Ended);
    until(&mut d, "red left", |v| v.participants.len() == 2).await;

    d.shutdown();
    b.shutdown();
    d_task.await.unwrap();
    b_task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_reconnection_is_surfaced() {
    let relay = LocalRelay::new();
    relay.set_online(false);
    let mut cfg = config("pb", Team::Blue, false);
    cfg.sync.reconnect_base_delay_ms = 100;
    cfg.sync.reconnect_max_attempts = 2;

    let (session, mut handle) = ClientSession::over_relay(&cfg, &relay);
    let task = tokio::spawn(session.run());
    let view = until(&mut handle, "give up", |v| v.reconnection_failed.is_some()).await;
    assert_eq!(view.connection, ConnectionState::Failed);
    assert_eq!(view.reconnection_failed, Some(2));

    relay.set_online(true);
    assert!(handle.reconnect());
    let view = until(&mut handle, "manual reconnect", |v| {
        v.connection == ConnectionState::Connected
    })
    .await;
    assert_eq!(view.reconnection_failed, None);

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn test_units_only_move_during_deployment() {
    let relay = LocalRelay::new();
    let (session, mut d) = ClientSession::over_relay(&config("d", Team::Blue, true), &relay);
    let task = tokio::spawn(session.run());

    d.send(PlayerCommand::CreateElement {
        element: unit("b1", Team::Blue, pt(40.005, -2.998)),
    });
    let view = until(&mut d, "refusal", |v| v.last_error.is_some()).await;
    assert!(view.last_error.unwrap().contains("deployment"));
    assert!(view.board.elements.is_empty());

    d.send(PlayerCommand::MoveElement {
        unit_id: "ghost".into(),
        position: pt(40.0, -3.0),
    });
    let view = until(&mut d, "unknown unit", |v| {
        v.last_error.as_deref().is_some_and(|e| e.starts_with("move_element"))
    })
    .await;
    assert!(view.last_error.unwrap().contains("ghost"));

    d.shutdown();
    task.await.unwrap();
}

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;
use tracing::info;

use skirmish_client::{ClientConfig, ClientSession, ClientView, SessionHandle};
use skirmish_core::commands::PlayerCommand;
use skirmish_core::enums::{ConnectionState, OrderKind, Subphase, Team};
use skirmish_core::order::{OrderIntent, OrderTarget};
use skirmish_core::types::{LatLng, UnitElement};
use skirmish_sync::LocalRelay;

#[derive(Parser)]
#[command(name = "skirmish", about = "Turn-based wargame client core", version)]
struct Cli {
    /// TOML config file (defaults apply when omitted)
    #[arg(long, short = 'c', global = true, env = "SKIRMISH_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    participant_id: Option<String>,

    #[arg(long, global = true)]
    name: Option<String>,

    /// blue, red or unassigned
    #[arg(long, global = true, value_parser = parse_team)]
    team: Option<Team>,

    #[arg(long, global = true)]
    match_code: Option<String>,

    /// Seconds per turn
    #[arg(long, global = true)]
    turn_secs: Option<u32>,

    /// Default log level; RUST_LOG directives take precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration as TOML
    Config,
    /// Play a scripted match between a director and two players over an in-process relay
    Demo,
}

fn parse_team(value: &str) -> Result<Team, String> {
    match value.to_ascii_lowercase().as_str() {
        "blue" => Ok(Team::Blue),
        "red" => Ok(Team::Red),
        "unassigned" => Ok(Team::Unassigned),
        other => Err(format!("unknown team '{other}'")),
    }
}

impl Cli {
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = ClientConfig::load_or_default(self.config.as_deref())?;
        if let Some(id) = &self.participant_id {
            config.session.participant_id = id.clone();
        }
        if let Some(name) = &self.name {
            config.session.name = name.clone();
        }
        if let Some(team) = self.team {
            config.session.team = team;
        }
        if let Some(code) = &self.match_code {
            config.session.match_code = code.clone();
        }
        if let Some(secs) = self.turn_secs {
            config.turns.turn_duration_secs = secs;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(cli.log_level.into()))
        .with_target(false)
        .init();

    let config = cli.client_config()?;
    match cli.command {
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Demo => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to start the runtime")?;
            runtime.block_on(run_demo(&config))
        }
    }
}

// --- Demo ---

const STEP_TIMEOUT: Duration = Duration::from_secs(10);

struct Seat {
    handle: SessionHandle,
    task: JoinHandle<ClientSession>,
}

impl Seat {
    fn join(relay: &LocalRelay, base: &ClientConfig, id: &str, team: Team, director: bool) -> Self {
        let mut config = base.clone();
        config.session.participant_id = id.into();
        config.session.name = id.to_uppercase();
        config.session.team = team;
        config.session.director = director;
        let (session, handle) = ClientSession::over_relay(&config, relay);
        Self {
            handle,
            task: tokio::spawn(session.run()),
        }
    }

    fn send(&self, command: PlayerCommand) -> anyhow::Result<()> {
        if !self.handle.send(command) {
            bail!("session stopped");
        }
        Ok(())
    }

    async fn until(&mut self, what: &str, predicate: impl FnMut(&ClientView) -> bool) -> anyhow::Result<ClientView> {
        match tokio::time::timeout(STEP_TIMEOUT, self.handle.wait_for(predicate)).await {
            Ok(Some(view)) => Ok(view),
            Ok(None) => bail!("session stopped while waiting for {what}"),
            Err(_) => bail!("timed out waiting for {what}"),
        }
    }

    async fn stop(self) -> anyhow::Result<ClientSession> {
        self.handle.shutdown();
        self.task.await.context("session task panicked")
    }
}

fn rect(south: f64, west: f64, north: f64, east: f64) -> Vec<LatLng> {
    vec![
        LatLng::new(south, west),
        LatLng::new(south, east),
        LatLng::new(north, east),
        LatLng::new(north, west),
    ]
}

fn unit(id: &str, team: Team, lat: f64, lng: f64) -> UnitElement {
    UnitElement {
        id: id.into(),
        team,
        label: id.to_uppercase(),
        position: LatLng::new(lat, lng),
        creator_id: String::new(),
    }
}

fn move_order(unit_id: &str, team: Team, lat: f64, lng: f64) -> PlayerCommand {
    PlayerCommand::IssueOrder {
        intent: OrderIntent {
            unit_id: unit_id.into(),
            team,
            kind: OrderKind::Move,
            target: OrderTarget::Destination {
                point: LatLng::new(lat, lng),
            },
            priority: 0,
            duration_secs: None,
        },
    }
}

async fn run_demo(base: &ClientConfig) -> anyhow::Result<()> {
    let relay = LocalRelay::new();

    let mut director = Seat::join(&relay, base, "director", Team::Blue, true);
    director
        .until("director online", |v| v.connection == ConnectionState::Connected)
        .await?;
    let mut blue = Seat::join(&relay, base, "alpha", Team::Blue, false);
    director.until("alpha", |v| v.participants.len() == 2).await?;
    let mut red = Seat::join(&relay, base, "bravo", Team::Red, false);
    director.until("bravo", |v| v.participants.len() == 3).await?;
    info!("all participants joined");

    director.send(PlayerCommand::ConfirmSector {
        coordinates: rect(40.40, -3.72, 40.42, -3.68),
    })?;
    director.send(PlayerCommand::ConfirmZone {
        team: Team::Blue,
        coordinates: rect(40.402, -3.718, 40.418, -3.708),
        style: None,
    })?;
    director.send(PlayerCommand::ConfirmZone {
        team: Team::Red,
        coordinates: rect(40.402, -3.692, 40.418, -3.682),
        style: None,
    })?;
    blue.until("deployment", |v| v.phase.subphase == Subphase::Deployment).await?;
    red.until("deployment", |v| v.phase.subphase == Subphase::Deployment).await?;

    blue.send(PlayerCommand::CreateElement {
        element: unit("a1", Team::Blue, 40.41, -3.715),
    })?;
    red.send(PlayerCommand::CreateElement {
        element: unit("b1", Team::Red, 40.41, -3.685),
    })?;
    director.until("units placed", |v| v.board.elements.len() == 2).await?;
    for seat in [&director, &blue, &red] {
        seat.send(PlayerCommand::MarkDeploymentReady)?;
    }
    director
        .until("readiness", |v| v.participants.iter().all(|p| p.is_deployment_ready))
        .await?;
    director.send(PlayerCommand::StartCombat)?;

    // One full rotation: each player moves their unit towards the centre.
    for (seat, id, unit_id, team, lng) in [
        (&mut blue, "alpha", "a1", Team::Blue, -3.705),
        (&mut red, "bravo", "b1", Team::Red, -3.695),
    ] {
        seat.until("own turn", |v| v.active_participant_id.as_deref() == Some(id)).await?;
        seat.send(move_order(unit_id, team, 40.41, lng))?;
        seat.send(PlayerCommand::ConfirmOrders)?;
        let view = seat.until("review", |v| v.phase.subphase == Subphase::Review).await?;
        for entry in &view.execution_log {
            info!(turn = entry.turn_number, team = %entry.team, success = entry.result.success, "{}", entry.result.narrative);
        }
        seat.send(PlayerCommand::FinishReview)?;
    }

    let view = director.until("turn 2", |v| v.phase.turn_number == 2).await?;
    info!(turn = view.phase.turn_number, active = ?view.active_participant_id, "rotation complete");

    director.send(PlayerCommand::EndMatch {
        winner: None,
        reason: "demo finished".into(),
    })?;
    red.until("match end", |v| v.outcome.is_some()).await?;

    let director = director.stop().await?;
    blue.stop().await?;
    red.stop().await?;

    println!("{}", serde_json::to_string_pretty(&director.snapshot())?);
    Ok(())
}

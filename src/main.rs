use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use roadster::config::SimConfig;
use roadster::net;
use roadster::sim::Simulation;
use roadster::state::SharedState;

#[derive(Parser, Debug)]
#[command(name = "roadster-server", about = "Driving simulation WebSocket server")]
struct Args {
    /// JSON config file; missing sections use defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `server.bind`.
    #[arg(long)]
    bind: Option<String>,

    /// Overrides `server.tick_hz`.
    #[arg(long)]
    tick_hz: Option<u32>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> roadster::Result<()> {
    let mut config = match &args.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(hz) = args.tick_hz {
        config.server.tick_hz = hz;
    }
    let tick_hz = config.server.tick_hz.max(1);
    let dt = 1.0 / tick_hz as f32;

    info!("Starting roadster server at {} Hz", tick_hz);

    let listener = net::bind(&config.server.bind).await?;
    let mut sim = Simulation::headless(config)?;
    let state = Arc::new(Mutex::new(SharedState::new()));

    let server = tokio::spawn(net::serve(listener, Arc::clone(&state)));

    let mut ticker = interval(Duration::from_secs_f32(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if server.is_finished() {
            return net::server_exit(server.await).map_err(Into::into);
        }

        ticker.tick().await;

        let mut game = state.lock().await;
        for command in game.drain_commands() {
            sim.apply(command);
        }
        sim.frame(&game.controls(), dt);
        game.tick = sim.tick();
        game.broadcast_snapshot(&sim.snapshot());
    }
}

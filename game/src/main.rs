use std::env;
use std::fs::File;
use std::io::{self, BufReader};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use aero_engine::clock::{FrameClock, frame_interval};
use aerogesture::config::ConfigStore;
use aerogesture::driver::FrameDriver;
use aerogesture::gesture::GestureSignalProcessor;
use aerogesture::gesture_worker::{GestureWorker, LineSource, ScriptedSource, spawn_gesture_worker};
use aerogesture::input::keys_for_name;
use aerogesture::server::{self, ScoreServer};
use aerogesture::state::{GamePhase, GameSnapshot};
use aerogesture::sync::{LeaderboardEntry, ScoreSync};
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(name = "aerogesture")]
#[command(about = "Pinch-to-flap arcade game with an online leaderboard")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Play one headless run driven by a recorded gesture trace.
    Play(PlayArgs),
    /// Run the local scoring service until Ctrl-C.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Debug, Args)]
struct PlayArgs {
    #[arg(long)]
    name: String,
    /// One pinch distance per line (`-` for no hand). Use `-` to read stdin.
    #[arg(long)]
    trace: Option<PathBuf>,
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Stop after this many frames even if the run is still going.
    #[arg(long)]
    frames: Option<usize>,
    #[arg(long)]
    fps: Option<u32>,
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct PlayReport {
    frames: usize,
    flaps: usize,
    avg_step_us: u128,
    snapshot: GameSnapshot,
    leaderboard: Vec<LeaderboardEntry>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Play(args) => cmd_play(args),
        Commands::Serve { port } => cmd_serve(port),
    }
}

fn open_trace(trace: Option<&PathBuf>, pace: Duration) -> Result<TraceSource> {
    let Some(path) = trace else {
        return Ok(TraceSource::Empty(ScriptedSource::default()));
    };
    if path.as_os_str() == "-" {
        let source = LineSource::new(BufReader::new(io::stdin())).with_interval(pace);
        return Ok(TraceSource::Stdin(source));
    }
    let file = File::open(path).with_context(|| format!("open trace {}", path.display()))?;
    Ok(TraceSource::File(
        LineSource::new(BufReader::new(file)).with_interval(pace),
    ))
}

enum TraceSource {
    Empty(ScriptedSource),
    Stdin(LineSource<BufReader<io::Stdin>>),
    File(LineSource<BufReader<File>>),
}

impl TraceSource {
    fn spawn(
        self,
        processor: GestureSignalProcessor,
        driver: &FrameDriver,
    ) -> io::Result<GestureWorker> {
        let flag = driver.flap_flag();
        match self {
            TraceSource::Empty(source) => spawn_gesture_worker(source, processor, flag),
            TraceSource::Stdin(source) => spawn_gesture_worker(source, processor, flag),
            TraceSource::File(source) => spawn_gesture_worker(source, processor, flag),
        }
    }
}

fn cmd_play(args: PlayArgs) -> Result<()> {
    let store = match &args.config {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::from_env(),
    };
    let mut config = store.load().with_env_overrides(|key| env::var(key).ok());
    if let Some(url) = &args.api_url {
        config.network.api_url = Some(url.clone());
        config = config.sanitized();
    }
    if let Some(fps) = args.fps {
        config.frame.target_fps = fps.max(1);
    }
    config.validate().context("invalid configuration")?;

    let frame_dt = frame_interval(config.frame.target_fps);
    let timeout = config.network.timeout;
    let processor = GestureSignalProcessor::new(config.gesture)?;
    let sync = ScoreSync::new(&config.network).context("start score sync")?;
    let mut clock = FrameClock::new(config.frame.max_dt);
    let mut driver = FrameDriver::new(config, args.seed, sync)?;

    let keys = driver.key_events(&keys_for_name(&args.name));
    driver.tick(Duration::ZERO, keys);
    if driver.context().phase() != GamePhase::Playing {
        bail!("name {:?} was not accepted", args.name);
    }

    let worker = open_trace(args.trace.as_ref(), frame_dt)?
        .spawn(processor, &driver)
        .context("spawn gesture worker")?;

    clock.tick(Instant::now());
    loop {
        thread::sleep(frame_dt);
        driver.tick(clock.tick(Instant::now()), Vec::new());

        if driver.context().phase() == GamePhase::GameOver && worker.is_finished() {
            break;
        }
        if args.frames.is_some_and(|cap| driver.frame() >= cap) {
            log::info!("frame cap reached");
            break;
        }
    }

    let flaps = worker.flaps();
    worker.stop();
    // The game-over fetch races the score submit; ask again once both have landed.
    driver.sync().wait_idle(timeout * 2);
    driver.refresh_leaderboard();
    if !driver.sync().wait_idle(timeout * 2) {
        log::warn!("scoring service calls still pending at exit");
    }

    let report = PlayReport {
        frames: driver.frame(),
        flaps,
        avg_step_us: driver.stats().average().as_micros(),
        snapshot: driver.context().snapshot(),
        leaderboard: driver.leaderboard(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_serve(port: Option<u16>) -> Result<()> {
    let addr = match port {
        Some(port) => SocketAddr::from(([127, 0, 0, 1], port)),
        None => server::resolve_server_addr(server::DEFAULT_PORT, |key| env::var(key).ok()),
    };
    let mut server = ScoreServer::start(addr).with_context(|| format!("bind {addr}"))?;
    println!("scoring service on {}", server.base_url());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(tokio::signal::ctrl_c())?;

    log::info!("shutting down");
    server.shutdown();
    Ok(())
}

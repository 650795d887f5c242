//! flipdisc-server binary
//!
//! Loads the TOML config, validates the panel topology, connects the serial
//! link and runs the engine, ingest and status tasks on one embassy executor.
//! Input is a stream of back-to-back RBM messages read from a file or stdin.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::thread;
use std::time::Duration as StdDuration;

use anyhow::{anyhow, Context};
use clap::Parser;
use embassy_executor::Spawner;
use embassy_sync::channel::TrySendError;
use embassy_time::Duration;
use log::{error, info, warn};
use static_cell::StaticCell;

use flipdisc_core::{create_test_pattern, Frame, PanelMapper, TestPattern};
use flipdisc_server::channels::{IngestChunk, IngestEvent, INGEST_CHANNEL, INGEST_CHUNK_SIZE};
use flipdisc_server::config::log_config_summary;
use flipdisc_server::link::build_link;
use flipdisc_server::tasks::{self, IngestTaskConfig};
use flipdisc_server::{
    DynLink, Engine, EngineMetrics, Ingest, ServerConfig, ServerError, SharedFrameBuffer, Transport,
};

/// Drive a flip-disc panel matrix over RS-485
#[derive(Parser, Debug)]
#[command(name = "flipdisc-server", version, about)]
struct Args {
    /// TOML configuration file; a single 28x7 panel is assumed without one
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the in-memory link instead of the serial device
    #[arg(long)]
    mock: bool,

    /// RBM stream to display, `-` for stdin
    #[arg(short, long)]
    input: Option<String>,

    /// Show a diagnostic pattern (checkerboard, border, solid, clear)
    #[arg(long)]
    pattern: Option<String>,

    /// Exit once the input ends and the buffer has played out
    #[arg(long)]
    exit_at_end: bool,

    /// Drop a partial input message after this much silence
    #[arg(long, default_value_t = 250)]
    read_timeout_ms: u64,
}

static BUFFER: StaticCell<SharedFrameBuffer> = StaticCell::new();
static TRANSPORT: StaticCell<Transport<DynLink>> = StaticCell::new();
static METRICS: StaticCell<EngineMetrics> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = start(spawner).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn start(spawner: Spawner) -> anyhow::Result<()> {
    let args = Args::parse();
    info!("flipdisc-server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .map_err(ServerError::from)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            warn!("No config file given, using a single 28x7 panel");
            ServerConfig::default()
        }
    };
    if args.mock {
        config.serial.mock = true;
    }

    let topology = config.topology().context("building topology")?;
    log_config_summary(&config, &topology);
    let canvas = topology.canvas();

    let buffer: &'static SharedFrameBuffer =
        BUFFER.init(SharedFrameBuffer::new(config.buffer_config()?));
    let transport: &'static Transport<DynLink> = TRANSPORT.init(Transport::new(
        build_link(&config.serial),
        config.serial_settings()?,
        config.interpanel_delay(),
    ));
    let metrics: &'static EngineMetrics = METRICS.init(EngineMetrics::new());

    transport.connect().await.context("opening serial link")?;

    if let Some(name) = &args.pattern {
        let pattern: TestPattern = name
            .parse()
            .map_err(|_| anyhow!("unknown pattern '{}'", name))?;
        let frame = Frame::new(0, create_test_pattern(canvas.width, canvas.height, pattern));
        buffer.with(|fb| fb.submit(frame));
        info!("Showing {:?} pattern", pattern);
    }

    let engine = Engine::new(
        buffer,
        transport,
        metrics,
        PanelMapper::new(topology),
        config.frame_gap(),
    );
    spawner
        .spawn(tasks::engine_task(engine))
        .map_err(|_| ServerError::Spawn("engine"))?;

    if let Some(period) = config.status_interval() {
        spawner
            .spawn(tasks::status_task(buffer, transport, metrics, period))
            .map_err(|_| ServerError::Spawn("status"))?;
    }

    if let Some(input) = args.input {
        let ingest_config = IngestTaskConfig {
            read_timeout: Duration::from_millis(args.read_timeout_ms),
            stop_at_end: args.exit_at_end,
        };
        spawner
            .spawn(tasks::ingest_task(buffer, Ingest::new(buffer, canvas), ingest_config))
            .map_err(|_| ServerError::Spawn("ingest"))?;
        let reader = open_input(&input).map_err(ServerError::from)?;
        thread::Builder::new()
            .name(String::from("input"))
            .spawn(move || read_input(reader))
            .context("starting input reader")?;
        info!("Reading frames from {}", input);
    }

    info!("All tasks spawned, server running");
    Ok(())
}

fn open_input(input: &str) -> io::Result<Box<dyn Read + Send>> {
    if input == "-" {
        Ok(Box::new(io::stdin()))
    } else {
        Ok(Box::new(File::open(input)?))
    }
}

/// Blocking reader: forwards input to the ingest channel in chunks
fn read_input(mut reader: Box<dyn Read + Send>) {
    let mut buf = [0u8; INGEST_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Input read failed: {}", e);
                break;
            }
        };
        let mut chunk = IngestChunk::new();
        // n never exceeds the chunk capacity
        let _ = chunk.extend_from_slice(&buf[..n]);
        send(IngestEvent::Data(chunk));
    }
    send(IngestEvent::End);
}

fn send(mut event: IngestEvent) {
    // Wait for the ingest task rather than dropping input
    while let Err(TrySendError::Full(back)) = INGEST_CHANNEL.try_send(event) {
        event = back;
        thread::sleep(StdDuration::from_millis(1));
    }
}

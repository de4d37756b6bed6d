use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use imu_replay::{
    Encoding, PacingMode, Reassembler, Reassembly, Replay, ReplayConfig, TcpReceiver, TcpTransport,
};

#[derive(Debug, Parser)]
#[command(name = "imu-replay", version, about = "Replay recorded IMU samples over a paced, fragmenting link")]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve a recording to one TCP peer
    Stream(StreamArgs),
    /// Connect to a running stream, reassemble and log packets
    Receive(ReceiveArgs),
}

#[derive(Debug, Args)]
struct StreamArgs {
    /// CSV recording to replay
    #[arg(long)]
    csv: PathBuf,

    /// YAML configuration; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "127.0.0.1:7878")]
    listen: String,

    #[arg(long)]
    service_uuid: Option<Uuid>,

    #[arg(long)]
    characteristic_uuid: Option<Uuid>,

    /// Seconds between packets
    #[arg(long)]
    interval: Option<f64>,

    /// Payload bytes per fragment
    #[arg(long)]
    mtu: Option<usize>,

    /// Readings per packet
    #[arg(long)]
    batch_size: Option<usize>,

    /// Stop at end of input instead of looping
    #[arg(long)]
    once: bool,

    /// Pace packets by the recorded timestamps
    #[arg(long)]
    realistic_pacing: bool,

    #[arg(long)]
    encoding: Option<Encoding>,

    /// End the session when the peer disconnects
    #[arg(long)]
    stop_on_disconnect: bool,
}

#[derive(Debug, Args)]
struct ReceiveArgs {
    #[arg(long, default_value = "127.0.0.1:7878")]
    connect: String,

    /// Largest payload accepted per fragment
    #[arg(long)]
    mtu: Option<usize>,

    #[arg(long, default_value_t = Encoding::Wire)]
    encoding: Encoding,

    /// Sender's packet interval in seconds; partial packets expire after three intervals
    #[arg(long, default_value_t = 0.05)]
    interval: f64,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn seconds(value: f64, flag: &str) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("invalid --{} value {}", flag, value))
}

fn stream_config(args: &StreamArgs) -> anyhow::Result<ReplayConfig> {
    let mut config = match &args.config {
        Some(path) => ReplayConfig::from_yaml_file(path)?,
        None => ReplayConfig::default(),
    };

    if let Some(mtu) = args.mtu {
        config.mtu = mtu;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(encoding) = args.encoding {
        config.encoding = encoding;
    }
    if let Some(service_id) = args.service_uuid {
        config.endpoint.service_id = service_id;
    }
    if let Some(characteristic_id) = args.characteristic_uuid {
        config.endpoint.characteristic_id = characteristic_id;
    }
    if args.once {
        config.loop_playback = false;
    }
    if args.stop_on_disconnect {
        config.stop_on_disconnect = true;
    }

    let interval = match args.interval {
        Some(value) => seconds(value, "interval")?,
        None => config.pacing.base_interval(),
    };
    config.pacing = if args.realistic_pacing || config.pacing.is_realistic() {
        match config.pacing {
            PacingMode::Timestamp { tick_us, max_delay_ms, .. } => PacingMode::Timestamp {
                tick_us,
                max_delay_ms,
                fallback_ms: interval.as_millis() as u64,
            },
            PacingMode::Fixed { .. } => PacingMode::realistic(interval),
        }
    } else {
        PacingMode::fixed(interval)
    };

    config.validate()?;
    Ok(config)
}

async fn stream(args: StreamArgs) -> anyhow::Result<ExitCode> {
    let config = stream_config(&args)?;
    let transport = TcpTransport::new(args.listen.clone());
    let scheduler = Replay::open(&args.csv, config, transport)
        .with_context(|| format!("cannot replay {}", args.csv.display()))?;

    let (handle, mut task) = scheduler.spawn();
    let report = tokio::select! {
        report = &mut task => report?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, finishing current packet");
            handle.stop();
            task.await?
        }
    };

    let stats = &report.stats;
    info!(
        packets = stats.packets_sent,
        fragments = stats.fragments_sent,
        dropped = stats.fragments_dropped,
        skipped_packets = stats.packets_skipped,
        abandoned = stats.packets_abandoned,
        skipped_rows = stats.rows_skipped,
        cycles = stats.completed_cycles,
        connections = stats.connections,
        "Replay finished"
    );

    match report.last_error {
        Some(e) => {
            error!(packet_id = ?report.failed_packet_id, "{}", e);
            for suggestion in e.recovery_suggestions() {
                info!("  - {}", suggestion);
            }
            Ok(ExitCode::FAILURE)
        }
        None => Ok(ExitCode::SUCCESS),
    }
}

async fn receive(args: ReceiveArgs) -> anyhow::Result<ExitCode> {
    let interval = seconds(args.interval, "interval")?;
    if interval.is_zero() {
        bail!("--interval must be greater than zero");
    }

    let mut receiver = TcpReceiver::connect(&args.connect).await?;
    info!(
        service = %receiver.endpoint().service_id,
        characteristic = %receiver.endpoint().characteristic_id,
        "Connected to {}",
        args.connect
    );

    let mut reassembler = Reassembler::new(interval * 3);
    if let Some(mtu) = args.mtu {
        reassembler = reassembler.with_max_payload(mtu);
    }
    let encoder = args.encoding.encoder();

    loop {
        let fragment = tokio::select! {
            fragment = receiver.next_fragment() => fragment?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(bytes) = fragment else {
            info!("Sender closed the connection");
            break;
        };

        if let Some(timeout) = reassembler.expire() {
            warn!("{}", timeout);
        }

        match reassembler.push_bytes(&bytes) {
            Ok(Reassembly::Complete(buffer)) => match encoder.decode(&buffer) {
                Ok(packet) => {
                    let first = packet.readings.first().map(|r| r.timestamp_count);
                    info!(
                        packet_id = packet.packet_id,
                        readings = packet.readings.len(),
                        bytes = buffer.len(),
                        first_timestamp = ?first,
                        "Packet received"
                    );
                    debug!(?packet, "Decoded packet");
                }
                Err(e) => warn!("{}", e),
            },
            Ok(Reassembly::Incomplete { packet_id, received, total }) => {
                trace!(packet_id, received, total, "Partial packet");
            }
            Err(e) => warn!("Rejected fragment: {}", e),
        }
    }

    let stats = reassembler.stats();
    info!(
        completed = stats.completed,
        dropped = stats.dropped,
        timed_out = stats.timed_out,
        duplicates = stats.duplicates,
        "Receiver finished"
    );
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Command::Stream(args) => stream(args).await,
        Command::Receive(args) => receive(args).await,
    }
}

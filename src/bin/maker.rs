//! Live decision-core runner.
//!
//! Wires the UDP market-data feed into the normalizer and event queue,
//! drives the engine serially, and pushes order commands back out over UDP
//! to the executor. Ctrl-C closes the queue, drains it, and (by default)
//! flattens.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::Parser;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{error, info, warn};

use index_maker::{
    encode_wire, init_logging, EventQueue, IngressNormalizer, LogConfig, LogFormat, MakerConfig,
    MakerEngine, OrderCommand, OrderSink,
};

#[derive(Parser, Debug)]
#[command(name = "maker", about = "Passive market-making decision core")]
struct Args {
    /// JSON config file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address for the market-data feed.
    #[arg(long, default_value = "0.0.0.0")]
    data_host: String,

    /// UDP port for the market-data feed.
    #[arg(long, default_value_t = 5555)]
    data_port: u16,

    /// Executor command host.
    #[arg(long, default_value = "127.0.0.1")]
    cmd_host: String,

    /// Executor command port.
    #[arg(long, default_value_t = 6666)]
    cmd_port: u16,

    /// Minimum spacing between outbound commands, 0 disables.
    #[arg(long, default_value_t = 0)]
    cmd_cooldown_ms: u64,

    /// Event queue capacity before depth shedding kicks in.
    #[arg(long, default_value_t = 4096)]
    queue_capacity: usize,

    /// Emit JSON logs instead of the pretty format.
    #[arg(long)]
    json_logs: bool,

    /// Directory for a rolling daily log file.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Feed staleness threshold for the health report.
    #[arg(long, default_value_t = 5000)]
    heartbeat_timeout_ms: u64,
}

fn wall_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Outbound command transport with an optional pacing cooldown.
struct UdpCommandSink {
    socket: std::net::UdpSocket,
    target: SocketAddr,
    cooldown: Duration,
    last_send: Option<Instant>,
}

impl UdpCommandSink {
    fn new(target: SocketAddr, cooldown: Duration) -> std::io::Result<Self> {
        let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            target,
            cooldown,
            last_send: None,
        })
    }
}

impl OrderSink for UdpCommandSink {
    fn send(&mut self, cmd: &OrderCommand) -> bool {
        if !self.cooldown.is_zero() {
            if let Some(last) = self.last_send {
                if last.elapsed() < self.cooldown {
                    warn!("command paced out by cooldown: {}", encode_wire(cmd));
                    return false;
                }
            }
        }
        let wire = encode_wire(cmd);
        match self.socket.send_to(wire.as_bytes(), self.target) {
            Ok(_) => {
                self.last_send = Some(Instant::now());
                info!(%wire, "command sent");
                true
            }
            Err(err) => {
                error!(%wire, %err, "command send failed");
                false
            }
        }
    }
}

/// Read datagrams, normalize, and push into the queue until shutdown.
async fn ingress_loop(
    socket: UdpSocket,
    queue: Arc<EventQueue>,
    mut shutdown: watch::Receiver<bool>,
    heartbeat_timeout_ms: u64,
) {
    let mut normalizer = IngressNormalizer::new();
    let mut buf = [0u8; 4096];
    let mut health_tick = tokio::time::interval(Duration::from_secs(10));

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = health_tick.tick() => {
                let health = normalizer.health(wall_ms(), heartbeat_timeout_ms);
                info!(
                    status = %health.summary(),
                    frames_ok = normalizer.frames_ok(),
                    malformed = normalizer.malformed_frames(),
                    depth_drops = queue.depth_drops(),
                    "feed health"
                );
            }
            received = socket.recv_from(&mut buf) => {
                let (len, _peer) = match received {
                    Ok(ok) => ok,
                    Err(err) => {
                        warn!(%err, "feed socket error");
                        continue;
                    }
                };
                let now = wall_ms();
                // Datagrams may carry several newline-separated frames.
                for line in String::from_utf8_lossy(&buf[..len]).lines() {
                    if line.is_empty() {
                        continue;
                    }
                    for event in normalizer.on_frame(line, now) {
                        queue.push(event);
                    }
                }
            }
        }
    }
    info!(
        frames_ok = normalizer.frames_ok(),
        malformed = normalizer.malformed_frames(),
        "ingress stopped"
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_config = LogConfig {
        stdout_format: if args.json_logs {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
        log_dir: args.log_dir.clone(),
        ..LogConfig::default()
    };
    let _log_guard = init_logging(&log_config)?;

    let config = match &args.config {
        Some(path) => MakerConfig::from_json_file(path)?,
        None => {
            let cfg = MakerConfig::default();
            cfg.validate()?;
            cfg
        }
    };
    info!(
        tick_size = config.tick_size,
        threshold_ticks = config.base_spread_threshold_ticks,
        warmup = config.warmup_updates,
        "configuration loaded"
    );

    let cmd_target: SocketAddr = format!("{}:{}", args.cmd_host, args.cmd_port).parse()?;
    let sink = UdpCommandSink::new(cmd_target, Duration::from_millis(args.cmd_cooldown_ms))?;
    let mut engine = MakerEngine::new(config, sink)?;

    let queue = Arc::new(EventQueue::new(args.queue_capacity));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let data_addr = format!("{}:{}", args.data_host, args.data_port);
    let socket = UdpSocket::bind(&data_addr).await?;
    info!(%data_addr, cmd = %cmd_target, "listening");

    let ingress = tokio::spawn(ingress_loop(
        socket,
        Arc::clone(&queue),
        shutdown_rx,
        args.heartbeat_timeout_ms,
    ));

    // Ctrl-C stops intake; the engine loop then drains and flattens.
    {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
                queue.close();
            }
        });
    }

    let processed =
        index_maker::runtime::run_engine_loop(&mut engine, &queue, Duration::from_secs(2)).await;

    let counters = engine.counters();
    info!(
        processed,
        placed = counters.orders_placed,
        cancelled = counters.orders_cancelled,
        filled = counters.orders_filled,
        rejections = counters.rejections(),
        "engine stopped"
    );

    ingress.await?;
    Ok(())
}

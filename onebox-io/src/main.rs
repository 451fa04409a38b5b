//! OneBox I/O daemon
//!
//! Opens the endpoint named in the config file and relays its traffic to the
//! log: every received payload is printed in hex, optionally echoed back to
//! its sender, and counters are reported periodically. A configured greeting
//! is sent on open and can be repeated on a timer.

use onebox_io::config::AppConfig;
use onebox_io::counters::EndpointCounters;
use onebox_io::endpoint::{
    Endpoint, EndpointKind, EndpointOptions, SerialPortEndpoint, open_endpoint,
};
use onebox_io::error::{Error, Result};
use onebox_io::events::EndpointEvent;
use onebox_io::hexdump;
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const DEFAULT_CONFIG: &str = "onebox.toml";

/// Poll period of the event loop
const EVENT_WAIT: Duration = Duration::from_millis(100);

/// Parse config path from command line arguments.
///
/// Supports:
/// - `onebox-io <path>` (positional)
/// - `onebox-io --config <path>` (flag-based)
/// - `onebox-io -c <path>` (short flag)
///
/// Defaults to `onebox.toml` if not specified.
fn parse_config_path(args: &[String]) -> String {
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    DEFAULT_CONFIG.to_string()
}

fn load_config(path: &str) -> Result<AppConfig> {
    if Path::new(path).exists() {
        AppConfig::from_file(path)
    } else {
        eprintln!("Config {} not found, using defaults", path);
        Ok(AppConfig::default())
    }
}

fn list_ports() -> Result<()> {
    let ports = SerialPortEndpoint::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--list-ports") {
        return list_ports();
    }

    let config_path = parse_config_path(&args);
    let config = load_config(&config_path)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("OneBox I/O v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", config_path);
    log::info!("Endpoint: {:?}", config.endpoint);

    let greeting = config
        .daemon
        .greeting
        .as_deref()
        .map(hexdump::parse)
        .transpose()?;

    let mut endpoint = open_endpoint(&config.endpoint, EndpointOptions::from_config(&config))?;
    let events = endpoint.events();

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    if let Some(payload) = &greeting {
        let n = send_to_all(endpoint.as_ref(), payload);
        log::info!("Sent greeting to {} destination(s)", n);
    }

    log::info!("OneBox I/O running. Press Ctrl-C to stop.");

    let stats_interval = Duration::from_millis(config.daemon.stats_interval_ms.max(1));
    let mut last_stats = Instant::now();
    let mut last_counters = endpoint.counters();

    let auto_send = greeting
        .filter(|_| config.daemon.auto_send_interval_ms > 0)
        .map(|payload| (payload, Duration::from_millis(config.daemon.auto_send_interval_ms)));
    let mut last_send = Instant::now();

    while running.load(Ordering::Relaxed) {
        if let Ok(event) = events.recv_timeout(EVENT_WAIT) {
            handle_event(endpoint.as_ref(), event, config.daemon.echo);
        }

        if let Some((payload, interval)) = &auto_send
            && last_send.elapsed() >= *interval
        {
            send_to_all(endpoint.as_ref(), payload);
            last_send = Instant::now();
        }

        let elapsed = last_stats.elapsed();
        if elapsed >= stats_interval {
            let c = endpoint.counters();
            log_stats(endpoint.as_ref(), &c, &c.delta_since(&last_counters), elapsed);
            last_counters = c;
            last_stats = Instant::now();
        }
    }

    log::info!("Shutting down...");
    endpoint.close()?;
    log::info!("OneBox I/O stopped");
    Ok(())
}

/// Send `payload` to every connected peer of a server, or to the single
/// destination of a client or serial port. Returns how many sends succeeded.
fn send_to_all(endpoint: &dyn Endpoint, payload: &[u8]) -> usize {
    let targets: Vec<Option<usize>> = match endpoint.kind() {
        EndpointKind::TcpServer | EndpointKind::UdpServer => {
            (0..endpoint.connection_count()).map(Some).collect()
        }
        _ => vec![None],
    };

    let mut delivered = 0;
    for target in targets {
        match endpoint.send(target, payload) {
            Ok(_) => delivered += 1,
            Err(e) => log::warn!("Send to {:?} failed: {}", target, e),
        }
    }
    delivered
}

fn log_stats(
    endpoint: &dyn Endpoint,
    total: &EndpointCounters,
    delta: &EndpointCounters,
    elapsed: Duration,
) {
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    log::info!(
        "{:?} rx {:.1} pkt/s {:.0} B/s, tx {:.1} pkt/s {:.0} B/s | total rx {} pkts / {} B, tx {} pkts / {} B, peers {}",
        endpoint.state(),
        delta.rx_packets as f64 / secs,
        delta.rx_bytes as f64 / secs,
        delta.tx_packets as f64 / secs,
        delta.tx_bytes as f64 / secs,
        total.rx_packets,
        total.rx_bytes,
        total.tx_packets,
        total.tx_bytes,
        endpoint.connection_count()
    );
}

fn handle_event(endpoint: &dyn Endpoint, event: EndpointEvent, echo: bool) {
    match event {
        EndpointEvent::DataReady { peer } => {
            // One notification per buffered frame
            let Some(data) = endpoint.read_pending() else {
                return;
            };
            let from = peer
                .and_then(|i| endpoint.peer_info(i))
                .unwrap_or_else(|| "-".to_string());
            log::info!("RX [{}] {} bytes: {}", from, data.len(), hexdump::encode_spaced(&data));
            if echo && let Err(e) = endpoint.send(peer, &data) {
                log::warn!("Echo to {} failed: {}", from, e);
            }
        }
        EndpointEvent::DataSent { target, data } => {
            let to = target.map_or_else(|| "-".to_string(), |t| t.to_string());
            log::debug!("TX [{}] {}", to, hexdump::encode_spaced(&data));
        }
        EndpointEvent::PeerConnected(peer) => log::info!("Peer connected: {}", peer),
        EndpointEvent::PeerDisconnected(peer) => log::info!("Peer disconnected: {}", peer),
        EndpointEvent::StateChanged(open) => {
            log::info!("Endpoint {}", if open { "open" } else { "closed" })
        }
    }
}

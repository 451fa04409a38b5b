//! Configuration for the OneBox I/O daemon
//!
//! Loads configuration from a TOML file. Every section has defaults, so a file
//! only needs the `[endpoint]` table to be useful.

use crate::buffer::{DEFAULT_FRAME_DEPTH, DEFAULT_FRAME_SIZE, DEFAULT_RING_CAPACITY};
use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::transport::SerialSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub buffer: BufferConfig,
    pub tcp: TcpConfig,
    pub serial: SerialConfig,
    pub liveness: LivenessConfig,
    pub daemon: DaemonConfig,
    pub endpoint: EndpointConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Receive buffer sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Frame slots per TCP/UDP endpoint
    pub frame_depth: usize,
    /// Bytes per frame slot; longer reads are truncated
    pub frame_size: usize,
    /// Serial receive ring capacity in bytes
    pub ring_capacity: usize,
    /// Notification channel capacity per endpoint
    pub event_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            frame_depth: DEFAULT_FRAME_DEPTH,
            frame_size: DEFAULT_FRAME_SIZE,
            ring_capacity: DEFAULT_RING_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// TCP timeouts
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TcpConfig {
    pub connect_timeout_ms: u64,
    /// Upper bound on waiting for a graceful teardown before forcing it
    pub disconnect_timeout_ms: u64,
    /// A send fails once the peer stops draining for this long
    pub write_timeout_ms: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 1000,
            disconnect_timeout_ms: 1000,
            write_timeout_ms: 1000,
        }
    }
}

/// Serial polling
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SerialConfig {
    pub poll_interval_ms: u64,
    /// Only report data once this byte ends a message
    pub terminator: Option<u8>,
    /// Only report data once this many bytes are waiting
    pub min_unread: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            terminator: None,
            min_unread: 1,
        }
    }
}

/// UDP server receive-stagnation check
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub enabled: bool,
    pub check_interval_ms: u64,
    /// Consecutive samples without receive growth before a rebind
    pub max_error_count: u32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            check_interval_ms: 500,
            max_error_count: 2,
        }
    }
}

/// Daemon behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Send every received payload straight back to its sender
    pub echo: bool,
    /// How often to log counters
    pub stats_interval_ms: u64,
    /// Hex payload (e.g. `"48 49 0A"`) sent once the endpoint opens
    pub greeting: Option<String>,
    /// Resend the greeting this often; 0 sends it only once
    pub auto_send_interval_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            echo: false,
            stats_interval_ms: 1000,
            greeting: None,
            auto_send_interval_ms: 0,
        }
    }
}

/// Which endpoint the daemon opens
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EndpointConfig {
    TcpServer {
        address: String,
    },
    TcpClient {
        address: String,
    },
    UdpServer {
        address: String,
    },
    UdpClient {
        address: String,
        #[serde(default)]
        target: Option<String>,
    },
    Serial(SerialSettings),
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig::UdpServer {
            address: "0.0.0.0:5000".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use onebox_io::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("onebox.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the endpoints cannot run with
    pub fn validate(&self) -> Result<()> {
        let b = &self.buffer;
        if b.frame_depth == 0 || b.frame_size == 0 || b.ring_capacity == 0 {
            return Err(Error::InvalidParameter(
                "buffer sizes must be non-zero".to_string(),
            ));
        }
        if self.serial.poll_interval_ms == 0 || self.liveness.check_interval_ms == 0 {
            return Err(Error::InvalidParameter(
                "poll and check intervals must be non-zero".to_string(),
            ));
        }
        if self.liveness.max_error_count == 0 {
            return Err(Error::InvalidParameter(
                "liveness.max_error_count must be at least 1".to_string(),
            ));
        }
        if self.tcp.write_timeout_ms == 0 {
            return Err(Error::InvalidParameter(
                "tcp.write_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.serial.min_unread > b.ring_capacity {
            return Err(Error::InvalidParameter(format!(
                "serial.min_unread ({}) exceeds buffer.ring_capacity ({})",
                self.serial.min_unread, b.ring_capacity
            )));
        }
        if self.daemon.auto_send_interval_ms > 0 && self.daemon.greeting.is_none() {
            return Err(Error::InvalidParameter(
                "daemon.auto_send_interval_ms needs a greeting to send".to_string(),
            ));
        }
        Ok(())
    }
}

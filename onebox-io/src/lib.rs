//! OneBox I/O - multi-protocol communication debugging toolbox
//!
//! Opens TCP (server/client), UDP (server/client) and serial endpoints, runs
//! their I/O on dedicated threads and buffers received traffic for a consumer.
//!
//! ## Layout
//!
//! - [`buffer`]: frame queue (TCP/UDP) and byte ring (serial) receive buffers
//! - [`registry`]: peers discovered by server endpoints, addressed by index
//! - [`endpoint`]: the five endpoint kinds behind the [`Endpoint`] trait
//! - [`liveness`]: UDP server receive-stagnation watchdog
//! - [`transport`]: serial port abstraction with a mock for tests

pub mod buffer;
pub mod config;
pub mod counters;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod hexdump;
pub mod liveness;
pub mod registry;
pub mod transport;

// Re-export commonly used types
pub use config::AppConfig;
pub use counters::EndpointCounters;
pub use endpoint::{
    Endpoint, EndpointKind, EndpointOptions, EndpointState, SerialPortEndpoint, TcpClientEndpoint,
    TcpServerEndpoint, UdpClientEndpoint, UdpServerEndpoint, open_endpoint,
};
pub use error::{Error, Result};
pub use events::EndpointEvent;

//! Error types for OneBox I/O

use std::net::SocketAddr;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// OneBox I/O error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Endpoint is not open / bound / connected
    #[error("Endpoint not open")]
    NotOpen,

    /// Peer index does not resolve to a registered peer
    #[error("No peer at index {0}")]
    PeerNotFound(usize),

    /// UDP client has no target address
    #[error("No target address set")]
    NoTarget,

    /// Address string could not be resolved
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Connect or write did not complete in time
    #[error("Timed out talking to {0}")]
    Timeout(SocketAddr),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

//! Integration tests for onebox-io over loopback sockets and a mock serial line
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test integration -- --nocapture
//! ```

mod harness;
mod liveness;
mod serial;
mod tcp;
mod udp;

//! Shared helpers: waiting on endpoint notifications with a deadline

use crossbeam_channel::Receiver;
use onebox_io::EndpointEvent;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(3);

/// Receive events until one matches, failing the test at the deadline
pub fn wait_for<F>(events: &Receiver<EndpointEvent>, mut matches: F) -> EndpointEvent
where
    F: FnMut(&EndpointEvent) -> bool,
{
    let deadline = Instant::now() + WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(event) if matches(&event) => return event,
            Ok(_) => continue,
            Err(_) => panic!("timed out waiting for event"),
        }
    }
}

/// Poll `condition` until it holds or the deadline passes
pub fn eventually<F: FnMut() -> bool>(mut condition: F) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

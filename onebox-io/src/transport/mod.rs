//! Transport layer for serial I/O abstraction

use crate::error::Result;

mod mock;
mod serial;
mod settings;

pub use mock::MockTransport;
pub use serial::{SerialTransport, available_ports};
pub use settings::{DataBits, FlowControl, Parity, SerialSettings, StopBits};

/// Byte-stream device the serial endpoint polls
pub trait Transport: Send {
    /// Read whatever is available into `buffer` without waiting.
    ///
    /// Returns 0 when nothing is pending.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;
    fn set_parity(&mut self, parity: Parity) -> Result<()>;
    fn set_data_bits(&mut self, data_bits: DataBits) -> Result<()>;
    fn set_stop_bits(&mut self, stop_bits: StopBits) -> Result<()>;
    fn set_flow_control(&mut self, flow_control: FlowControl) -> Result<()>;
}

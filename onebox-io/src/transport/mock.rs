//! Mock transport for testing

use super::{DataBits, FlowControl, Parity, SerialSettings, StopBits, Transport};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// In-memory serial line. Clones share state, so a test keeps one handle
/// while the endpoint owns the other.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    settings: SerialSettings,
    fail_writes: bool,
}

impl MockTransport {
    pub fn new(settings: SerialSettings) -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                read_buffer: VecDeque::new(),
                write_buffer: Vec::new(),
                settings,
                fail_writes: false,
            })),
        }
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Get all written data
    pub fn get_written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Line settings as last applied through the `Transport` setters
    pub fn settings(&self) -> SerialSettings {
        self.inner.lock().settings.clone()
    }

    /// Make subsequent writes fail with a broken-pipe error
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        let available = inner.read_buffer.len().min(buffer.len());
        for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..available)) {
            *slot = byte;
        }
        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(Error::Io(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            )));
        }
        inner.write_buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.inner.lock().settings.baud_rate = baud_rate;
        Ok(())
    }

    fn set_parity(&mut self, parity: Parity) -> Result<()> {
        self.inner.lock().settings.parity = parity;
        Ok(())
    }

    fn set_data_bits(&mut self, data_bits: DataBits) -> Result<()> {
        self.inner.lock().settings.data_bits = data_bits;
        Ok(())
    }

    fn set_stop_bits(&mut self, stop_bits: StopBits) -> Result<()> {
        self.inner.lock().settings.stop_bits = stop_bits;
        Ok(())
    }

    fn set_flow_control(&mut self, flow_control: FlowControl) -> Result<()> {
        self.inner.lock().settings.flow_control = flow_control;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_between_clones() {
        let handle = MockTransport::new(SerialSettings::new("mock", 9600));
        let mut transport = handle.clone();

        handle.inject_read(b"abc");
        let mut buf = [0u8; 2];
        assert_eq!(transport.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"ab");
        assert_eq!(transport.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'c');

        transport.write(b"xyz").unwrap();
        assert_eq!(handle.get_written(), b"xyz");

        transport.set_baud_rate(19200).unwrap();
        assert_eq!(handle.settings().baud_rate, 19200);
    }

    #[test]
    fn test_fail_writes() {
        let handle = MockTransport::new(SerialSettings::new("mock", 9600));
        let mut transport = handle.clone();
        handle.fail_writes(true);
        assert!(transport.write(b"x").is_err());
        assert!(handle.get_written().is_empty());
    }
}

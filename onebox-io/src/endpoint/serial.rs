//! Serial port endpoint
//!
//! A poll thread wakes every `poll_interval`, drains whatever the port has and
//! appends it to a byte ring. Line parameters can change while the port is
//! open; the poll thread and the consumer share the transport behind a mutex.

use super::shared::Shared;
use super::{Endpoint, EndpointKind, EndpointOptions, EndpointState, join_within};
use crate::buffer::ByteRing;
use crate::counters::EndpointCounters;
use crate::error::{Error, Result};
use crate::events::EndpointEvent;
use crate::transport::{
    DataBits, FlowControl, Parity, SerialSettings, SerialTransport, StopBits, Transport,
};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// Bytes pulled from the port per read call
const READ_CHUNK: usize = 1024;

type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

struct OpenPort {
    transport: SharedTransport,
    running: Arc<AtomicBool>,
    poller: Option<JoinHandle<()>>,
}

pub struct SerialPortEndpoint {
    options: EndpointOptions,
    settings: SerialSettings,
    shared: Arc<Shared<ByteRing>>,
    port: Option<OpenPort>,
}

impl SerialPortEndpoint {
    pub fn new(settings: SerialSettings, options: EndpointOptions) -> Self {
        let mut ring = ByteRing::new(options.ring_capacity);
        ring.set_min_unread(options.min_unread);
        if let Some(terminator) = options.terminator {
            ring.set_terminator(terminator);
        }
        let shared = Shared::new(ring, options.event_capacity);
        Self {
            options,
            settings,
            shared: Arc::new(shared),
            port: None,
        }
    }

    /// Open the hardware port named by the stored settings
    pub fn open(&mut self) -> Result<()> {
        self.close()?;
        let transport = SerialTransport::open(&self.settings)?;
        self.start(Box::new(transport))
    }

    /// Run over an already-open transport (e.g. a [`crate::transport::MockTransport`])
    pub fn open_with(&mut self, transport: Box<dyn Transport>) -> Result<()> {
        self.close()?;
        self.start(transport)
    }

    fn start(&mut self, transport: Box<dyn Transport>) -> Result<()> {
        let transport: SharedTransport = Arc::new(Mutex::new(transport));
        let running = Arc::new(AtomicBool::new(true));

        let poller = {
            let transport = Arc::clone(&transport);
            let shared = Arc::clone(&self.shared);
            let running = Arc::clone(&running);
            let interval = self.options.poll_interval;
            let port_name = self.settings.port.clone();
            thread::Builder::new()
                .name("serial-poll".to_string())
                .spawn(move || {
                    let mut buf = vec![0u8; READ_CHUNK];
                    while running.load(Ordering::Relaxed) {
                        poll_once(&transport, &shared, &mut buf, &port_name);
                        thread::sleep(interval);
                    }
                })
                .map_err(|e| Error::Other(format!("Failed to spawn serial poller: {}", e)))?
        };

        self.port = Some(OpenPort {
            transport,
            running,
            poller: Some(poller),
        });
        log::info!("Serial port {} open", self.settings.port);
        self.shared.emit(EndpointEvent::StateChanged(true));
        Ok(())
    }

    /// Current line settings
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    /// Replace the stored settings; applied on the next `open`
    pub fn set_settings(&mut self, settings: SerialSettings) {
        self.settings = settings;
    }

    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.with_transport(|t| t.set_baud_rate(baud_rate))?;
        self.settings.baud_rate = baud_rate;
        Ok(())
    }

    pub fn set_parity(&mut self, parity: Parity) -> Result<()> {
        self.with_transport(|t| t.set_parity(parity))?;
        self.settings.parity = parity;
        Ok(())
    }

    pub fn set_data_bits(&mut self, data_bits: DataBits) -> Result<()> {
        self.with_transport(|t| t.set_data_bits(data_bits))?;
        self.settings.data_bits = data_bits;
        Ok(())
    }

    pub fn set_stop_bits(&mut self, stop_bits: StopBits) -> Result<()> {
        self.with_transport(|t| t.set_stop_bits(stop_bits))?;
        self.settings.stop_bits = stop_bits;
        Ok(())
    }

    pub fn set_flow_control(&mut self, flow_control: FlowControl) -> Result<()> {
        self.with_transport(|t| t.set_flow_control(flow_control))?;
        self.settings.flow_control = flow_control;
        Ok(())
    }

    /// Hold received data back until this byte ends it
    pub fn set_terminator(&self, terminator: Option<u8>) {
        let mut inner = self.shared.lock();
        match terminator {
            Some(byte) => inner.buffer.set_terminator(byte),
            None => inner.buffer.clear_terminator(),
        }
    }

    /// Hold received data back until at least `min` bytes are waiting
    pub fn set_min_unread(&self, min: usize) {
        self.shared.lock().buffer.set_min_unread(min);
    }

    /// Apply to the live port if open; a closed port only stores the value
    fn with_transport<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Transport) -> Result<()>,
    {
        match &self.port {
            Some(port) => apply(port.transport.lock().as_mut()),
            None => Ok(()),
        }
    }

    /// Serial port names present on this machine
    pub fn available_ports() -> Result<Vec<String>> {
        crate::transport::available_ports()
    }
}

fn poll_once(transport: &SharedTransport, shared: &Shared<ByteRing>, buf: &mut [u8], port: &str) {
    let mut received = 0;
    loop {
        // Lock per read so reconfiguration and writes interleave with polling
        let result = transport.lock().read(buf);
        match result {
            Ok(0) => break,
            Ok(n) => {
                shared.store_rx(&buf[..n]);
                received += n;
                if n < buf.len() {
                    break;
                }
            }
            Err(e) => {
                log::warn!("Serial read error on {}: {}", port, e);
                break;
            }
        }
    }
    if received > 0 {
        log::trace!("Serial rx {} bytes on {}", received, port);
        shared.emit(EndpointEvent::DataReady { peer: None });
    }
}

impl Endpoint for SerialPortEndpoint {
    fn kind(&self) -> EndpointKind {
        EndpointKind::Serial
    }

    fn state(&self) -> EndpointState {
        if self.port.is_some() {
            EndpointState::Open
        } else {
            EndpointState::Closed
        }
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut port) = self.port.take() else {
            return Ok(());
        };
        port.running.store(false, Ordering::Relaxed);
        if let Some(poller) = port.poller.take()
            && join_within(poller, self.options.poll_interval * 4).is_some()
        {
            log::warn!("Serial poller on {} did not stop in time", self.settings.port);
        }
        log::info!("Serial port {} closed", self.settings.port);
        self.shared.emit(EndpointEvent::StateChanged(false));
        Ok(())
    }

    fn send(&self, _peer: Option<usize>, data: &[u8]) -> Result<usize> {
        let port = self.port.as_ref().ok_or(Error::NotOpen)?;
        if data.is_empty() {
            return Ok(0);
        }
        let written = {
            let mut transport = port.transport.lock();
            let written = transport.write(data)?;
            transport.flush()?;
            written
        };
        log::trace!("Serial tx {} bytes on {}", written, self.settings.port);
        self.shared.sent(None, &data[..written]);
        Ok(written)
    }

    fn read_pending(&self) -> Option<Vec<u8>> {
        self.shared.take_pending()
    }

    fn counters(&self) -> EndpointCounters {
        self.shared.counters()
    }

    fn reset_counters(&self) {
        self.shared.reset_counters();
    }

    fn connection_count(&self) -> usize {
        usize::from(self.port.is_some())
    }

    fn peer_info(&self, index: usize) -> Option<String> {
        (index == 0 && self.port.is_some()).then(|| self.settings.port.clone())
    }

    fn events(&self) -> Receiver<EndpointEvent> {
        self.shared.subscribe()
    }
}

impl Drop for SerialPortEndpoint {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::time::Duration;

    fn options() -> EndpointOptions {
        EndpointOptions {
            poll_interval: Duration::from_millis(5),
            ..EndpointOptions::default()
        }
    }

    #[test]
    fn test_setters_while_closed_only_store() {
        let mut port = SerialPortEndpoint::new(SerialSettings::new("mock", 9600), options());
        port.set_baud_rate(57600).unwrap();
        port.set_parity(Parity::Odd).unwrap();
        assert_eq!(port.settings().baud_rate, 57600);
        assert_eq!(port.settings().parity, Parity::Odd);
        assert!(!port.is_open());
    }

    #[test]
    fn test_setters_while_open_reach_transport() {
        let settings = SerialSettings::new("mock", 9600);
        let mock = MockTransport::new(settings.clone());
        let mut port = SerialPortEndpoint::new(settings, options());
        port.open_with(Box::new(mock.clone())).unwrap();

        port.set_stop_bits(StopBits::Two).unwrap();
        port.set_flow_control(FlowControl::Software).unwrap();
        assert_eq!(mock.settings().stop_bits, StopBits::Two);
        assert_eq!(mock.settings().flow_control, FlowControl::Software);
        port.close().unwrap();
    }

    #[test]
    fn test_send_writes_to_transport() {
        let settings = SerialSettings::new("mock", 9600);
        let mock = MockTransport::new(settings.clone());
        let mut port = SerialPortEndpoint::new(settings, options());
        assert!(matches!(port.send(None, b"AT"), Err(Error::NotOpen)));

        port.open_with(Box::new(mock.clone())).unwrap();
        assert_eq!(port.send(None, b"AT\r\n").unwrap(), 4);
        assert_eq!(mock.get_written(), b"AT\r\n");
        assert_eq!(port.counters().tx_packets, 1);

        mock.fail_writes(true);
        assert!(port.send(None, b"x").is_err());
        assert_eq!(port.counters().tx_packets, 1);
    }

    #[test]
    fn test_peer_info_names_port() {
        let settings = SerialSettings::new("/dev/ttyMOCK", 9600);
        let mut port = SerialPortEndpoint::new(settings.clone(), options());
        assert_eq!(port.peer_info(0), None);
        port.open_with(Box::new(MockTransport::new(settings))).unwrap();
        assert_eq!(port.peer_info(0), Some("/dev/ttyMOCK".to_string()));
        assert_eq!(port.connection_count(), 1);
    }
}

//! Serial transport implementation

use super::{DataBits, FlowControl, Parity, SerialSettings, StopBits, Transport};
use crate::error::Result;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;

/// Read timeout short enough that a poll tick never stalls on an idle line
const READ_TIMEOUT: Duration = Duration::from_micros(100);

/// Serial transport for UART communication
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port with the given line settings
    pub fn open(settings: &SerialSettings) -> Result<Self> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .data_bits(settings.data_bits.into())
            .parity(settings.parity.into())
            .stop_bits(settings.stop_bits.into())
            .flow_control(settings.flow_control.into())
            .timeout(READ_TIMEOUT)
            .open()?;

        log::info!(
            "Opened serial port: {} at {} baud ({:?}/{:?}/{:?}, flow {:?})",
            settings.port,
            settings.baud_rate,
            settings.data_bits,
            settings.parity,
            settings.stop_bits,
            settings.flow_control
        );

        Ok(SerialTransport { port })
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.port.write(data)?)
    }

    fn flush(&mut self) -> Result<()> {
        self.port.flush()?;
        Ok(())
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.port.set_baud_rate(baud_rate)?;
        log::debug!("Serial baud rate -> {}", baud_rate);
        Ok(())
    }

    fn set_parity(&mut self, parity: Parity) -> Result<()> {
        self.port.set_parity(parity.into())?;
        log::debug!("Serial parity -> {:?}", parity);
        Ok(())
    }

    fn set_data_bits(&mut self, data_bits: DataBits) -> Result<()> {
        self.port.set_data_bits(data_bits.into())?;
        log::debug!("Serial data bits -> {:?}", data_bits);
        Ok(())
    }

    fn set_stop_bits(&mut self, stop_bits: StopBits) -> Result<()> {
        self.port.set_stop_bits(stop_bits.into())?;
        log::debug!("Serial stop bits -> {:?}", stop_bits);
        Ok(())
    }

    fn set_flow_control(&mut self, flow_control: FlowControl) -> Result<()> {
        self.port.set_flow_control(flow_control.into())?;
        log::debug!("Serial flow control -> {:?}", flow_control);
        Ok(())
    }
}

/// Names of the serial ports present on this machine
pub fn available_ports() -> Result<Vec<String>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}

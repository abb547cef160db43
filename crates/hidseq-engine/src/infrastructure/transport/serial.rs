//! Serial-port transport to the HID emulator.

use std::io::Write;
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info};

use crate::application::device::{Transport, TransportError};

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub timeout: Duration,
}

/// [`Transport`] over a serial port.
pub struct SerialTransport {
    settings: SerialSettings,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Creates a closed transport; call [`Transport::open`] to connect.
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            port: None,
        }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let port = serialport::new(&self.settings.port, self.settings.baud_rate)
            .timeout(self.settings.timeout)
            .open()
            .map_err(|e| TransportError::Open {
                port: self.settings.port.clone(),
                reason: e.to_string(),
            })?;
        info!(
            port = %self.settings.port,
            baud = self.settings.baud_rate,
            "serial port opened"
        );
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(port = %self.settings.port, "serial port closed");
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotOpen)?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

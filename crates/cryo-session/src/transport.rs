//! Line-oriented transport to the controller
//!
//! The session only needs a blocking `query(text) -> text` primitive plus
//! open/close. [`SerialTransport`] provides it over a serial port; the
//! `cryo-sim` crate provides an in-memory implementation.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, trace, warn};

use crate::error::TransportError;

/// Blocking command/reply channel to a controller
pub trait Transport {
    /// Open the underlying connection
    fn open(&mut self) -> Result<(), TransportError>;

    /// Close the underlying connection
    fn close(&mut self) -> Result<(), TransportError>;

    /// Whether the connection is currently open
    fn is_open(&self) -> bool;

    /// Send a command line and return the reply line (terminator removed)
    fn query(&mut self, command: &str) -> Result<String, TransportError>;

    /// Send a command line that produces no reply
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        self.query(command).map(|_| ())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        (**self).query(command)
    }

    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        (**self).write(command)
    }
}

/// Serial transport configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportConfig {
    /// Serial port path
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
    /// Reply timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    /// Line terminator for commands and replies
    #[serde(default = "default_termination")]
    pub termination: String,
}

fn default_baud() -> u32 {
    9600
}

fn default_timeout_secs() -> f64 {
    10.0
}

fn default_termination() -> String {
    cryo_protocol::TERMINATOR.to_string()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud(),
            timeout_secs: default_timeout_secs(),
            termination: default_termination(),
        }
    }
}

impl TransportConfig {
    /// Create a configuration for a port with default settings
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    /// Reply timeout, converted from seconds at millisecond resolution
    pub fn timeout(&self) -> Duration {
        if !self.timeout_secs.is_finite() || self.timeout_secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_millis((self.timeout_secs * 1000.0).round() as u64)
    }
}

/// Poll interval for individual serial reads
const READ_POLL: Duration = Duration::from_millis(50);

/// Transport over a physical serial port
pub struct SerialTransport {
    config: TransportConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Create a closed transport for the given configuration
    pub fn new(config: TransportConfig) -> Self {
        Self { config, port: None }
    }

    /// Configuration this transport was created with
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::NotOpen)
    }

    fn send_line(&mut self, command: &str) -> Result<(), TransportError> {
        let line = format!("{}{}", command, self.config.termination);
        trace!("Sending to {}: '{}'", self.config.port, line.escape_default());

        let port = self.port_mut()?;
        // Drop anything unsolicited left over from an earlier exchange
        if let Err(e) = port.clear(ClearBuffer::Input) {
            warn!("Failed to clear input buffer: {}", e);
        }
        port.write_all(line.as_bytes())?;
        port.flush()?;
        Ok(())
    }

    fn read_line(&mut self, command: &str) -> Result<String, TransportError> {
        let timeout = self.config.timeout();
        let termination = self.config.termination.clone();
        let port_name = self.config.port.clone();
        let port = self.port_mut()?;

        let mut buffer = [0u8; 256];
        let mut response: Vec<u8> = Vec::new();
        let start = Instant::now();

        loop {
            if let Some(end) = find_terminator(&response, termination.as_bytes()) {
                let line = String::from_utf8_lossy(&response[..end]).into_owned();
                trace!("Received from {}: '{}'", port_name, line.escape_default());
                return Ok(line);
            }

            if start.elapsed() >= timeout {
                return Err(TransportError::Timeout {
                    command: command.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }

            match port.read(&mut buffer) {
                Ok(n) => response.extend_from_slice(&buffer[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn find_terminator(data: &[u8], terminator: &[u8]) -> Option<usize> {
    if terminator.is_empty() {
        return None;
    }
    data.windows(terminator.len()).position(|w| w == terminator)
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.port.is_some() {
            return Ok(());
        }
        if self.config.timeout().is_zero() {
            return Err(TransportError::OpenFailed {
                port: self.config.port.clone(),
                reason: format!("reply timeout must be positive, got {}s", self.config.timeout_secs),
            });
        }

        debug!(
            "Opening {} at {} baud (timeout {:?})",
            self.config.port,
            self.config.baud_rate,
            self.config.timeout()
        );

        let port = serialport::new(&self.config.port, self.config.baud_rate)
            .timeout(READ_POLL)
            .open()
            .map_err(|e| TransportError::OpenFailed {
                port: self.config.port.clone(),
                reason: e.to_string(),
            })?;

        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.port.take().is_some() {
            debug!("Closed {}", self.config.port);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        self.send_line(command)?;
        self.read_line(command)
    }

    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        self.send_line(command)
    }
}

//! Line-oriented AT command transport.
//!
//! A command is written with a trailing `\r`; the response is read line by
//! line until a final result code shows up. Intermediate lines are returned to
//! the caller, the echo of the command and blank lines are dropped. The text
//! following a `+CMGR:` header is message body, never a result code.

use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use log::trace;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error_handling::types::ModemError;

pub trait AtTransport: Send {
    /// Sends one command and returns the intermediate response lines.
    fn send(&mut self, command: &str) -> Result<Vec<String>, ModemError>;
}

/// Opens transports for device paths. Used by discovery and session setup.
pub trait Connector: Send + Sync {
    fn connect(&self, device_path: &Path) -> Result<Box<dyn AtTransport>, ModemError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FinalResult {
    Ok,
    Error(String),
}

/// Classifies a response line as a final result code, if it is one.
pub(crate) fn final_result(line: &str) -> Option<FinalResult> {
    if line == "OK" {
        return Some(FinalResult::Ok);
    }
    if line == "ERROR" || line == "NO CARRIER" {
        return Some(FinalResult::Error(line.to_string()));
    }
    for prefix in ["+CMS ERROR:", "+CME ERROR:"] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return Some(FinalResult::Error(format!("{} {}", prefix, rest.trim())));
        }
    }
    None
}

/// Accumulates the lines of one command response.
#[derive(Debug, Default)]
pub(crate) struct ResponseCollector {
    lines: Vec<String>,
    /// Body lines seen since the last `+CMGR:` header, while inside a body.
    body_lines: Option<usize>,
}

impl ResponseCollector {
    /// Feeds one trimmed line. Returns the response once its final result
    /// code has been read, `Err` carrying the reason of a rejection.
    ///
    /// A message body runs from its header to the next blank line. Its first
    /// line is always text. Later body lines that look like a result code end
    /// the response, for modems that omit the blank separator.
    pub(crate) fn feed(&mut self, line: &str) -> Option<Result<Vec<String>, String>> {
        if let Some(seen) = self.body_lines {
            if line.is_empty() {
                self.body_lines = None;
                return None;
            }
            if seen == 0 || final_result(line).is_none() {
                self.body_lines = Some(seen + 1);
                self.lines.push(line.to_string());
                return None;
            }
            self.body_lines = None;
        }
        if line.is_empty() {
            return None;
        }

        match final_result(line) {
            Some(FinalResult::Ok) => Some(Ok(std::mem::take(&mut self.lines))),
            Some(FinalResult::Error(reason)) => Some(Err(reason)),
            None => {
                if line.starts_with("+CMGR:") {
                    self.body_lines = Some(0);
                }
                self.lines.push(line.to_string());
                None
            }
        }
    }
}

/// AT transport over a serial line at 8N1.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    read_timeout: Duration,
    pending: String,
}

impl SerialTransport {
    pub fn open(path: &Path, baud_rate: u32, read_timeout: Duration) -> Result<Self, ModemError> {
        let port_name = path.to_string_lossy().into_owned();
        let port = serialport::new(port_name.as_str(), baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()?;

        Ok(Self::from_port(port, read_timeout))
    }

    pub fn from_port(port: Box<dyn SerialPort>, read_timeout: Duration) -> Self {
        Self {
            port,
            read_timeout,
            pending: String::new(),
        }
    }

    fn read_line(&mut self, command: &str, deadline: Instant) -> Result<String, ModemError> {
        let mut buf = [0u8; 256];
        loop {
            if let Some(idx) = self.pending.find('\n') {
                let line: String = self.pending.drain(..=idx).collect();
                return Ok(line.trim().to_string());
            }
            if Instant::now() >= deadline {
                return Err(ModemError::Timeout(command.to_string()));
            }
            match self.port.read(&mut buf) {
                Ok(0) => continue,
                Ok(n) => self.pending.push_str(&String::from_utf8_lossy(&buf[..n])),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl AtTransport for SerialTransport {
    fn send(&mut self, command: &str) -> Result<Vec<String>, ModemError> {
        let _ = self.port.clear(ClearBuffer::Input);
        self.pending.clear();

        trace!("> {}", command);
        self.port.write_all(format!("{}\r", command).as_bytes())?;
        self.port.flush()?;

        let deadline = Instant::now() + self.read_timeout;
        let mut response = ResponseCollector::default();
        loop {
            let line = self.read_line(command, deadline)?;
            if line == command {
                continue;
            }
            trace!("< {}", line);
            match response.feed(&line) {
                Some(Ok(lines)) => return Ok(lines),
                Some(Err(reason)) => {
                    return Err(ModemError::Rejected {
                        command: command.to_string(),
                        reason,
                    })
                }
                None => {}
            }
        }
    }
}

/// Opens [`SerialTransport`]s at a fixed line configuration.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl Default for SerialConnector {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout: Duration::from_secs(1),
        }
    }
}

impl Connector for SerialConnector {
    fn connect(&self, device_path: &Path) -> Result<Box<dyn AtTransport>, ModemError> {
        let transport = SerialTransport::open(device_path, self.baud_rate, self.read_timeout)?;
        Ok(Box::new(transport))
    }
}

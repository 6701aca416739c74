// src/io/link.rs
//
// The single open connection to the scale. Owns the transport handle and
// the line framer; translates transport failures into typed faults.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::{LineFramer, LinkConfig, PortId, SerialLine, Transport};

/// Why a connection attempt did not produce a link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectFault {
    #[error("no port selected")]
    NoPortSelected,
    #[error("already connected to {0}")]
    AlreadyConnected(PortId),
    #[error("failed to open {port}: {reason}")]
    Open { port: PortId, reason: String },
}

/// A read failed for a reason other than a timeout. The link is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("read error on {port}: {reason}")]
pub struct ReadTransportFault {
    pub port: PortId,
    pub reason: String,
}

pub struct DeviceLink {
    port: PortId,
    line: Option<Box<dyn SerialLine>>,
    framer: LineFramer,
    ready: VecDeque<Vec<u8>>,
}

impl DeviceLink {
    /// Open `port` through `transport`. Nothing is retained on failure.
    pub fn open(
        transport: &dyn Transport,
        port: &PortId,
        config: &LinkConfig,
    ) -> Result<Self, ConnectFault> {
        let line = transport
            .open(port, config)
            .map_err(|reason| ConnectFault::Open {
                port: port.clone(),
                reason,
            })?;

        log::info!("Opened {} at {}", port, config.describe());

        Ok(DeviceLink {
            port: port.clone(),
            line: Some(line),
            framer: LineFramer::crlf(),
            ready: VecDeque::new(),
        })
    }

    pub fn port(&self) -> &PortId {
        &self.port
    }

    pub fn is_open(&self) -> bool {
        self.line.is_some()
    }

    /// Next complete line, delimiter included.
    ///
    /// Returns `Ok(None)` when nothing complete arrived within `timeout`.
    /// Never blocks past `timeout`.
    pub fn read_line(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, ReadTransportFault> {
        if let Some(line) = self.ready.pop_front() {
            return Ok(Some(line));
        }

        let port = &self.port;
        let line = self.line.as_mut().ok_or_else(|| ReadTransportFault {
            port: port.clone(),
            reason: "link is closed".to_string(),
        })?;

        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 64];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            match line.read_bytes(&mut buf, remaining) {
                Ok(0) => {
                    return Err(ReadTransportFault {
                        port: port.clone(),
                        reason: "device closed the connection".to_string(),
                    });
                }
                Ok(n) => {
                    self.ready.extend(self.framer.feed(&buf[..n]));
                    if let Some(complete) = self.ready.pop_front() {
                        return Ok(Some(complete));
                    }
                }
                Err(ref e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Ok(None);
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(ReadTransportFault {
                        port: port.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Close the handle. Safe to call more than once; close errors are
    /// logged and dropped since the handle is gone either way.
    pub fn close(&mut self) {
        if let Some(mut line) = self.line.take() {
            match line.close() {
                Ok(()) => log::info!("Closed {}", self.port),
                Err(e) => log::debug!("Error while closing {} (ignored): {}", self.port, e),
            }
        }
        self.framer.clear();
        self.ready.clear();
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        self.close();
    }
}

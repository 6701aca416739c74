// src/io/mod.rs
//
// Host capabilities consumed by the session layer: port enumeration and
// a byte-oriented transport. The desktop backend lives in `serial`; other
// targets get a backend that reports no ports.

pub mod framer;
pub mod link;
#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub mod serial;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use framer::LineFramer;
pub use link::{ConnectFault, DeviceLink, ReadTransportFault};

// ============================================================================
// Types
// ============================================================================

/// Opaque name of a serial or USB endpoint ("/dev/ttyUSB0", "COM3", ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(String);

impl PortId {
    pub fn new(name: impl Into<String>) -> Self {
        PortId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PortId {
    fn from(name: &str) -> Self {
        PortId::new(name)
    }
}

impl From<String> for PortId {
    fn from(name: String) -> Self {
        PortId(name)
    }
}

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    fn letter(&self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        }
    }
}

/// Line settings used when opening a device link.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkConfig {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    /// Upper bound for a single `read_line` call
    pub read_timeout: Duration,
}

impl Default for LinkConfig {
    /// The scale's fixed wire contract: 9600 baud, 8N1, 90 ms read timeout.
    fn default() -> Self {
        LinkConfig {
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            read_timeout: Duration::from_millis(90),
        }
    }
}

impl LinkConfig {
    /// Short form used in log lines, e.g. "9600 baud (8-N-1)".
    pub fn describe(&self) -> String {
        format!(
            "{} baud ({}-{}-{})",
            self.baud_rate,
            self.data_bits,
            self.parity.letter(),
            self.stop_bits
        )
    }
}

/// Metadata about an available port, for listings.
#[derive(Clone, Debug, Serialize)]
pub struct PortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

// ============================================================================
// Capabilities
// ============================================================================

/// Lists the endpoints currently visible to the host.
pub trait PortEnumerator: Send {
    fn list_ports(&self) -> Result<Vec<PortId>, String>;
}

/// Opens a named endpoint.
pub trait Transport: Send {
    fn open(&self, port: &PortId, config: &LinkConfig) -> Result<Box<dyn SerialLine>, String>;
}

/// An open endpoint.
///
/// `read_bytes` waits at most `timeout`. A timeout surfaces as an
/// `ErrorKind::TimedOut` (or `WouldBlock`) error, `Ok(0)` means the device
/// went away, any other error is a transport failure.
pub trait SerialLine: Send {
    fn read_bytes(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize>;

    fn close(&mut self) -> std::io::Result<()>;
}

/// The pair of capabilities a session is built on.
pub struct Backend {
    pub enumerator: Box<dyn PortEnumerator>,
    pub transport: Box<dyn Transport>,
}

/// Backend for the platform this binary was built for.
pub fn default_backend() -> Backend {
    #[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
    {
        Backend {
            enumerator: Box::new(serial::SerialportEnumerator),
            transport: Box::new(serial::SerialportTransport),
        }
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        Backend {
            enumerator: Box::new(UnsupportedBackend),
            transport: Box::new(UnsupportedBackend),
        }
    }
}

/// List ports with metadata - returns empty on targets without serial support
pub fn list_port_details() -> Result<Vec<PortInfo>, String> {
    #[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
    {
        serial::list_port_details()
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        Ok(vec![])
    }
}

// Serial ports are not reachable through serialport on mobile targets.
#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
struct UnsupportedBackend;

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
impl PortEnumerator for UnsupportedBackend {
    fn list_ports(&self) -> Result<Vec<PortId>, String> {
        Ok(vec![])
    }
}

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
impl Transport for UnsupportedBackend {
    fn open(&self, _port: &PortId, _config: &LinkConfig) -> Result<Box<dyn SerialLine>, String> {
        Err("Serial ports are not available on this platform".to_string())
    }
}

// src/io/serial/mod.rs
//
// Desktop backend over the serialport crate.
// Provides port enumeration and the transport used by `DeviceLink`.

pub mod ports;
pub mod transport;
pub(crate) mod utils;

pub use ports::{list_port_details, SerialportEnumerator};
pub use transport::SerialportTransport;

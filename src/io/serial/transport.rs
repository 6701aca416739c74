// src/io/serial/transport.rs
//
// Transport over a real serial port. The port timeout tracks the time
// remaining in the caller's read budget.

use std::io::{self, Read};
use std::time::Duration;

use super::utils::{to_serialport_data_bits, to_serialport_parity, to_serialport_stop_bits};
use crate::io::{LinkConfig, PortId, SerialLine, Transport};

pub struct SerialportTransport;

impl Transport for SerialportTransport {
    fn open(&self, port: &PortId, config: &LinkConfig) -> Result<Box<dyn SerialLine>, String> {
        let handle = serialport::new(port.as_str(), config.baud_rate)
            .data_bits(to_serialport_data_bits(config.data_bits))
            .stop_bits(to_serialport_stop_bits(config.stop_bits))
            .parity(to_serialport_parity(&config.parity))
            .timeout(config.read_timeout)
            .open()
            .map_err(|e| e.to_string())?;

        Ok(Box::new(SerialportLine {
            port: Some(handle),
            timeout: config.read_timeout,
        }))
    }
}

struct SerialportLine {
    port: Option<Box<dyn serialport::SerialPort>>,
    timeout: Duration,
}

impl SerialLine for SerialportLine {
    fn read_bytes(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port is closed"))?;

        if timeout != self.timeout {
            port.set_timeout(timeout).map_err(io::Error::from)?;
            self.timeout = timeout;
        }

        port.read(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        match self.port.take() {
            // Dropping the handle closes the descriptor
            Some(port) => port
                .clear(serialport::ClearBuffer::Input)
                .map_err(io::Error::from),
            None => Ok(()),
        }
    }
}

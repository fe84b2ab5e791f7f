// Serial transport for the stage
//
// The controller only needs two primitives: write a frame, and poll whatever
// bytes have arrived. Keeping them behind a trait lets tests script a device.

use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::debug;

use super::protocol::Result;

/// Elliptec modules talk 9600 baud, 8N1, no flow control
pub const DEFAULT_BAUDRATE: u32 = 9600;

/// Byte-level link to the stage
pub trait Transport {
    /// Write a complete frame
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Return whatever has arrived, possibly nothing.
    ///
    /// Waits at most the transport's own timeout for the first byte.
    fn read_available(&mut self) -> Result<Vec<u8>>;
}

/// Transport over a local serial port
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open the port with the given per-read timeout
    pub fn open(port_name: &str, timeout: Duration) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE, timeout)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(timeout)
            .open()?;

        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        // Ask for at least one byte so the read blocks up to the port timeout
        // instead of returning immediately
        let waiting = self.port.bytes_to_read()? as usize;
        let mut buf = vec![0u8; waiting.max(1)];

        match self.port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                if n > 0 {
                    debug!("Read {} bytes: {:?}", n, String::from_utf8_lossy(&buf));
                }
                Ok(buf)
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

//! Byte channel abstraction
//!
//! The protocol layer only needs a duplex byte stream. Serial ports are the
//! production transport; tests and the simulator provide their own.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Duplex byte transport consumed by the protocol layer
pub trait ByteChannel: Read + Write + Send {
    /// Discard any bytes received but not yet read
    fn clear_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: ByteChannel + ?Sized> ByteChannel for Box<T> {
    fn clear_input(&mut self) -> io::Result<()> {
        (**self).clear_input()
    }
}

/// Serial port wrapper implementing [`ByteChannel`]
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an opened port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }

    /// Change how long a read waits for the first byte
    pub fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(io::Error::other)
    }

    /// Name of the underlying port, if the driver knows it
    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl ByteChannel for SerialChannel {
    fn clear_input(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }
}

impl std::fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialChannel")
            .field("port", &self.port.name())
            .finish()
    }
}

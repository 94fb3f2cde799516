use serialport::SerialPort;
use std::io::{self, Read, Write};

use super::{LinkConfig, ProbeError};

/// A byte channel to one endpoint
pub trait Channel: Read + Write + Send {
    /// Discard anything already waiting to be read
    fn clear_input(&mut self) -> io::Result<()>;
}

/// Opens channels by endpoint identifier
///
/// Implemented by [`super::SerialTransport`] for real hardware and by
/// [`crate::sim::SimTransport`] for the in-memory bus.
pub trait Transport {
    /// Open `id` with the given configuration
    fn open(&self, id: &str, config: &LinkConfig) -> Result<Box<dyn Channel>, ProbeError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn open(&self, id: &str, config: &LinkConfig) -> Result<Box<dyn Channel>, ProbeError> {
        (**self).open(id, config)
    }
}

/// Serial port wrapper implementing [`Channel`]
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an opened port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
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

impl Channel for SerialChannel {
    fn clear_input(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

//! We use this mocking module in unit tests to emulate a serial port.

use core::time::Duration;

use crate::transport::Transport;

const BUFFER_SIZE: usize = 1024;

/// Our mock type used to emulate a serial port.
pub struct MockSerial {
    /// Buffer to store data written to the mock serial port
    write_buffer: heapless::Vec<u8, BUFFER_SIZE>,
    /// Buffer containing pre-configured response data to be read
    read_buffer: heapless::Vec<u8, BUFFER_SIZE>,
    /// Current position in the read buffer
    read_position: usize,
    /// Flag to simulate write errors
    should_error_on_write: bool,
    /// Flag to simulate read errors
    should_error_on_read: bool,
    port_name: &'static str,
    baud_rate: u32,
    timeout: Duration,
    /// Every timeout ever set, in order
    timeout_history: heapless::Vec<Duration, 32>,
    /// Every settle delay requested, in order
    delays: heapless::Vec<Duration, 64>,
    /// Actually sleep in [`Transport::delay`]
    real_delay: bool,
}

#[derive(Debug)]
pub enum MockSerialError {
    /// Simulated timeout error, also returned once the read data is exhausted
    Timeout,
    /// Simulated buffer overflow
    BufferOverflow,
    /// Generic simulated error for testing
    SimulatedError,
}

impl core::fmt::Display for MockSerialError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl core::error::Error for MockSerialError {}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::BufferOverflow => embedded_io::ErrorKind::OutOfMemory,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        self.write_buffer
            .extend_from_slice(buf)
            .map_err(|_| MockSerialError::BufferOverflow)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_read {
            return Err(MockSerialError::SimulatedError);
        }

        if self.read_position >= self.read_buffer.len() {
            return Err(MockSerialError::Timeout);
        }

        let available_bytes = self.read_buffer.len() - self.read_position;
        let bytes_to_read = core::cmp::min(buf.len(), available_bytes);
        buf[..bytes_to_read].copy_from_slice(
            &self.read_buffer[self.read_position..self.read_position + bytes_to_read],
        );
        self.read_position += bytes_to_read;
        Ok(bytes_to_read)
    }
}

impl Transport for MockSerial {
    fn port_name(&self) -> &str {
        self.port_name
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), Self::Error> {
        self.timeout = timeout;
        self.timeout_history
            .push(timeout)
            .map_err(|_| MockSerialError::BufferOverflow)
    }

    fn delay(&mut self, duration: Duration) {
        // Running out of room only loses bookkeeping, never the delay itself.
        let _ = self.delays.push(duration);
        if self.real_delay {
            std::thread::sleep(duration);
        }
    }
}

impl MockSerial {
    /// Create a new MockSerial instance with empty buffers, on `COM1` at 19200 baud.
    pub fn new() -> Self {
        Self {
            write_buffer: heapless::Vec::new(),
            read_buffer: heapless::Vec::new(),
            read_position: 0,
            should_error_on_write: false,
            should_error_on_read: false,
            port_name: "COM1",
            baud_rate: 19200,
            timeout: Duration::from_secs(1),
            timeout_history: heapless::Vec::new(),
            delays: heapless::Vec::new(),
            real_delay: false,
        }
    }

    /// Same as [`MockSerial::new`] but preloaded with the replies to be read.
    pub fn with_replies(data: &[u8]) -> Self {
        let mut mock = Self::new();
        mock.push_read_data(data)
            .expect("mock read buffer too small for test data");
        mock
    }

    /// Set the data that will be returned when read() is called
    pub fn set_read_data(&mut self, data: &[u8]) -> Result<(), MockSerialError> {
        self.read_buffer.clear();
        self.read_position = 0;
        self.push_read_data(data)
    }

    /// Append to the data that will be returned when read() is called
    pub fn push_read_data(&mut self, data: &[u8]) -> Result<(), MockSerialError> {
        self.read_buffer
            .extend_from_slice(data)
            .map_err(|_| MockSerialError::BufferOverflow)
    }

    /// Get a reference to the data that was written to this mock serial port
    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    /// The written data as text, for the ASCII side of the protocol.
    pub fn written_text(&self) -> &str {
        core::str::from_utf8(&self.write_buffer).expect("written data is not ASCII")
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    /// Configure whether read operations should fail with an error
    pub fn set_read_error(&mut self, should_error: bool) {
        self.should_error_on_read = should_error;
    }

    pub fn set_port_name(&mut self, name: &'static str) {
        self.port_name = name;
    }

    pub fn set_baud_rate(&mut self, baud_rate: u32) {
        self.baud_rate = baud_rate;
    }

    /// Make [`Transport::delay`] really block.
    pub fn set_real_delay(&mut self, real_delay: bool) {
        self.real_delay = real_delay;
    }

    pub fn timeout_history(&self) -> &[Duration] {
        &self.timeout_history
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, Write};

    #[test]
    fn test_write_multiple_times() {
        let mut mock = MockSerial::new();
        mock.write(b"ADR 06\r").unwrap();
        mock.write(b"PV?\r").unwrap();
        assert_eq!(mock.written_data(), b"ADR 06\rPV?\r");
        assert_eq!(mock.written_text(), "ADR 06\rPV?\r");
    }

    #[test]
    fn test_write_buffer_overflow() {
        let mut mock = MockSerial::new();
        let large_data = [0u8; BUFFER_SIZE + 1];
        assert!(matches!(
            mock.write(&large_data),
            Err(MockSerialError::BufferOverflow)
        ));
    }

    #[test]
    fn test_read_multiple_calls() {
        let mut mock = MockSerial::with_replies(b"OK\r12.5\r");

        let mut buffer1 = [0u8; 3];
        let mut buffer2 = [0u8; 10];
        assert_eq!(mock.read(&mut buffer1).unwrap(), 3);
        assert_eq!(mock.read(&mut buffer2).unwrap(), 5);
        assert_eq!(&buffer1, b"OK\r");
        assert_eq!(&buffer2[..5], b"12.5\r");
    }

    #[test]
    fn test_read_times_out_when_exhausted() {
        let mut mock = MockSerial::with_replies(b"Hi");
        let mut buffer = [0u8; 10];
        assert!(mock.read(&mut buffer).is_ok());

        let err = mock.read(&mut buffer).unwrap_err();
        assert!(matches!(err.kind(), embedded_io::ErrorKind::TimedOut));
    }

    #[test]
    fn test_error_flags_toggle() {
        let mut mock = MockSerial::new();

        mock.set_write_error(true);
        assert!(mock.write(b"test").is_err());
        assert!(mock.flush().is_err());
        mock.set_write_error(false);
        assert!(mock.write(b"test").is_ok());

        mock.set_read_data(b"data").unwrap();
        let mut buffer = [0u8; 10];
        mock.set_read_error(true);
        assert!(matches!(
            mock.read(&mut buffer),
            Err(MockSerialError::SimulatedError)
        ));
        mock.set_read_error(false);
        assert!(mock.read(&mut buffer).is_ok());
    }

    #[test]
    fn test_transport_bookkeeping() {
        let mut mock = MockSerial::new();
        mock.set_timeout(Duration::from_millis(30)).unwrap();
        mock.set_timeout(Duration::from_secs(1)).unwrap();
        mock.delay(Duration::from_millis(150));

        assert_eq!(mock.timeout(), Duration::from_secs(1));
        assert_eq!(
            mock.timeout_history(),
            &[Duration::from_millis(30), Duration::from_secs(1)]
        );
        assert_eq!(mock.delays(), &[Duration::from_millis(150)]);
    }
}

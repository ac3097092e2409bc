//! Fast queries (Genesys manual paragraph 7.9).
//!
//! A fast query is a two byte binary request carrying the target address in its payload. It
//! needs no `ADR` selection and gets its answer within about 10 ms, which makes it the cheap way
//! to find out whether a supply is there at all. The read timeout of the transport is shortened
//! for the duration of the query so a silent supply costs [`FAST_QUERY_TIMEOUT`] and not the
//! normal command timeout.
//!
//! Fixed length replies end in the trailer `$`, two hex checksum digits, `\r`. The queries hand
//! back the raw [`FastQueryFrame`]; checking it is up to the caller, see
//! [`FastQueryFrame::verify`].

use core::time::Duration;

use embedded_io::Error as _;

use crate::{
    command::TERMINATOR,
    error::{Error, Result},
    register::RegisterSnapshot,
    transport::{Address, Transport},
};

/// 10 ms for the supply to answer, plus time on the wire.
pub const FAST_QUERY_TIMEOUT: Duration = Duration::from_millis(30);

/// First byte of the connection test.
pub const CONNECTION_TEST: u8 = 0xAA;
/// First byte of the power-on time query.
pub const POWER_ON_TIME: u8 = 0xA6;
/// Or'ed with the address, twice, for the register query.
pub const READ_REGISTERS: u8 = 0x80;
/// First reply byte of a supply with multi-drop enabled.
pub const MULTI_DROP_MARKER: u8 = b'1';

/// Most bytes read back for a connection test.
pub const CONNECTION_TEST_LEN: usize = 5;
/// Length of the register query reply, trailer included.
pub const REGISTERS_FRAME_LEN: usize = 16;
/// Length of the power-on time reply, trailer included.
pub const POWER_ON_TIME_FRAME_LEN: usize = 12;
/// The longest fast query reply.
pub const MAX_FRAME_LEN: usize = REGISTERS_FRAME_LEN;

/// Delimiter opening the trailer.
const TRAILER_DELIMITER: u8 = b'$';
/// `$`, two checksum digits, `\r`.
const TRAILER_LEN: usize = 4;

/// Total power-on time of a supply, counted in minutes.
pub type Minutes = fugit::Duration<u32, 60, 1>;

pub type FrameBytes = heapless::Vec<u8, MAX_FRAME_LEN>;

/// Sum of all bytes, modulo 256.
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

/// [`checksum`] as it appears in a trailer: two upper case hex digits.
pub fn checksum_digits(payload: &[u8]) -> [u8; 2] {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let sum = checksum(payload);
    [HEX[(sum >> 4) as usize], HEX[(sum & 0x0F) as usize]]
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("Fast query reply has {actual} bytes, expected {expected}")]
    Length { expected: usize, actual: usize },
    #[error("Fast query reply lacks the '$' delimiter")]
    MissingDelimiter,
    #[error("Fast query reply lacks the terminator")]
    MissingTerminator,
    #[error("Fast query checksum {received:02X?} does not match payload checksum {computed:02X}")]
    Checksum { computed: u8, received: [u8; 2] },
    #[error("Fast query payload is malformed")]
    Payload,
}

/// A fixed length fast query reply, as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastQueryFrame {
    bytes: FrameBytes,
    expected_len: usize,
}

impl FastQueryFrame {
    pub fn new(bytes: FrameBytes, expected_len: usize) -> Self {
        Self {
            bytes,
            expected_len,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Check length and trailer, and return the payload the trailer protects.
    pub fn verify(&self) -> core::result::Result<&[u8], FrameError> {
        let bytes = self.as_bytes();
        if bytes.len() != self.expected_len || bytes.len() < TRAILER_LEN {
            return Err(FrameError::Length {
                expected: self.expected_len,
                actual: bytes.len(),
            });
        }
        let (payload, trailer) = bytes.split_at(bytes.len() - TRAILER_LEN);
        if trailer[0] != TRAILER_DELIMITER {
            return Err(FrameError::MissingDelimiter);
        }
        if trailer[3] != TERMINATOR {
            return Err(FrameError::MissingTerminator);
        }
        let received = [trailer[1], trailer[2]];
        let computed = checksum_digits(payload);
        if !received.eq_ignore_ascii_case(&computed) {
            return Err(FrameError::Checksum {
                computed: checksum(payload),
                received,
            });
        }
        Ok(payload)
    }

    /// Decode a verified register query reply.
    pub fn registers(&self) -> core::result::Result<RegisterSnapshot, FrameError> {
        RegisterSnapshot::from_payload(self.verify()?).ok_or(FrameError::Payload)
    }

    /// Decode a verified power-on time reply: 8 hex digits of minutes.
    pub fn power_on_time(&self) -> core::result::Result<Minutes, FrameError> {
        let digits = core::str::from_utf8(self.verify()?).map_err(|_| FrameError::Payload)?;
        if digits.len() != 8 {
            return Err(FrameError::Payload);
        }
        let minutes = u32::from_str_radix(digits, 16).map_err(|_| FrameError::Payload)?;
        Ok(Minutes::from_ticks(minutes))
    }
}

/// Fast queries over a borrowed transport.
pub struct FastQuery<'a, T: Transport> {
    transport: &'a mut T,
}

impl<'a, T: Transport> FastQuery<'a, T> {
    pub fn new(transport: &'a mut T) -> Self {
        Self { transport }
    }

    /// Write `payload` as is and read back at most `expected_len` bytes, stopping early at a
    /// terminator. `None` means nothing came back within [`FAST_QUERY_TIMEOUT`].
    ///
    /// The transport's own timeout is restored afterwards, also when the exchange fails.
    /// An `expected_len` above [`MAX_FRAME_LEN`] is a [`Error::BufferError`] and nothing is sent.
    pub fn probe(
        &mut self,
        address: Address,
        payload: &[u8],
        expected_len: usize,
    ) -> Result<Option<FrameBytes>, T::Error> {
        if expected_len > MAX_FRAME_LEN {
            return Err(Error::BufferError);
        }

        let timeout = self.transport.timeout();
        self.transport
            .set_timeout(FAST_QUERY_TIMEOUT)
            .map_err(Error::SerialError)?;
        let response = self.exchange(payload, expected_len);
        self.transport
            .set_timeout(timeout)
            .map_err(Error::SerialError)?;
        let response = response?;

        if response.is_empty() {
            log::debug!("{}: no fast query reply from {}", self.transport.port_name(), address);
            Ok(None)
        } else {
            log::trace!(
                "{}: fast query reply from {}: {:02X?}",
                self.transport.port_name(),
                address,
                response.as_slice()
            );
            Ok(Some(response))
        }
    }

    fn exchange(&mut self, payload: &[u8], expected_len: usize) -> Result<FrameBytes, T::Error> {
        self.transport
            .write_all(payload)
            .map_err(Error::SerialError)?;
        self.transport.flush().map_err(Error::SerialError)?;

        let mut response = FrameBytes::new();
        let mut byte = [0u8; 1];
        while response.len() < expected_len {
            match self.transport.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    response.push(byte[0]).map_err(|_| Error::BufferError)?;
                    if byte[0] == TERMINATOR {
                        break;
                    }
                }
                Err(e) if matches!(e.kind(), embedded_io::ErrorKind::TimedOut) => break,
                Err(e) => return Err(Error::SerialError(e)),
            }
        }
        Ok(response)
    }

    /// Connection test. A silent supply is `false`, not an error.
    pub fn is_responsive(&mut self, address: Address) -> Result<bool, T::Error> {
        let response = self.probe(address, &[CONNECTION_TEST, address.get()], CONNECTION_TEST_LEN)?;
        Ok(response.is_some())
    }

    /// Connection test, reporting whether multi-drop is enabled. A silent supply is `false`.
    pub fn is_multi_drop_enabled(&mut self, address: Address) -> Result<bool, T::Error> {
        let response = self.probe(address, &[CONNECTION_TEST, address.get()], CONNECTION_TEST_LEN)?;
        Ok(response.is_some_and(|bytes| bytes.first() == Some(&MULTI_DROP_MARKER)))
    }

    /// Read STAT, SENA, SEVE, FLT, FENA & FEVE in one go. The frame is not verified.
    pub fn registers(&mut self, address: Address) -> Result<FastQueryFrame, T::Error> {
        let query = READ_REGISTERS | address.get();
        self.frame(address, &[query, query], REGISTERS_FRAME_LEN)
    }

    /// Read the lifetime power-on time. The frame is not verified.
    pub fn power_on_time(&mut self, address: Address) -> Result<FastQueryFrame, T::Error> {
        self.frame(address, &[POWER_ON_TIME, address.get()], POWER_ON_TIME_FRAME_LEN)
    }

    fn frame(
        &mut self,
        address: Address,
        payload: &[u8],
        expected_len: usize,
    ) -> Result<FastQueryFrame, T::Error> {
        match self.probe(address, payload, expected_len)? {
            Some(bytes) => Ok(FastQueryFrame::new(bytes, expected_len)),
            None => {
                log::warn!("{}: {} is unresponsive", self.transport.port_name(), address);
                Err(Error::Unresponsive)
            }
        }
    }
}

//! The byte transport a Genesys bus runs over, and the serial settings it must use.

use core::time::Duration;

use strum_macros::{EnumCount, EnumIter};

use crate::error::{Error, Result};

/// Number of data bits the Genesys serial interface uses.
pub const DATA_BITS: u8 = 8;
/// Number of stop bits the Genesys serial interface uses.
pub const STOP_BITS: u8 = 1;

/// Anything that can carry Genesys traffic: a blocking byte stream with a
/// configurable read timeout and a stable identity.
///
/// The identity returned by [`Transport::port_name`] keys the bus addressing
/// cache, so two handles onto the same physical port must report the same name.
pub trait Transport: embedded_io::Read + embedded_io::Write {
    /// Identity of the physical bus, e.g. `/dev/ttyUSB0` or `COM4`.
    fn port_name(&self) -> &str;

    /// Currently configured baud rate.
    fn baud_rate(&self) -> u32;

    /// Currently configured read timeout.
    fn timeout(&self) -> Duration;

    /// Change the read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> core::result::Result<(), Self::Error>;

    /// Block for a settle delay. Tests substitute a recording clock here.
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// All baud rates the Genesys serial interface supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumCount)]
#[repr(u32)]
pub enum BaudRate {
    _1200 = 1200,
    _2400 = 2400,
    _4800 = 4800,
    _9600 = 9600,
    /// Fastest rate, and the one the demos use.
    _19200 = 19200,
}

impl TryFrom<u32> for BaudRate {
    type Error = u32;

    fn try_from(value: u32) -> core::result::Result<Self, Self::Error> {
        match value {
            1200 => Ok(BaudRate::_1200),
            2400 => Ok(BaudRate::_2400),
            4800 => Ok(BaudRate::_4800),
            9600 => Ok(BaudRate::_9600),
            19200 => Ok(BaudRate::_19200),
            other => Err(other),
        }
    }
}

impl From<BaudRate> for u32 {
    fn from(value: BaudRate) -> Self {
        value as u32
    }
}

impl BaudRate {
    /// Check the transport is configured with a supported baud rate.
    pub fn of<T: Transport>(transport: &T) -> Result<BaudRate, T::Error> {
        BaudRate::try_from(transport.baud_rate()).map_err(Error::UnsupportedBaudRate)
    }
}

/// Address of one supply on a shared bus, 0 - 30.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(u8);

impl Address {
    pub const MAX: u8 = 30;

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Address {
    type Error = u8;

    fn try_from(value: u8) -> core::result::Result<Self, Self::Error> {
        if value <= Self::MAX {
            Ok(Address(value))
        } else {
            Err(value)
        }
    }
}

impl From<Address> for u8 {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl core::fmt::Display for Address {
    /// Zero padded to two digits, as it appears in an `ADR` frame.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

//! This module contains the values exchanged by the Genesys command set.

use strum_macros::{Display, EnumIter, EnumString};

use crate::register::{FaultRegister, StatusRegister, parse_register};

/// Who may operate the supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum RemoteMode {
    /// Front panel controls are active.
    #[strum(serialize = "LOC")]
    Local,
    /// Remote control, the front panel `REM/LOC` button returns to local.
    #[strum(serialize = "REM")]
    Remote,
    /// Remote control with the front panel locked out; only power off remains.
    #[strum(serialize = "LLO")]
    LocalLockout,
}

/// Used to be less ambiguous and whether something is on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum State {
    #[strum(serialize = "OFF")]
    Off,
    #[strum(serialize = "ON")]
    On,
}

impl From<State> for bool {
    fn from(value: State) -> Self {
        match value {
            State::Off => false,
            State::On => true,
        }
    }
}

impl From<bool> for State {
    fn from(value: bool) -> Self {
        match value {
            true => State::On,
            false => State::Off,
        }
    }
}

/// What the output is currently regulating, `MODE?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
pub enum OperationMode {
    #[strum(serialize = "CV")]
    ConstantVoltage,
    #[strum(serialize = "CC")]
    ConstantCurrent,
    /// Output is off.
    #[strum(serialize = "OFF")]
    Off,
}

/// Low pass filter of the voltage & current measurement A/D converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u16)]
pub enum FilterFrequency {
    Hz18 = 18,
    Hz23 = 23,
    Hz46 = 46,
}

impl TryFrom<u16> for FilterFrequency {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            18 => Ok(FilterFrequency::Hz18),
            23 => Ok(FilterFrequency::Hz23),
            46 => Ok(FilterFrequency::Hz46),
            other => Err(other),
        }
    }
}

impl From<FilterFrequency> for u16 {
    fn from(value: FilterFrequency) -> Self {
        value as u16
    }
}

/// All voltages & currents at once, `DVC?`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readings {
    pub voltage_measured: f64,
    pub voltage_programmed: f64,
    pub current_measured: f64,
    pub current_programmed: f64,
    pub over_voltage_protection: f64,
    pub under_voltage_limit: f64,
}

impl Readings {
    /// Parse a reply like `4.999,5.000,0.012,1.000,44.000,0.000`.
    pub fn parse(reply: &str) -> Option<Self> {
        let mut values = reply.split(',').map(|value| value.trim().parse::<f64>());
        let mut next = || values.next()?.ok();
        let readings = Self {
            voltage_measured: next()?,
            voltage_programmed: next()?,
            current_measured: next()?,
            current_programmed: next()?,
            over_voltage_protection: next()?,
            under_voltage_limit: next()?,
        };
        match values.next() {
            None => Some(readings),
            Some(_) => None,
        }
    }
}

/// Complete supply status, `STT?`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Status {
    pub voltage_measured: f64,
    pub voltage_programmed: f64,
    pub current_measured: f64,
    pub current_programmed: f64,
    pub status: StatusRegister,
    pub fault: FaultRegister,
}

impl Status {
    /// Parse a reply like `MV(45.201),PV(45.000),MC(4.3257),PC(10.023),SR(30),FR(00)`.
    pub fn parse(reply: &str) -> Option<Self> {
        let mut fields = reply.split(',').map(|field| {
            let (name, rest) = field.trim().split_once('(')?;
            Some((name.trim(), rest.strip_suffix(')')?.trim()))
        });
        let mut field = |expected: &str| match fields.next()?? {
            (name, value) if name.eq_ignore_ascii_case(expected) => Some(value),
            _ => None,
        };
        let status = Self {
            voltage_measured: field("MV")?.parse().ok()?,
            voltage_programmed: field("PV")?.parse().ok()?,
            current_measured: field("MC")?.parse().ok()?,
            current_programmed: field("PC")?.parse().ok()?,
            status: parse_register(field("SR")?)?.into(),
            fault: parse_register(field("FR")?)?.into(),
        };
        Some(status)
    }
}

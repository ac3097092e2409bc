//! The status and fault registers of a Genesys supply.
//!
//! Both are 8 bit registers, read and written as two hex digits. Each has a condition register
//! (live state), an enable register (which bits may raise a service request) and an event
//! register (latched bits, cleared when read).

use modular_bitfield::prelude::*;

/// Status condition register, `STAT?`.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRegister {
    /// `CV` - constant voltage regulation.
    pub constant_voltage: bool,
    /// `CC` - constant current regulation.
    pub constant_current: bool,
    /// `NFLT` - no fault, output is on.
    pub no_fault: bool,
    /// `FLT` - a fault is active.
    pub fault: bool,
    /// `AST` - auto-restart enabled.
    pub auto_restart: bool,
    /// `FDE` - foldback protection enabled.
    pub foldback_enabled: bool,
    #[skip]
    __: B1,
    /// `LCL` - front panel (local) mode.
    pub local_mode: bool,
}

/// Fault condition register, `FLT?`.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultRegister {
    #[skip]
    __: B1,
    /// `AC` - AC fail.
    pub ac_fail: bool,
    /// `OTP` - over temperature protection.
    pub over_temperature: bool,
    /// `FLD` - foldback protection tripped.
    pub foldback: bool,
    /// `OVP` - over voltage protection tripped.
    pub over_voltage: bool,
    /// `SO` - rear panel shut off.
    pub shut_off: bool,
    /// `OFF` - output turned off from the front panel.
    pub output_off: bool,
    /// `ENA` - rear panel enable is open.
    pub enable_open: bool,
}

impl From<u8> for StatusRegister {
    fn from(value: u8) -> Self {
        Self::from_bytes([value])
    }
}

impl From<StatusRegister> for u8 {
    fn from(value: StatusRegister) -> Self {
        value.into_bytes()[0]
    }
}

impl From<u8> for FaultRegister {
    fn from(value: u8) -> Self {
        Self::from_bytes([value])
    }
}

impl From<FaultRegister> for u8 {
    fn from(value: FaultRegister) -> Self {
        value.into_bytes()[0]
    }
}

/// Parse a register as sent on the wire: hex digits, `00` - `FF`.
pub fn parse_register(text: &str) -> Option<u8> {
    let text = text.trim();
    if text.is_empty() || text.len() > 2 {
        return None;
    }
    u8::from_str_radix(text, 16).ok()
}

/// Render a register for the wire, as two upper case hex digits.
pub fn format_register(value: u8) -> String {
    format!("{value:02X}")
}

/// All six registers at once, as delivered by the fast register query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSnapshot {
    pub status_condition: StatusRegister,
    pub status_enable: u8,
    pub status_event: u8,
    pub fault_condition: FaultRegister,
    pub fault_enable: u8,
    pub fault_event: u8,
}

impl RegisterSnapshot {
    /// Decode the payload of a fast register query: `STAT SENA SEVE FLT FENA FEVE`, each two
    /// hex digits.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() != 12 {
            return None;
        }
        let mut registers = [0u8; 6];
        for (register, digits) in registers.iter_mut().zip(payload.chunks_exact(2)) {
            *register = parse_register(core::str::from_utf8(digits).ok()?)?;
        }
        let [stat, sena, seve, flt, fena, feve] = registers;
        Some(Self {
            status_condition: stat.into(),
            status_enable: sena,
            status_event: seve,
            fault_condition: flt.into(),
            fault_enable: fena,
            fault_event: feve,
        })
    }
}

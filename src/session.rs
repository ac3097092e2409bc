//! One Genesys supply on a shared bus.
//!
//! A [`DeviceSession`] pairs an [`Address`] with the [`CapabilityEnvelope`] of the supply at
//! that address, and drives it through a [`CommandChannel`] that may be shared with sessions
//! for other supplies on the same bus. The channel's lock is held for each whole exchange, so
//! the addressing state kept by the channel stays true while a command is in flight.
//!
//! For its methods, "program" and "set" write a setting, a bare noun reads one back, and
//! `_measured` reads the live output.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use core::str::FromStr;

use crate::{
    capability::CapabilityEnvelope,
    command::CommandChannel,
    error::{Error, Result},
    fast_query::{FastQuery, FastQueryFrame, Minutes},
    range::{
        Quantity, format_value, validate_always, validate_over_voltage, validate_under_voltage,
        validate_voltage,
    },
    register::{FaultRegister, RegisterSnapshot, StatusRegister, format_register, parse_register},
    transport::{Address, Transport},
    types::{FilterFrequency, OperationMode, Readings, RemoteMode, State, Status},
};

/// A channel shared by every session on one bus.
pub type SharedChannel<T, const L: usize = 128> = Arc<Mutex<CommandChannel<T, L>>>;

pub struct DeviceSession<T: Transport, const L: usize = 128> {
    channel: SharedChannel<T, L>,
    address: Address,
    envelope: CapabilityEnvelope,
}

impl<T: Transport, const L: usize> DeviceSession<T, L> {
    /// Take control of the supply at `address`.
    ///
    /// Locks out the front panel with `RMT LLO`, then derives the envelope from `IDN?`. An
    /// identity that names no known Genesys model is an [`Error::InvalidResponse`].
    pub fn open(channel: SharedChannel<T, L>, address: Address) -> Result<Self, T::Error> {
        let envelope = {
            let mut guard = lock(&channel);
            guard.imperative(address, &format!("RMT {}", RemoteMode::LocalLockout))?;
            let identity = guard.interrogative(address, "IDN?")?;
            CapabilityEnvelope::from_identity(&identity).ok_or_else(|| {
                log::warn!("{}: unknown model {:?}", address, identity);
                Error::InvalidResponse
            })?
        };
        log::debug!("{}: opened as {:?}", address, envelope.class);
        Ok(Self::with_envelope(channel, address, envelope))
    }

    /// Bind a session to a supply whose envelope is already known. Nothing is sent.
    pub fn with_envelope(
        channel: SharedChannel<T, L>,
        address: Address,
        envelope: CapabilityEnvelope,
    ) -> Self {
        Self {
            channel,
            address,
            envelope,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn envelope(&self) -> &CapabilityEnvelope {
        &self.envelope
    }

    pub fn channel(&self) -> &SharedChannel<T, L> {
        &self.channel
    }

    /// Return the identity, e.g. `LAMBDA,GEN40-38`.
    pub fn identity(&self) -> Result<String, T::Error> {
        self.interrogative("IDN?")
    }

    /// Return the firmware revision.
    pub fn revision(&self) -> Result<String, T::Error> {
        self.interrogative("REV?")
    }

    pub fn serial_number(&self) -> Result<String, T::Error> {
        self.interrogative("SN?")
    }

    /// Return the date of the last factory test.
    pub fn test_date(&self) -> Result<String, T::Error> {
        self.interrogative("DATE?")
    }

    /// Clear the FEVE & SEVE event registers.
    pub fn clear_status(&self) -> Result<(), T::Error> {
        self.imperative("CLS")
    }

    /// Reset to the safe state: output off, protections at maximum, voltage & current at zero.
    pub fn reset(&self) -> Result<(), T::Error> {
        self.imperative("RST")
    }

    /// Save the present settings to the supply's single memory slot.
    pub fn save_settings(&self) -> Result<(), T::Error> {
        self.imperative("SAV")
    }

    /// Recall the settings stored by [`Self::save_settings`].
    pub fn recall_settings(&self) -> Result<(), T::Error> {
        self.imperative("RCL")
    }

    /// Have the supply re-execute its last command, returning the raw reply.
    ///
    /// See [`CommandChannel::repeat_last_command`], `OK` comes back like any other reply.
    pub fn repeat_last_command(&self) -> Result<String, T::Error> {
        self.lock().repeat_last_command(self.address)
    }

    pub fn set_remote_mode(&self, mode: RemoteMode) -> Result<(), T::Error> {
        self.imperative(&format!("RMT {mode}"))
    }

    pub fn remote_mode(&self) -> Result<RemoteMode, T::Error> {
        self.query("RMT?")
    }

    /// Whether the optional multi-drop card is installed.
    pub fn multi_drop_installed(&self) -> Result<bool, T::Error> {
        let installed: u8 = self.query("MDAV?")?;
        Ok(installed == 1)
    }

    /// Return the master/slave setting for parallel operation, `0` when stand alone.
    pub fn parallel_operation(&self) -> Result<u8, T::Error> {
        self.query("MS?")
    }

    /// Program the output voltage.
    ///
    /// Besides the envelope, the voltage must stay within the live protection settings:
    /// `UVL / 0.95 ≤ V ≤ OVP / 1.05`. Both are read back before anything is written.
    pub fn program_voltage(&self, volts: f64) -> Result<(), T::Error> {
        let mut channel = self.lock();
        self.program_voltage_on(&mut channel, volts)
    }

    pub fn voltage_programmed(&self) -> Result<f64, T::Error> {
        self.query("PV?")
    }

    pub fn voltage_measured(&self) -> Result<f64, T::Error> {
        self.query("MV?")
    }

    /// Program the output current limit.
    pub fn program_current(&self, amperes: f64) -> Result<(), T::Error> {
        Self::check_finite(amperes)?;
        validate_always(Quantity::Current, amperes, self.envelope.current)?;
        self.imperative(&format!("PC {}", format_value(amperes)))
    }

    pub fn current_programmed(&self) -> Result<f64, T::Error> {
        self.query("PC?")
    }

    pub fn current_measured(&self) -> Result<f64, T::Error> {
        self.query("MC?")
    }

    pub fn operation_mode(&self) -> Result<OperationMode, T::Error> {
        self.query("MODE?")
    }

    /// Program the over voltage protection level, which must stay at or above
    /// `V × 1.05` for the presently programmed voltage.
    pub fn program_over_voltage_protection(&self, volts: f64) -> Result<(), T::Error> {
        let mut channel = self.lock();
        self.program_over_voltage_protection_on(&mut channel, volts)
    }

    pub fn over_voltage_protection(&self) -> Result<f64, T::Error> {
        self.query("OVP?")
    }

    /// Program the over voltage protection to the maximum of the model.
    pub fn program_over_voltage_protection_max(&self) -> Result<(), T::Error> {
        self.imperative("OVM")
    }

    /// Program the under voltage limit, which must stay at or below `V × 0.95` for the
    /// presently programmed voltage.
    pub fn program_under_voltage_limit(&self, volts: f64) -> Result<(), T::Error> {
        let mut channel = self.lock();
        self.program_under_voltage_limit_on(&mut channel, volts)
    }

    pub fn under_voltage_limit(&self) -> Result<f64, T::Error> {
        self.query("UVL?")
    }

    /// Program voltage, under voltage limit and over voltage protection together.
    ///
    /// The limits are first widened to the envelope, the voltage is programmed, and then the
    /// limits are narrowed to the requested values. Any order that changes the voltage first
    /// can be refused by the supply. All three values are checked against the envelope and
    /// against each other before anything is sent. The channel stays locked for the whole
    /// sequence.
    pub fn program_voltage_window(
        &self,
        under_voltage_limit: f64,
        volts: f64,
        over_voltage_protection: f64,
    ) -> Result<(), T::Error> {
        for value in [under_voltage_limit, volts, over_voltage_protection] {
            Self::check_finite(value)?;
        }
        validate_always(Quantity::Voltage, volts, self.envelope.voltage)?;
        validate_under_voltage(under_voltage_limit, self.envelope.under_voltage, volts)?;
        validate_over_voltage(over_voltage_protection, self.envelope.over_voltage, volts)?;

        let mut channel = self.lock();
        self.program_under_voltage_limit_on(&mut channel, self.envelope.under_voltage.min)?;
        self.program_over_voltage_protection_on(&mut channel, self.envelope.over_voltage.max)?;
        self.program_voltage_on(&mut channel, volts)?;
        self.program_under_voltage_limit_on(&mut channel, under_voltage_limit)?;
        self.program_over_voltage_protection_on(&mut channel, over_voltage_protection)
    }

    pub fn set_output(&self, state: impl Into<State>) -> Result<(), T::Error> {
        self.imperative(&format!("OUT {}", state.into()))
    }

    pub fn output(&self) -> Result<State, T::Error> {
        self.query("OUT?")
    }

    /// Enable/disable foldback protection, which turns the output off on a change to
    /// constant current regulation.
    pub fn set_foldback(&self, state: impl Into<State>) -> Result<(), T::Error> {
        self.imperative(&format!("FLD {}", state.into()))
    }

    pub fn foldback(&self) -> Result<State, T::Error> {
        self.query("FLD?")
    }

    /// Add `steps` of 0.1 s to the 250 ms foldback delay.
    pub fn set_additional_foldback_delay(&self, steps: u8) -> Result<(), T::Error> {
        self.imperative(&format!("FBD {steps}"))
    }

    pub fn foldback_delay(&self) -> Result<u8, T::Error> {
        self.query("FBD?")
    }

    /// Drop any additional foldback delay, back to 250 ms.
    pub fn reset_foldback_delay(&self) -> Result<(), T::Error> {
        self.imperative("FBDRST")
    }

    /// Whether the output comes back on after an AC fail or a power cycle.
    pub fn set_auto_restart(&self, state: impl Into<State>) -> Result<(), T::Error> {
        self.imperative(&format!("AST {}", state.into()))
    }

    pub fn auto_restart(&self) -> Result<State, T::Error> {
        self.query("AST?")
    }

    pub fn set_filter_frequency(&self, frequency: FilterFrequency) -> Result<(), T::Error> {
        self.imperative(&format!("FILTER {}", u16::from(frequency)))
    }

    pub fn filter_frequency(&self) -> Result<FilterFrequency, T::Error> {
        let hertz: u16 = self.query("FILTER?")?;
        FilterFrequency::try_from(hertz).map_err(|_| Error::InvalidResponse)
    }

    /// Read voltages, currents and protection levels in one exchange.
    pub fn readings(&self) -> Result<Readings, T::Error> {
        let reply = self.interrogative("DVC?")?;
        Readings::parse(&reply).ok_or(Error::InvalidResponse)
    }

    /// Read voltages, currents and both condition registers in one exchange.
    pub fn status(&self) -> Result<Status, T::Error> {
        let reply = self.interrogative("STT?")?;
        Status::parse(&reply).ok_or(Error::InvalidResponse)
    }

    pub fn status_condition(&self) -> Result<StatusRegister, T::Error> {
        self.register("STAT?").map(StatusRegister::from)
    }

    /// Which status conditions may raise a service request.
    pub fn status_enable(&self) -> Result<u8, T::Error> {
        self.register("SENA?")
    }

    pub fn set_status_enable(&self, mask: u8) -> Result<(), T::Error> {
        self.imperative(&format!("SENA {}", format_register(mask)))
    }

    /// Latched status events, cleared by the read.
    pub fn status_event(&self) -> Result<u8, T::Error> {
        self.register("SEVE?")
    }

    pub fn fault_condition(&self) -> Result<FaultRegister, T::Error> {
        self.register("FLT?").map(FaultRegister::from)
    }

    /// Which fault conditions may raise a service request.
    pub fn fault_enable(&self) -> Result<u8, T::Error> {
        self.register("FENA?")
    }

    pub fn set_fault_enable(&self, mask: u8) -> Result<(), T::Error> {
        self.imperative(&format!("FENA {}", format_register(mask)))
    }

    /// Latched fault events, cleared by the read.
    pub fn fault_event(&self) -> Result<u8, T::Error> {
        self.register("FEVE?")
    }

    /// Probe the supply with a fast query. Silence is `false`.
    pub fn is_responsive(&self) -> Result<bool, T::Error> {
        self.lock().fast_query().is_responsive(self.address)
    }

    pub fn is_multi_drop_enabled(&self) -> Result<bool, T::Error> {
        self.lock().fast_query().is_multi_drop_enabled(self.address)
    }

    /// Read all six registers with a fast query, verifying the frame.
    pub fn fast_registers(&self) -> Result<RegisterSnapshot, T::Error> {
        let frame = self.fast_frame(|query, address| query.registers(address))?;
        Ok(frame.registers()?)
    }

    /// Read the lifetime power-on time with a fast query, verifying the frame.
    pub fn power_on_time(&self) -> Result<Minutes, T::Error> {
        let frame = self.fast_frame(|query, address| query.power_on_time(address))?;
        Ok(frame.power_on_time()?)
    }

    fn fast_frame(
        &self,
        read: impl FnOnce(&mut FastQuery<'_, T>, Address) -> Result<FastQueryFrame, T::Error>,
    ) -> Result<FastQueryFrame, T::Error> {
        let mut channel = self.lock();
        let mut query = channel.fast_query();
        read(&mut query, self.address)
    }

    fn program_voltage_on(
        &self,
        channel: &mut CommandChannel<T, L>,
        volts: f64,
    ) -> Result<(), T::Error> {
        Self::check_finite(volts)?;
        validate_always(Quantity::Voltage, volts, self.envelope.voltage)?;
        let uvl_now = Self::parse_reply(&channel.interrogative(self.address, "UVL?")?)?;
        let ovp_now = Self::parse_reply(&channel.interrogative(self.address, "OVP?")?)?;
        validate_voltage(volts, self.envelope.voltage, uvl_now, ovp_now)?;
        channel.imperative(self.address, &format!("PV {}", format_value(volts)))
    }

    fn program_over_voltage_protection_on(
        &self,
        channel: &mut CommandChannel<T, L>,
        volts: f64,
    ) -> Result<(), T::Error> {
        Self::check_finite(volts)?;
        validate_always(Quantity::OverVoltageProtection, volts, self.envelope.over_voltage)?;
        let voltage_now = Self::parse_reply(&channel.interrogative(self.address, "PV?")?)?;
        validate_over_voltage(volts, self.envelope.over_voltage, voltage_now)?;
        channel.imperative(self.address, &format!("OVP {}", format_value(volts)))
    }

    fn program_under_voltage_limit_on(
        &self,
        channel: &mut CommandChannel<T, L>,
        volts: f64,
    ) -> Result<(), T::Error> {
        Self::check_finite(volts)?;
        validate_always(Quantity::UnderVoltageLimit, volts, self.envelope.under_voltage)?;
        let voltage_now = Self::parse_reply(&channel.interrogative(self.address, "PV?")?)?;
        validate_under_voltage(volts, self.envelope.under_voltage, voltage_now)?;
        channel.imperative(self.address, &format!("UVL {}", format_value(volts)))
    }

    fn imperative(&self, command: &str) -> Result<(), T::Error> {
        self.lock().imperative(self.address, command)
    }

    fn interrogative(&self, command: &str) -> Result<String, T::Error> {
        self.lock().interrogative(self.address, command)
    }

    fn query<V: FromStr>(&self, command: &str) -> Result<V, T::Error> {
        Self::parse_reply(&self.interrogative(command)?)
    }

    fn register(&self, command: &str) -> Result<u8, T::Error> {
        let reply = self.interrogative(command)?;
        parse_register(&reply).ok_or(Error::InvalidResponse)
    }

    fn lock(&self) -> MutexGuard<'_, CommandChannel<T, L>> {
        lock(&self.channel)
    }

    fn parse_reply<V: FromStr>(reply: &str) -> Result<V, T::Error> {
        reply.trim().parse().map_err(|_| Error::InvalidResponse)
    }

    fn check_finite(value: f64) -> Result<(), T::Error> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(Error::InvalidArgument("value must be a finite number"))
        }
    }
}

/// Poisoning is ignored: the registry is only updated once an `ADR` exchange completes.
fn lock<T: Transport, const L: usize>(
    channel: &SharedChannel<T, L>,
) -> MutexGuard<'_, CommandChannel<T, L>> {
    channel.lock().unwrap_or_else(PoisonError::into_inner)
}

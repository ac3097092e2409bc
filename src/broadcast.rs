//! Group commands, received by every supply on the bus at once.
//!
//! Nobody is addressed and nobody answers, so the only failures that can be seen are those of
//! the transport itself. After each command the bus is left alone for [`GROUP_SETTLE_DELAY`]
//! so that every supply has executed it before anything else is sent.

use core::time::Duration;

use crate::{
    command::{CommandChannel, TERMINATOR},
    error::{Error, Result},
    range::format_group_value,
    session::SharedChannel,
    transport::Transport,
    types::State,
};

/// Time every supply on the bus needs to execute a group command.
pub const GROUP_SETTLE_DELAY: Duration = Duration::from_millis(200);

impl<T: Transport, const L: usize> CommandChannel<T, L> {
    /// Write `command` to every supply and wait out [`GROUP_SETTLE_DELAY`]. Nothing is read.
    ///
    /// The addressing registry is left untouched: supplies keep listening to whoever was
    /// addressed before.
    pub fn broadcast(&mut self, command: &str) -> Result<(), T::Error> {
        let transport = self.transport_mut();
        let mut bytes = Vec::with_capacity(command.len() + 1);
        bytes.extend_from_slice(command.as_bytes());
        bytes.push(TERMINATOR);

        log::trace!("{} <= {:?}", transport.port_name(), command);
        transport.write_all(&bytes).map_err(Error::SerialError)?;
        transport.flush().map_err(Error::SerialError)?;
        transport.delay(GROUP_SETTLE_DELAY);
        Ok(())
    }
}

/// Group commands over a channel shared with [`crate::session::DeviceSession`]s.
pub struct Broadcast<T: Transport, const L: usize = 128> {
    channel: SharedChannel<T, L>,
}

impl<T: Transport, const L: usize> Broadcast<T, L> {
    pub fn new(channel: SharedChannel<T, L>) -> Self {
        Self { channel }
    }

    /// Reset every supply, see [`crate::session::DeviceSession::reset`].
    pub fn group_reset(&self) -> Result<(), T::Error> {
        self.broadcast("GRST")
    }

    /// Program the same voltage on every supply.
    ///
    /// There is no envelope to check against, each supply refuses what it cannot do on its own.
    pub fn group_program_voltage(&self, volts: f64) -> Result<(), T::Error> {
        Self::check_value(volts)?;
        self.broadcast(&format!("GPV {}", format_group_value(volts)))
    }

    /// Program the same current limit on every supply.
    pub fn group_program_current(&self, amperes: f64) -> Result<(), T::Error> {
        Self::check_value(amperes)?;
        self.broadcast(&format!("GPC {}", format_group_value(amperes)))
    }

    pub fn group_set_output(&self, state: impl Into<State>) -> Result<(), T::Error> {
        self.broadcast(&format!("GOUT {}", state.into()))
    }

    pub fn group_save_settings(&self) -> Result<(), T::Error> {
        self.broadcast("GSAV")
    }

    pub fn group_recall_settings(&self) -> Result<(), T::Error> {
        self.broadcast("GRCL")
    }

    fn broadcast(&self, command: &str) -> Result<(), T::Error> {
        self.channel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .broadcast(command)
    }

    fn check_value(value: f64) -> Result<(), T::Error> {
        if value.is_finite() && value >= 0.0 {
            Ok(())
        } else {
            Err(Error::InvalidArgument("group value must be a finite, non-negative number"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Instant,
    };

    use super::*;
    use crate::{mock_serial::MockSerial, transport::Address};

    fn shared(mock: MockSerial) -> SharedChannel<MockSerial, 64> {
        Arc::new(Mutex::new(CommandChannel::new(mock).unwrap()))
    }

    fn written(channel: &SharedChannel<MockSerial, 64>) -> String {
        channel.lock().unwrap().transport().written_text().to_owned()
    }

    #[test]
    fn group_voltage_awaits_no_reply() {
        let channel = shared(MockSerial::new());
        let group = Broadcast::new(channel.clone());

        group.group_program_voltage(5.0).unwrap();
        assert_eq!(written(&channel), "GPV 05.000\r");
        assert_eq!(
            channel.lock().unwrap().transport().delays(),
            &[GROUP_SETTLE_DELAY]
        );
    }

    #[test]
    fn group_voltage_blocks_for_the_settle_delay() {
        let mut mock = MockSerial::new();
        mock.set_real_delay(true);
        let group = Broadcast::new(shared(mock));

        let started = Instant::now();
        group.group_program_voltage(12.5).unwrap();
        assert!(started.elapsed() >= GROUP_SETTLE_DELAY);
    }

    #[test]
    fn every_group_command() {
        let channel = shared(MockSerial::new());
        let group = Broadcast::new(channel.clone());

        group.group_reset().unwrap();
        group.group_program_current(1.25).unwrap();
        group.group_set_output(true).unwrap();
        group.group_save_settings().unwrap();
        group.group_recall_settings().unwrap();
        group.group_program_voltage(123.456).unwrap();
        assert_eq!(
            written(&channel),
            "GRST\rGPC 01.250\rGOUT ON\rGSAV\rGRCL\rGPV 123.456\r"
        );
    }

    #[test]
    fn bad_group_values_are_refused_locally() {
        let channel = shared(MockSerial::new());
        let group = Broadcast::new(channel.clone());

        assert!(matches!(
            group.group_program_voltage(f64::NAN),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            group.group_program_current(-1.0),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(written(&channel), "");
    }

    #[test]
    fn broadcast_leaves_addressing_alone() {
        let channel = shared(MockSerial::with_replies(b"OK\rOK\rOK\r"));
        let address = Address::try_from(3).unwrap();
        let group = Broadcast::new(channel.clone());

        channel.lock().unwrap().imperative(address, "OUT ON").unwrap();
        group.group_set_output(false).unwrap();
        channel.lock().unwrap().imperative(address, "OUT ON").unwrap();

        let channel = channel.lock().unwrap();
        assert_eq!(channel.transport().written_text(), "ADR 03\rOUT ON\rGOUT OFF\rOUT ON\r");
        assert_eq!(channel.last_command(), "OUT ON");
        assert_eq!(channel.registry().listening("COM1"), Some(address));
    }

    #[test]
    fn write_failure_is_the_only_failure() {
        let mut mock = MockSerial::new();
        mock.set_write_error(true);
        let group = Broadcast::new(shared(mock));
        assert!(matches!(group.group_reset(), Err(Error::SerialError(_))));
    }
}

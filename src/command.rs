//! The textual command/response side of the Genesys protocol.
//!
//! Every command is ASCII terminated by `\r`, and so is every reply. Commands come in two
//! kinds which the channel keeps apart:
//!
//! * __Imperative__ commands (`PV 12.000`, `OUT ON`) never end in `?` and are answered `OK`.
//! * __Interrogative__ commands (`PV?`, `IDN?`) end in `?` and are answered with a value, never `OK`.
//!
//! The checksum framing of the Genesys manual (paragraph 7.5.5) is not used.

use core::time::Duration;

use embedded_io::Error as _;

use crate::{
    error::{Error, Result},
    fast_query::FastQuery,
    registry::AddressRegistry,
    transport::{Address, BaudRate, Transport},
};

/// Terminates every command and every reply.
pub const TERMINATOR: u8 = b'\r';
/// Reply to every accepted imperative command.
pub const ACKNOWLEDGE: &str = "OK";
/// Makes the listening supply re-execute whatever it executed last.
pub const REPEAT_LAST_COMMAND: &str = "\\";
/// Turnaround time a supply needs between receiving a command and replying.
pub const COMMAND_SETTLE_DELAY: Duration = Duration::from_millis(150);

/// One serial bus shared by up to 31 supplies.
///
/// The channel owns the transport and the [`AddressRegistry`] for it. `L` is the capacity of
/// the buffer a reply line is collected in.
///
/// Wrap it in `Arc<Mutex<_>>` to drive several [`crate::session::DeviceSession`]s over it.
pub struct CommandChannel<T: Transport, const L: usize = 128> {
    transport: T,
    registry: AddressRegistry,
    last_command: String,
    last_response: String,
}

impl<T: Transport, const L: usize> CommandChannel<T, L> {
    /// Create a channel over `transport`, refusing unsupported baud rates.
    pub fn new(transport: T) -> Result<Self, T::Error> {
        Self::with_registry(transport, AddressRegistry::new())
    }

    /// Create a channel that carries on from an existing registry, e.g. one taken from a
    /// previous channel on the same port with [`Self::into_parts`].
    pub fn with_registry(transport: T, registry: AddressRegistry) -> Result<Self, T::Error> {
        let baud_rate = BaudRate::of(&transport)?;
        log::debug!("{}: opened at {} baud", transport.port_name(), u32::from(baud_rate));
        Ok(Self {
            transport,
            registry,
            last_command: String::new(),
            last_response: String::new(),
        })
    }

    pub fn into_parts(self) -> (T, AddressRegistry) {
        (self.transport, self.registry)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn registry(&self) -> &AddressRegistry {
        &self.registry
    }

    /// The last command written, without its terminator.
    pub fn last_command(&self) -> &str {
        &self.last_command
    }

    /// The last reply read, without its terminator.
    pub fn last_response(&self) -> &str {
        &self.last_response
    }

    /// Send an imperative command to `address` and require `OK`.
    ///
    /// # Panics
    ///
    /// If `command` ends in `?`.
    pub fn imperative(&mut self, address: Address, command: &str) -> Result<(), T::Error> {
        assert!(
            !command.ends_with('?'),
            "imperative command {command:?} must not end in '?'"
        );
        let response = self.write_command_read_response(address, command)?;
        if response == ACKNOWLEDGE {
            Ok(())
        } else {
            Err(self.mismatch(command, response))
        }
    }

    /// Send an interrogative command to `address` and return the raw reply.
    ///
    /// # Panics
    ///
    /// If `command` does not end in `?`.
    pub fn interrogative(&mut self, address: Address, command: &str) -> Result<String, T::Error> {
        assert!(
            command.ends_with('?'),
            "interrogative command {command:?} must end in '?'"
        );
        let response = self.write_command_read_response(address, command)?;
        if response == ACKNOWLEDGE {
            Err(self.mismatch(command, response))
        } else {
            Ok(response)
        }
    }

    /// Have `address` re-execute its last command and return whatever it answers.
    ///
    /// The supply does not say what its last command was, so there is no telling whether the
    /// reply is an acknowledgement or a value: `OK` is returned like any other reply.
    pub fn repeat_last_command(&mut self, address: Address) -> Result<String, T::Error> {
        self.write_command_read_response(address, REPEAT_LAST_COMMAND)
    }

    /// Fast queries over this channel's transport. They bypass the addressing registry.
    pub fn fast_query(&mut self) -> FastQuery<'_, T> {
        FastQuery::new(&mut self.transport)
    }

    /// Address (if needed), write, wait out the turnaround time, read one reply line.
    fn write_command_read_response(
        &mut self,
        address: Address,
        command: &str,
    ) -> Result<String, T::Error> {
        if self.registry.listening(self.transport.port_name()) != Some(address) {
            self.last_command = format!("ADR {address}");
            self.last_response.clear();
        }
        if let Err(e) = self
            .registry
            .ensure_addressed::<T, L>(&mut self.transport, address)
        {
            if let Error::ProtocolMismatch { response, .. } = &e {
                self.last_response.clone_from(response);
            }
            return Err(e);
        }

        let mut bytes = Vec::with_capacity(command.len() + 1);
        bytes.extend_from_slice(command.as_bytes());
        bytes.push(TERMINATOR);

        log::trace!("{} <- {:?}", self.transport.port_name(), command);
        self.last_command.clear();
        self.last_command.push_str(command);
        self.transport
            .write_all(&bytes)
            .map_err(Error::SerialError)?;
        self.transport.flush().map_err(Error::SerialError)?;
        self.transport.delay(COMMAND_SETTLE_DELAY);

        let response = read_line::<T, L>(&mut self.transport)?;
        log::trace!("{} -> {:?}", self.transport.port_name(), response);
        self.last_response.clone_from(&response);
        Ok(response)
    }

    fn mismatch(&self, command: &str, response: String) -> Error<T::Error> {
        log::warn!(
            "{}: {:?} answered {:?}",
            self.transport.port_name(),
            command,
            response
        );
        Error::ProtocolMismatch {
            command: command.to_owned(),
            response,
        }
    }
}

/// Read one reply up to the terminator, which is stripped.
///
/// Like a blocking serial `readline`, a read timeout ends the line with whatever has arrived.
/// A reply longer than `L` is still read up to its terminator, so the next reply starts clean,
/// and then reported as [`Error::BufferError`].
pub(crate) fn read_line<T: Transport, const L: usize>(transport: &mut T) -> Result<String, T::Error> {
    let mut line: heapless::Vec<u8, L> = heapless::Vec::new();
    let mut overflowed = false;
    let mut byte = [0u8; 1];
    loop {
        match transport.read(&mut byte) {
            Ok(0) => break,
            Ok(_) if byte[0] == TERMINATOR => break,
            Ok(_) => overflowed |= line.push(byte[0]).is_err(),
            Err(e) if matches!(e.kind(), embedded_io::ErrorKind::TimedOut) => break,
            Err(e) => return Err(Error::SerialError(e)),
        }
    }
    if overflowed {
        log::warn!("{}: reply longer than {} bytes dropped", transport.port_name(), L);
        return Err(Error::BufferError);
    }
    String::from_utf8(line.to_vec()).map_err(|_| Error::InvalidResponse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_serial::MockSerial;

    fn channel(replies: &[u8]) -> CommandChannel<MockSerial, 64> {
        CommandChannel::new(MockSerial::with_replies(replies)).unwrap()
    }

    fn address(value: u8) -> Address {
        Address::try_from(value).unwrap()
    }

    #[test]
    fn unsupported_baud_rate_is_refused() {
        let mut mock = MockSerial::new();
        mock.set_baud_rate(115200);
        let result = CommandChannel::<_, 64>::new(mock);
        assert!(matches!(result, Err(Error::UnsupportedBaudRate(115200))));
    }

    #[test]
    fn imperative_accepts_ok() {
        let mut channel = channel(b"OK\rOK\r");
        channel.imperative(address(6), "OUT ON").unwrap();

        assert_eq!(channel.transport().written_text(), "ADR 06\rOUT ON\r");
        assert_eq!(
            channel.transport().delays(),
            &[COMMAND_SETTLE_DELAY, COMMAND_SETTLE_DELAY]
        );
        assert_eq!(channel.last_command(), "OUT ON");
        assert_eq!(channel.last_response(), "OK");
    }

    #[test]
    fn imperative_rejects_anything_but_ok() {
        let mut channel = channel(b"OK\rE04\r");
        match channel.imperative(address(6), "PV 99.000") {
            Err(Error::ProtocolMismatch { command, response }) => {
                assert_eq!(command, "PV 99.000");
                assert_eq!(response, "E04");
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn imperative_rejects_silence() {
        let mut channel = channel(b"OK\r");
        assert!(matches!(
            channel.imperative(address(6), "OUT ON"),
            Err(Error::ProtocolMismatch { .. })
        ));
    }

    #[test]
    fn interrogative_returns_reply() {
        let mut channel = channel(b"OK\rLAMBDA,GEN40-38\r");
        let reply = channel.interrogative(address(0), "IDN?").unwrap();
        assert_eq!(reply, "LAMBDA,GEN40-38");
        assert_eq!(channel.last_response(), "LAMBDA,GEN40-38");
    }

    #[test]
    fn interrogative_rejects_ok() {
        let mut channel = channel(b"OK\rOK\r");
        assert!(matches!(
            channel.interrogative(address(0), "PV?"),
            Err(Error::ProtocolMismatch { .. })
        ));
    }

    #[test]
    #[should_panic]
    fn imperative_refuses_question() {
        let mut channel = channel(b"");
        let _ = channel.imperative(address(0), "PV?");
    }

    #[test]
    #[should_panic]
    fn interrogative_refuses_statement() {
        let mut channel = channel(b"");
        let _ = channel.interrogative(address(0), "PV 1.000");
    }

    #[test]
    fn repeat_last_command_passes_ok_through() {
        let mut channel = channel(b"OK\rOK\rOK\r");
        channel.imperative(address(2), "OUT ON").unwrap();
        assert_eq!(channel.repeat_last_command(address(2)).unwrap(), "OK");
        assert_eq!(channel.transport().written_text(), "ADR 02\rOUT ON\r\\\r");
    }

    #[test]
    fn repeat_last_command_passes_values_through() {
        let mut channel = channel(b"OK\r12.000\r12.000\r");
        channel.interrogative(address(2), "PV?").unwrap();
        assert_eq!(channel.repeat_last_command(address(2)).unwrap(), "12.000");
    }

    #[test]
    fn commands_to_two_supplies_readdress_once_per_switch() {
        let mut channel = channel(b"OK\rOK\rOK\rOK\rOK\rOK\r");
        channel.imperative(address(1), "OUT ON").unwrap();
        channel.imperative(address(1), "OUT OFF").unwrap();
        channel.imperative(address(2), "OUT ON").unwrap();
        channel.imperative(address(2), "OUT OFF").unwrap();

        let written = channel.transport().written_text();
        assert_eq!(written.matches("ADR").count(), 2);
        assert_eq!(written, "ADR 01\rOUT ON\rOUT OFF\rADR 02\rOUT ON\rOUT OFF\r");
    }

    #[test]
    fn failed_addressing_is_the_last_command() {
        let mut channel = channel(b"E01\r");
        assert!(matches!(
            channel.imperative(address(2), "OUT ON"),
            Err(Error::ProtocolMismatch { .. })
        ));
        assert_eq!(channel.last_command(), "ADR 02");
        assert_eq!(channel.last_response(), "E01");
        assert_eq!(channel.transport().written_text(), "ADR 02\r");
    }

    #[test]
    fn registry_survives_channel() {
        let mut channel = channel(b"OK\rOK\r");
        channel.imperative(address(4), "CLS").unwrap();
        let (_, registry) = channel.into_parts();

        let mut next =
            CommandChannel::<_, 64>::with_registry(MockSerial::with_replies(b"OK\r"), registry)
                .unwrap();
        next.imperative(address(4), "CLS").unwrap();
        assert_eq!(next.transport().written_text(), "CLS\r");
    }

    #[test]
    fn oversized_reply_is_buffer_error() {
        let mut channel: CommandChannel<MockSerial, 4> =
            CommandChannel::new(MockSerial::with_replies(b"OK\rLAMBDA,GEN40-38\r")).unwrap();
        assert!(matches!(
            channel.interrogative(address(0), "IDN?"),
            Err(Error::BufferError)
        ));
    }

    #[test]
    fn oversized_reply_is_drained() {
        let mut channel: CommandChannel<MockSerial, 8> =
            CommandChannel::new(MockSerial::with_replies(b"OK\rLAMBDA,GEN40-38\r12.000\r")).unwrap();
        assert!(matches!(
            channel.interrogative(address(0), "IDN?"),
            Err(Error::BufferError)
        ));
        assert_eq!(channel.interrogative(address(0), "PV?").unwrap(), "12.000");
    }

    #[test]
    fn read_failure_is_propagated() {
        let mut mock = MockSerial::new();
        mock.set_read_error(true);
        let mut channel = CommandChannel::<_, 64>::new(mock).unwrap();
        assert!(matches!(
            channel.imperative(address(0), "CLS"),
            Err(Error::SerialError(_))
        ));
    }
}

//! Bookkeeping of which supply is listening on each bus.
//!
//! A Genesys supply selected with `ADR n` keeps listening until another address is selected,
//! so the `ADR` frame only has to be sent when the next command targets a different supply.
//! This is only sound while nobody else talks on the bus between the check and the command
//! that follows it. [`crate::command::CommandChannel`] owns the registry next to the
//! transport, and [`crate::session::DeviceSession`] holds the channel's lock for the whole
//! exchange.

use std::collections::HashMap;

use crate::{
    command::{self, ACKNOWLEDGE, COMMAND_SETTLE_DELAY, TERMINATOR},
    error::{Error, Result},
    transport::{Address, Transport},
};

/// Maps a transport's [`Transport::port_name`] to the address currently listening on it.
#[derive(Debug, Default, Clone)]
pub struct AddressRegistry {
    listening: HashMap<String, Address>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The supply believed to be listening on `port`, if any.
    pub fn listening(&self, port: &str) -> Option<Address> {
        self.listening.get(port).copied()
    }

    /// Drop what we know about `port`, forcing the next command to re-address.
    pub fn forget(&mut self, port: &str) {
        self.listening.remove(port);
    }

    /// Select `address` on the bus unless it is already listening.
    ///
    /// Returns whether an `ADR` frame was sent. On a failed selection the entry is dropped, as
    /// nothing is known about who listens anymore.
    pub fn ensure_addressed<T: Transport, const L: usize>(
        &mut self,
        transport: &mut T,
        address: Address,
    ) -> Result<bool, T::Error> {
        if self.listening(transport.port_name()) == Some(address) {
            return Ok(false);
        }
        self.forget(transport.port_name());

        let frame = format!("ADR {address}");
        log::debug!("{}: addressing {}", transport.port_name(), address);
        let mut bytes = frame.clone().into_bytes();
        bytes.push(TERMINATOR);
        transport.write_all(&bytes).map_err(Error::SerialError)?;
        transport.flush().map_err(Error::SerialError)?;
        transport.delay(COMMAND_SETTLE_DELAY);

        let response = command::read_line::<T, L>(transport)?;
        if response != ACKNOWLEDGE {
            log::warn!(
                "{}: {} answered {:?}",
                transport.port_name(),
                frame,
                response
            );
            return Err(Error::ProtocolMismatch {
                command: frame,
                response,
            });
        }

        self.listening
            .insert(transport.port_name().to_owned(), address);
        Ok(true)
    }
}

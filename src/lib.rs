//! This crate provides an interface for communicating with and controlling TDK-Lambda Genesys
//! programmable power supplies.
//!
//! Up to 31 supplies share one RS-232 or RS-485 multi-drop bus. Each has an address from 0 to
//! 30 and only the supply most recently selected with `ADR` answers. The crate keeps track of
//! who is listening so that the selection is only repeated when needed.
//!
//! Example models this should work with:
//! * GEN6-100 through GEN600-1.3 (1U, 750 W)
//! * GEN6-200 through GEN600-2.6 (1U, 1500 W)
//!
//! The serial port used for comms should be configured like so:
//! * Baud rate: 1200, 2400, 4800, 9600 or 19200 (front panel setting, default 9600)
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//!
//! Start with a [`command::CommandChannel`] over anything implementing [`transport::Transport`],
//! share it in an `Arc<Mutex<_>>`, and open a [`session::DeviceSession`] per supply.

pub mod broadcast;
pub mod capability;
pub mod command;
pub mod error;
pub mod fast_query;
pub mod range;
pub mod register;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
mod mock_serial;

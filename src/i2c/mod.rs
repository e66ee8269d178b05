// Licensed under the Apache-2.0 license

//! Interrupt-driven I2C transaction engine.
//!
//! This module drives LPC-style byte-oriented controllers for two roles: a
//! local-master sensor bus and an IPMB link that is both master (replies) and
//! slave (requests). It is designed for bare-metal and `no_std` firmware
//! with one interrupt vector per controller and blocking task callers.

pub mod address;
pub mod common;
pub mod completion;
pub mod engine;
pub mod i2c_controller;
pub mod mode;
pub mod state_machine;
pub mod status;
#[cfg(any(test, feature = "std"))]
pub mod std_support;
pub mod traits;

#[cfg(test)]
pub(crate) mod sim;

pub use address::{AddressResolver, BusAddress, FixedAddress};
pub use common::{ChannelConfig, ChannelConfigBuilder, Error, Fault, Millis, MAX_MSG_LENGTH};
pub use engine::Engine;
pub use i2c_controller::I2cController;
pub use mode::{Channel, ChannelId, IpmbSlave, LocalMaster};
pub use state_machine::{Phase, Trace};
pub use traits::{BusController, Clock, Control, Signal};

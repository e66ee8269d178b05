// Licensed under the Apache-2.0 license

//! Common types and constants for the I2C transaction engine.
//!
//! This module provides the shared error taxonomy, sizing constants and the
//! per-channel configuration used across the engine, the IPMB layer and the
//! embedded-hal adapter.

use core::fmt;

/// Longest payload a single transaction or slave frame may carry.
pub const MAX_MSG_LENGTH: usize = 32;

/// Completed slave frames buffered per channel before new ones are dropped.
pub const FRAME_QUEUE_DEPTH: usize = 4;

/// Entries kept in the per-channel interrupt trace ring.
pub const TRACE_DEPTH: usize = 32;

/// Millisecond duration used for every timeout in the crate.
pub type Millis = fugit::MillisDurationU64;

/// Millisecond instant produced by a [`Clock`](super::traits::Clock).
pub type Instant = fugit::TimerInstantU64<1000>;

/// Errors surfaced to task-level callers.
///
/// Everything that goes wrong on the wire collapses into `Failure`; the
/// precise [`Fault`] is kept in the channel trace.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The bus transaction did not complete.
    Failure,
    /// No completion (or channel lock) within the caller's timeout.
    Timeout,
    /// A buffer or frame exceeds [`MAX_MSG_LENGTH`] or the caller's buffer.
    BufferOverflow,
    /// Address outside the usable 7-bit range.
    InvalidAddress,
    /// Channel identifier outside the engine's table.
    InvalidChannel,
    AlreadyInitialized,
    NotInitialized,
    /// The operation sequence cannot be expressed as one engine request.
    Unsupported,
}

impl Error {
    /// True for the outcomes a caller sees as a failed transfer: a bus fault
    /// or a transfer abandoned at its timeout.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Error::Failure | Error::Timeout)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::Failure => "bus transaction failed",
            Error::Timeout => "timed out",
            Error::BufferOverflow => "buffer exceeds maximum message length",
            Error::InvalidAddress => "invalid bus address",
            Error::InvalidChannel => "invalid channel",
            Error::AlreadyInitialized => "channel already initialized",
            Error::NotInitialized => "channel not initialized",
            Error::Unsupported => "unsupported operation sequence",
        };
        f.write_str(msg)
    }
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        match self {
            Error::BufferOverflow => embedded_hal::i2c::ErrorKind::Overrun,
            _ => embedded_hal::i2c::ErrorKind::Other,
        }
    }
}

/// What went wrong inside the interrupt handler.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    BusError,
    ArbitrationLost,
    AddressNotAcknowledged,
    DataNotAcknowledged,
    /// Status code with no transition from the current phase.
    UnexpectedStatus(u8),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::BusError => f.write_str("bus error"),
            Fault::ArbitrationLost => f.write_str("arbitration lost"),
            Fault::AddressNotAcknowledged => f.write_str("address not acknowledged"),
            Fault::DataNotAcknowledged => f.write_str("data not acknowledged"),
            Fault::UnexpectedStatus(code) => write!(f, "unexpected status {code:#04x}"),
        }
    }
}

impl From<Fault> for Error {
    fn from(_: Fault) -> Self {
        Error::Failure
    }
}

/// Per-channel settings fixed at initialization.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Accept frames sent to the general-call address (slave channels only).
    pub general_call: bool,
    /// Timeout applied by the request methods that do not take one.
    /// `None` waits forever.
    pub default_timeout: Option<Millis>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfigBuilder::new().build()
    }
}

pub struct ChannelConfigBuilder {
    general_call: bool,
    default_timeout: Option<Millis>,
}

impl Default for ChannelConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            general_call: false,
            default_timeout: None,
        }
    }
    #[must_use]
    pub fn general_call(mut self, enabled: bool) -> Self {
        self.general_call = enabled;
        self
    }
    #[must_use]
    pub fn default_timeout(mut self, timeout: Option<Millis>) -> Self {
        self.default_timeout = timeout;
        self
    }
    #[must_use]
    pub fn build(self) -> ChannelConfig {
        ChannelConfig {
            general_call: self.general_call,
            default_timeout: self.default_timeout,
        }
    }
}

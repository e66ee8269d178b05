// Licensed under the Apache-2.0 license

//! # I2C Engine Collaborator Traits
//!
//! The transaction engine never touches registers, schedulers or timers
//! directly. It is written against three small traits, each with a single
//! responsibility:
//!
//! ```text
//! BusController  (register-level access to one controller instance)
//! Signal         (binary wait/raise, raise is interrupt safe)
//! Clock          (monotonic milliseconds for timeouts)
//! ```
//!
//! A firmware image provides one implementation of each for its platform
//! (an LPC-style controller block, an RTOS semaphore, a SysTick counter).
//! Host builds get [`StdSignal`](super::std_support::StdSignal) and
//! [`StdClock`](super::std_support::StdClock).

use bitflags::bitflags;

use crate::i2c::common::{Instant, Millis};

bitflags! {
    /// Control register bits of an LPC-style I2C controller.
    ///
    /// Bits are written through separate set and clear registers, so
    /// setting one bit never disturbs the others.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Control: u8 {
        /// Acknowledge-enable (AA). While set the controller ACKs its own
        /// slave address and received data bytes.
        const ACK = 1 << 2;
        /// Interrupt flag (SI). Set by hardware on every state change;
        /// clearing it lets the controller continue.
        const INTERRUPT = 1 << 3;
        /// Stop flag (STO). Cleared by hardware once the stop is sent.
        const STOP = 1 << 4;
        /// Start flag (STA).
        const START = 1 << 5;
        /// Interface enable (I2EN).
        const ENABLE = 1 << 6;
    }
}

impl Default for Control {
    fn default() -> Self {
        Control::empty()
    }
}

/// Register-level access to a single bus controller.
///
/// All methods are called with the channel's critical section held, either
/// from task context (arming a transaction) or from the interrupt handler.
///
/// # Examples
///
/// ```rust,ignore
/// fn release_bus<B: BusController>(bus: &mut B) {
///     bus.clear_control(Control::START);
///     bus.set_control(Control::STOP);
///     bus.clear_control(Control::INTERRUPT);
/// }
/// ```
pub trait BusController {
    /// Current protocol status code (I2STAT).
    fn status(&self) -> u8;

    /// Set the given control bits, leaving the rest untouched.
    fn set_control(&mut self, bits: Control);

    /// Clear the given control bits, leaving the rest untouched.
    ///
    /// Clearing [`Control::INTERRUPT`] releases the controller to perform the
    /// next bus action, so it must be the last register access of a step.
    fn clear_control(&mut self, bits: Control);

    /// Load the data register (address byte or data byte to transmit).
    fn write_data(&mut self, byte: u8);

    /// Last byte shifted in from the bus.
    fn read_data(&self) -> u8;

    /// Program the own slave address (7-bit) and general-call acceptance.
    fn set_own_address(&mut self, address: u8, general_call: bool);
}

/// Binary wake-up primitive shared between a waiting task and a raiser.
///
/// Semantics follow a binary semaphore: a `raise` with no waiter is latched
/// and satisfies the next `wait`. Spurious wake-ups are allowed; callers
/// re-check their condition.
pub trait Signal {
    /// Block until raised or until `timeout` elapses. `None` waits forever.
    /// Returns `true` if the signal was raised.
    fn wait(&self, timeout: Option<Millis>) -> bool;

    /// Wake one waiter. Must not block; called from interrupt context.
    fn raise(&self);
}

/// Monotonic millisecond time source.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Time left until `deadline`, or `None` once it has passed.
pub(crate) fn remaining<C: Clock>(clock: &C, deadline: Instant) -> Option<Millis> {
    deadline
        .checked_duration_since(clock.now())
        .filter(|left| left.ticks() > 0)
}

// Licensed under the Apache-2.0 license

//! Per-channel wait primitives: the transaction completion notice and the
//! channel lock.

use core::cell::Cell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;

use crate::i2c::common::Instant;
use crate::i2c::traits::{remaining, Clock, Signal};

/// One-shot notice from the interrupt handler to the caller that armed
/// transaction `seq`.
///
/// The handler publishes `seq` with `Release` before raising the signal; the
/// waiter only trusts the signal after observing its own `seq` with
/// `Acquire`, so latched raises left over from an abandoned transaction are
/// absorbed as spurious wake-ups.
pub struct Completion<S> {
    posted: AtomicU32,
    signal: S,
}

impl<S: Signal + Default> Default for Completion<S> {
    fn default() -> Self {
        Self {
            posted: AtomicU32::new(0),
            signal: S::default(),
        }
    }
}

impl<S: Signal> Completion<S> {
    /// Interrupt side. Called at most once per sequence number.
    pub fn complete(&self, seq: u32) {
        self.posted.store(seq, Ordering::Release);
        self.signal.raise();
    }

    #[must_use]
    pub fn is_complete(&self, seq: u32) -> bool {
        self.posted.load(Ordering::Acquire) == seq
    }

    /// Block until `seq` has completed or `deadline` passes.
    pub fn wait<C: Clock>(&self, seq: u32, deadline: Option<Instant>, clock: &C) -> bool {
        loop {
            if self.is_complete(seq) {
                return true;
            }
            let timeout = match deadline {
                None => None,
                Some(deadline) => match remaining(clock, deadline) {
                    Some(left) => Some(left),
                    None => return self.is_complete(seq),
                },
            };
            if !self.signal.wait(timeout) {
                return self.is_complete(seq);
            }
        }
    }
}

/// Exclusive access to a channel, held for a whole transaction.
pub struct ChannelLock<S> {
    held: Mutex<Cell<bool>>,
    released: S,
}

impl<S: Signal + Default> Default for ChannelLock<S> {
    fn default() -> Self {
        Self {
            held: Mutex::new(Cell::new(false)),
            released: S::default(),
        }
    }
}

impl<S: Signal> ChannelLock<S> {
    pub fn try_acquire(&self) -> Option<LockGuard<'_, S>> {
        let taken = critical_section::with(|cs| {
            let held = self.held.borrow(cs);
            if held.get() {
                false
            } else {
                held.set(true);
                true
            }
        });
        taken.then(|| LockGuard { lock: self })
    }

    /// Wait for the lock until `deadline`. `None` waits forever.
    pub fn acquire<C: Clock>(
        &self,
        deadline: Option<Instant>,
        clock: &C,
    ) -> Option<LockGuard<'_, S>> {
        loop {
            if let Some(guard) = self.try_acquire() {
                return Some(guard);
            }
            let timeout = match deadline {
                None => None,
                Some(deadline) => Some(remaining(clock, deadline)?),
            };
            if !self.released.wait(timeout) {
                return self.try_acquire();
            }
        }
    }

    fn release(&self) {
        critical_section::with(|cs| self.held.borrow(cs).set(false));
        self.released.raise();
    }
}

/// Releases the channel lock on drop.
pub struct LockGuard<'a, S: Signal> {
    lock: &'a ChannelLock<S>,
}

impl<S: Signal> Drop for LockGuard<'_, S> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

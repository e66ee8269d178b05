// Licensed under the Apache-2.0 license

//! Host implementations of [`Signal`] and [`Clock`].

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant as StdInstant};

use crate::i2c::common::{Instant, Millis};
use crate::i2c::traits::{Clock, Signal};

/// Binary semaphore built from a mutex and a condition variable.
#[derive(Default)]
pub struct StdSignal {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl Signal for StdSignal {
    fn wait(&self, timeout: Option<Millis>) -> bool {
        let guard = self.raised.lock().unwrap_or_else(PoisonError::into_inner);
        let mut raised = match timeout {
            None => self
                .cond
                .wait_while(guard, |raised| !*raised)
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                self.cond
                    .wait_timeout_while(guard, Duration::from_millis(timeout.ticks()), |raised| {
                        !*raised
                    })
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };
        core::mem::replace(&mut *raised, false)
    }

    fn raise(&self) {
        let mut raised = self.raised.lock().unwrap_or_else(PoisonError::into_inner);
        *raised = true;
        self.cond.notify_one();
    }
}

/// Milliseconds since construction.
#[derive(Copy, Clone, Debug)]
pub struct StdClock {
    origin: StdInstant,
}

impl StdClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: StdInstant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now(&self) -> Instant {
        let elapsed = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        Instant::from_ticks(elapsed)
    }
}

// Licensed under the Apache-2.0 license

//! Crate-wide logging hooks.
//!
//! Drivers take a [`Logger`] as a generic parameter so that firmware builds
//! without a console pay nothing (`NoOpLogger`), while builds with one can
//! forward to the `log` facade (`LogFacade`). Every method takes
//! `core::fmt::Arguments`, so logging from interrupt context never allocates.

use core::fmt::Arguments;

/// Severity of a log record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<Level> for log::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Error => log::Level::Error,
            Level::Warn => log::Level::Warn,
            Level::Info => log::Level::Info,
            Level::Debug => log::Level::Debug,
            Level::Trace => log::Level::Trace,
        }
    }
}

/// Sink for driver diagnostics.
///
/// Implementations must not block: the transaction engine logs from its
/// interrupt handler.
pub trait Logger {
    fn log(&self, level: Level, args: Arguments<'_>);

    fn error(&self, args: Arguments<'_>) {
        self.log(Level::Error, args);
    }

    fn warn(&self, args: Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    fn info(&self, args: Arguments<'_>) {
        self.log(Level::Info, args);
    }

    fn debug(&self, args: Arguments<'_>) {
        self.log(Level::Debug, args);
    }
}

/// Discards everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn log(&self, _level: Level, _args: Arguments<'_>) {}
}

/// Forwards records to whatever `log` backend the firmware installed.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogFacade;

impl Logger for LogFacade {
    fn log(&self, level: Level, args: Arguments<'_>) {
        log::log!(target: "ipmc_i2c", level.into(), "{}", args);
    }
}

impl<T: Logger + ?Sized> Logger for &T {
    fn log(&self, level: Level, args: Arguments<'_>) {
        (**self).log(level, args);
    }
}

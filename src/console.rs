//! Console, Input and Power Devices
//!
//! The devices themselves are outside this crate. System calls reach them
//! through these traits, without taking the filesystem guard.
//!
//! Also provides [`ConsoleLogger`], a `log` backend that prints to a
//! console.

use core::fmt::Write;

use alloc::string::String;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Once;

/// Console output sink.
pub trait Console: Send + Sync {
    /// Write all of `bytes`. One call is never interleaved with another.
    fn write(&self, bytes: &[u8]);
}

/// Keyboard or serial input.
pub trait InputDevice: Send + Sync {
    /// Block until a byte is available and return it.
    fn read_byte(&self) -> u8;
}

/// Machine power control.
pub trait PowerControl: Send + Sync {
    /// Power the machine off.
    fn power_off(&self);
}

/// `log` backend that writes `[LEVEL] target: message` lines to a console.
pub struct ConsoleLogger {
    console: &'static dyn Console,
    level: LevelFilter,
}

impl ConsoleLogger {
    pub const fn new(console: &'static dyn Console, level: LevelFilter) -> Self {
        Self { console, level }
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut line = String::new();
        let _ = writeln!(
            line,
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
        self.console.write(line.as_bytes());
    }

    fn flush(&self) {}
}

static LOGGER: Once<ConsoleLogger> = Once::new();

/// Install a [`ConsoleLogger`] as the global logger.
///
/// Only the first call's console is used. Faults are logged at `Warn` and
/// process exits at `Debug`; when `console` is also the user console, keep
/// `level` at `Error` or give the logger its own sink, or those lines land
/// between a program's output and its exit lines.
pub fn init_logger(console: &'static dyn Console, level: LevelFilter) -> Result<(), SetLoggerError> {
    let logger = LOGGER.call_once(|| ConsoleLogger::new(console, level));
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

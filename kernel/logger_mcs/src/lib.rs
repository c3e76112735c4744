//! A logger for systems where several cores write to one output.
//!
//! Every record is formatted and written while holding a [`CoreLock`], so a
//! line started by one core is always finished before another core's line
//! begins. The output itself is any [`core::fmt::Write`] sink, typically a
//! UART driver.
//!
//! A record is silently dropped if the lock has not been initialized yet or
//! if the current core has no node in the lock. There is nowhere else to
//! report such a failure, and reporting it through `log` would recurse.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

use core::{cell::UnsafeCell, fmt::Write};

use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Once;
use sync_mcs::{CoreId, CoreLock, LockError};

/// See ANSI terminal formatting schemes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogColor {
    Reset,
    Red,
    Green,
    Yellow,
    Purple,
    Cyan,
}

impl LogColor {
    pub const fn as_terminal_string(self) -> &'static str {
        match self {
            LogColor::Red => "\x1b[31m",
            LogColor::Green => "\x1b[32m",
            LogColor::Yellow => "\x1b[33m",
            LogColor::Purple => "\x1b[35m",
            LogColor::Cyan => "\x1b[36m",
            LogColor::Reset => "\x1b[0m",
        }
    }

    /// The color a record of `level` is printed in.
    pub const fn for_level(level: Level) -> Self {
        match level {
            Level::Error => LogColor::Red,
            Level::Warn => LogColor::Yellow,
            Level::Info => LogColor::Green,
            Level::Debug => LogColor::Cyan,
            Level::Trace => LogColor::Purple,
        }
    }
}

/// A cross-core serialized logger writing into a sink of type `W`.
pub struct CoreLogger<W, const CORES: usize> {
    lock: CoreLock<CORES>,
    sink: UnsafeCell<W>,
    current_core: fn() -> CoreId,
    level: LevelFilter,
    colors: bool,
    location: bool,
}

/// A [`CoreLogger`] sized for the configured maximum number of cores.
pub type DefaultCoreLogger<W> = CoreLogger<W, { lock_config::MAX_CORES }>;

// SAFETY: the sink is only reached while holding `lock`.
unsafe impl<W: Send, const CORES: usize> Sync for CoreLogger<W, CORES> {}

impl<W, const CORES: usize> CoreLogger<W, CORES>
where
    W: Write + Send,
{
    /// Creates a logger whose lock is not yet initialized; see [`init`].
    ///
    /// # Safety
    ///
    /// `current_core` must return the id of the core that calls it, and no
    /// two contexts that can log concurrently may get the same id. In
    /// particular, an interrupt handler must not log while it may have
    /// preempted a log call on the same core.
    pub const unsafe fn new(sink: W, current_core: fn() -> CoreId, level: LevelFilter) -> Self {
        Self {
            lock: CoreLock::new(),
            sink: UnsafeCell::new(sink),
            current_core,
            level,
            colors: false,
            location: false,
        }
    }

    /// Wraps every line in the ANSI color of its level.
    pub const fn with_colors(mut self, colors: bool) -> Self {
        self.colors = colors;
        self
    }

    /// Appends ` @file:line` of the logging statement to every line, when
    /// the record carries it.
    pub const fn with_location(mut self, location: bool) -> Self {
        self.location = location;
        self
    }

    /// Initializes the lock without installing the logger.
    pub fn init_lock(&self) {
        self.lock.init();
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Runs `f` on the sink while holding the lock as the current core.
    pub fn with_sink<F, U>(&self, f: F) -> Result<U, LockError>
    where
        F: FnOnce(&mut W) -> U,
    {
        let core = (self.current_core)();
        // SAFETY: `new`'s contract makes `core` unique to this context, and
        // the sink is only touched under the lock.
        unsafe { self.lock.lock_then(core, || f(&mut *self.sink.get())) }
    }
}

impl<W, const CORES: usize> Log for CoreLogger<W, CORES>
where
    W: Write + Send,
{
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let core = (self.current_core)();
        let (color, reset) = if self.colors {
            (
                LogColor::for_level(record.level()).as_terminal_string(),
                LogColor::Reset.as_terminal_string(),
            )
        } else {
            ("", "")
        };
        let location = match (self.location, record.file(), record.line()) {
            (true, Some(file), Some(line)) => Some((file.rsplit('/').next().unwrap_or(file), line)),
            _ => None,
        };

        // result is discarded because we
        // have no alternative way to signal
        // an issue to the user
        let _ = self.with_sink(|sink| {
            write!(
                sink,
                "{}[{}] {} {}: {}",
                color,
                core,
                record.level(),
                record.target(),
                record.args()
            )?;
            if let Some((file, line)) = location {
                write!(sink, " @{}:{}", file, line)?;
            }
            write!(sink, "{}\r\n", reset)
        });
    }

    fn flush(&self) {}
}

/// Initializes `logger`'s lock and installs it as the system-wide logger
/// for the `log` crate, with `max_level` as the global maximum level.
///
/// Bootstrapping code should call this once, on one core, before the other
/// cores start logging.
pub fn init<W, const CORES: usize>(
    logger: &'static CoreLogger<W, CORES>,
    max_level: LevelFilter,
) -> Result<(), &'static str>
where
    W: Write + Send,
{
    logger.init_lock();
    log::set_logger(logger).map_err(|_| "logger_mcs: couldn't set logger")?;
    log::set_max_level(max_level);
    Ok(())
}

/// Stores `logger` in `slot` and installs it as with [`init`].
///
/// This is for sinks that can only be built at runtime, e.g. a UART whose
/// registers must be mapped first.
pub fn init_in<W, const CORES: usize>(
    slot: &'static Once<CoreLogger<W, CORES>>,
    logger: CoreLogger<W, CORES>,
) -> Result<&'static CoreLogger<W, CORES>, &'static str>
where
    W: Write + Send,
{
    if slot.is_completed() {
        return Err("logger_mcs: logger was already initialized");
    }
    let level = logger.level();
    let logger = slot.call_once(|| logger);
    init(logger, level)?;
    Ok(logger)
}

//! Logging macro family.
//!
//! Mirrors the teacher's `hadron_core::kinfo!`/`kwarn!` used throughout
//! `hadron-kernel` (e.g. `fs/vfs.rs`'s `hadron_core::kinfo!("VFS: Mounted
//! {} at {}", ...)`). In host/test builds these forward straight to the
//! `log` crate; a real kernel build would instead forward to a
//! statically-registered sink (a serial port, a ring buffer) without
//! needing `std`, which is why the macros — not direct `log::info!`
//! calls — are the public surface every other crate uses.

/// Logs at info level.
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)+) => {
        $crate::log::__dispatch($crate::log::Level::Info, format_args!($($arg)+))
    };
}

/// Logs at warning level.
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)+) => {
        $crate::log::__dispatch($crate::log::Level::Warn, format_args!($($arg)+))
    };
}

/// Logs at error level.
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)+) => {
        $crate::log::__dispatch($crate::log::Level::Error, format_args!($($arg)+))
    };
}

/// Logs at debug level.
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)+) => {
        $crate::log::__dispatch($crate::log::Level::Debug, format_args!($($arg)+))
    };
}

/// Severity level for [`kinfo!`]/[`kwarn!`]/[`kerror!`]/[`kdebug!`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Diagnostic detail, off by default.
    Debug,
    /// Routine state transitions worth recording.
    Info,
    /// Recoverable anomalies.
    Warn,
    /// Failures that surface to the caller as an [`crate::error::OsError`].
    Error,
}

/// Dispatches a formatted log record to the `log` crate.
///
/// The `log` crate is `no_std`-compatible and queues records through its
/// global logger facade, so this works whether or not a logger has been
/// installed yet (unset loggers simply discard records) — not called
/// directly, use [`kinfo!`]/[`kwarn!`]/[`kerror!`]/[`kdebug!`].
#[doc(hidden)]
pub fn __dispatch(level: Level, args: core::fmt::Arguments<'_>) {
    let level = match level {
        Level::Debug => log::Level::Debug,
        Level::Info => log::Level::Info,
        Level::Warn => log::Level::Warn,
        Level::Error => log::Level::Error,
    };
    log::log!(level, "{}", args);
}

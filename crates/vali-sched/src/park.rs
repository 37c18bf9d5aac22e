//! The seam between this crate's blocking primitives (futex, mutex,
//! condvar) and the scheduler's real context-switch mechanism.
//!
//! Parallels `vali_mm::PageFaultHandler`: a trait the architecture and
//! scheduler layer (out of scope here, see `vali_core::addr`'s doc
//! comment) implements to actually take a kernel thread off the CPU and
//! put another one on. Every blocking call in this crate takes the
//! caller's own [`ThreadId`] explicitly rather than discovering a
//! "current thread" by magic, matching how a kernel always reaches
//! blocking primitives with its own thread object already in hand.

use core::time::Duration;

use vali_core::id::ThreadId;

/// Blocks and wakes kernel threads on behalf of the futex/mutex/condvar
/// primitives in this crate.
pub trait ParkBackend: Send + Sync {
    /// Blocks `thread` (which must be the calling thread) until
    /// [`unpark`](Self::unpark) is called for it or `timeout` elapses.
    /// Returns `true` if woken by `unpark`, `false` on timeout. A
    /// spurious `true` is permitted; callers recheck their condition in
    /// a loop as real futex consumers must.
    fn park(&self, thread: ThreadId, timeout: Option<Duration>) -> bool;

    /// Wakes `thread` if it is currently parked. A no-op otherwise —
    /// the next [`park`](Self::park) call for that thread returns
    /// immediately (matches the futex semantics of not losing a wakeup
    /// that raced ahead of the park call, modulo the caller rechecking
    /// its condition first).
    fn unpark(&self, thread: ThreadId);
}

use vali_core::sync::SpinLock;

static BACKEND: SpinLock<Option<&'static dyn ParkBackend>> = SpinLock::new(None);

/// Installs the scheduler's backend. Must be called once before any
/// blocking primitive in this crate is used.
pub fn init(backend: &'static dyn ParkBackend) {
    *BACKEND.lock() = Some(backend);
}

/// Runs `f` with the installed backend.
///
/// # Panics
///
/// Panics if [`init`] has not been called — calling a blocking
/// primitive before the scheduler backend is installed is a
/// programming error, not a recoverable condition.
pub(crate) fn with_backend<R>(f: impl FnOnce(&'static dyn ParkBackend) -> R) -> R {
    let backend: &'static dyn ParkBackend =
        (*BACKEND.lock()).expect("vali_sched::park::init was not called");
    f(backend)
}

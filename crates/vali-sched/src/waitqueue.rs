//! Blocking wait queue shared by [`crate::FutexTable`], [`crate::Mutex`]
//! and [`crate::Condvar`].
//!
//! The teacher's `hadron_core::sync::WaitQueue` parks a `Waker` and
//! resumes an async task when notified. This crate blocks real kernel
//! threads instead (see `vali_sched::park`'s doc comment for why), so
//! the same bounded-capacity, FIFO-wakeup shape is reused with
//! [`park::ParkBackend`] in place of a waker.

use core::time::Duration;

use planck_noalloc::vec::ArrayVec;

use vali_core::error::{OsError, OsResult};
use vali_core::id::ThreadId;
use vali_core::sync::SpinLock;

use crate::park;

/// A bounded FIFO queue of parked threads.
pub(crate) struct WaitQueue<const N: usize> {
    waiters: SpinLock<ArrayVec<ThreadId, N>>,
}

impl<const N: usize> WaitQueue<N> {
    pub(crate) const fn new() -> Self {
        Self {
            waiters: SpinLock::new(ArrayVec::new()),
        }
    }

    /// Registers `thread`, then blocks it as long as `still_waiting`
    /// returns `true`. The closure is evaluated once under the queue's
    /// lock right after registration, mirroring the futex contract of
    /// rechecking the word immediately before actually parking, so a
    /// wake that raced ahead of registration is not missed.
    pub(crate) fn park_while(
        &self,
        thread: ThreadId,
        still_waiting: impl Fn() -> bool,
        timeout: Option<Duration>,
    ) -> OsResult<()> {
        {
            let mut waiters = self.waiters.lock();
            if !still_waiting() {
                return Ok(());
            }
            if waiters.is_full() {
                return Err(OsError::Busy);
            }
            waiters.push(thread);
        }
        self.park_registered(thread, timeout)
    }

    /// Registers `thread` on the queue without parking it yet. Lets a
    /// caller that must drop some other lock before it actually blocks
    /// (e.g. [`crate::Condvar::wait`] releasing its mutex) enqueue while
    /// that lock is still held, so a wake racing ahead of the drop is
    /// not missed.
    pub(crate) fn register(&self, thread: ThreadId) -> OsResult<()> {
        let mut waiters = self.waiters.lock();
        if waiters.is_full() {
            return Err(OsError::Busy);
        }
        waiters.push(thread);
        Ok(())
    }

    /// Blocks `thread`, already registered via [`register`](Self::register)
    /// or the registration step of [`park_while`](Self::park_while),
    /// until woken or `timeout` elapses.
    pub(crate) fn park_registered(&self, thread: ThreadId, timeout: Option<Duration>) -> OsResult<()> {
        let woken = park::with_backend(|backend| backend.park(thread, timeout));

        let mut waiters = self.waiters.lock();
        if let Some(pos) = waiters.iter().position(|t| *t == thread) {
            waiters.remove(pos);
            if !woken {
                return Err(OsError::Timeout);
            }
        }
        Ok(())
    }

    /// Wakes up to `count` parked threads, FIFO, returning how many
    /// were woken.
    pub(crate) fn wake_n(&self, count: u32) -> u32 {
        let mut woken = 0u32;
        let mut waiters = self.waiters.lock();
        while woken < count {
            if waiters.is_empty() {
                break;
            }
            let thread = waiters.remove(0);
            park::with_backend(|backend| backend.unpark(thread));
            woken += 1;
        }
        woken
    }

    /// Wakes every parked thread.
    pub(crate) fn wake_all(&self) -> u32 {
        self.wake_n(u32::MAX)
    }
}

//! Condition variable (§4.3), used together with [`crate::Mutex`] the
//! way `pthread_cond_wait` pairs with `pthread_mutex_t`.
//!
//! Adapted from the teacher's `hadron_core::sync::Condvar`
//! (`crates/core/hadron-core/src/sync/condvar.rs`), which parks a
//! `Waker` in an `IrqSpinLock<ArrayVec<Waker, MAX_WAITERS>>` and wakes it
//! from the async executor. This crate has no executor, so the same
//! bounded wait list blocks a real kernel thread through
//! [`WaitQueue`](crate::waitqueue::WaitQueue) instead.

use core::time::Duration;

use vali_core::config::MAX_WAITERS_PER_QUEUE;
use vali_core::error::OsResult;
use vali_core::id::ThreadId;

use crate::mutex::{Mutex, MutexGuard};
use crate::waitqueue::WaitQueue;

/// A condition variable for use alongside a [`Mutex`].
pub struct Condvar {
    waiters: WaitQueue<MAX_WAITERS_PER_QUEUE>,
}

impl Condvar {
    /// Creates a new condition variable with no waiters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            waiters: WaitQueue::new(),
        }
    }

    /// Atomically unlocks `guard`'s mutex and blocks `thread` on this
    /// condition variable, re-acquiring the mutex before returning.
    ///
    /// Like `pthread_cond_wait`, a successful return does not guarantee
    /// the awaited condition holds — callers must re-check it in a loop.
    ///
    /// `thread` is enqueued on the wait list *before* `guard`'s mutex is
    /// released, not after, so a `notify_one`/`notify_all` that runs in
    /// the window between unlock and park still finds it registered —
    /// otherwise that wakeup would find an empty queue and be lost,
    /// stranding the waiter until `timeout`.
    pub fn wait<'a, T: ?Sized>(
        &self,
        guard: MutexGuard<'a, T>,
        thread: ThreadId,
        timeout: Option<Duration>,
    ) -> OsResult<MutexGuard<'a, T>> {
        let mutex: &'a Mutex<T> = guard.mutex_ref();
        self.waiters.register(thread)?;
        drop(guard);

        let result = self.waiters.park_registered(thread, timeout);

        let relock = mutex.lock(thread, timeout);
        result?;
        relock
    }

    /// Wakes up to one thread waiting in [`wait`](Self::wait).
    pub fn notify_one(&self) -> u32 {
        self.waiters.wake_n(1)
    }

    /// Wakes every thread waiting in [`wait`](Self::wait).
    pub fn notify_all(&self) -> u32 {
        self.waiters.wake_all()
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::park;
    use crate::park::test_support::StdParkBackend;
    use std::sync::Arc;
    use std::thread;

    fn install_backend() -> &'static StdParkBackend {
        static BACKEND: std::sync::OnceLock<StdParkBackend> = std::sync::OnceLock::new();
        let backend = BACKEND.get_or_init(StdParkBackend::new);
        park::init(backend);
        backend
    }

    #[test]
    fn notify_one_wakes_a_waiting_thread() {
        let backend = install_backend();
        let mutex = Arc::new(Mutex::new(false));
        let condvar = Arc::new(Condvar::new());
        let waiter_tid = ThreadId::new(30);
        let notifier_tid = ThreadId::new(31);

        let m2 = mutex.clone();
        let c2 = condvar.clone();
        let waiter = thread::spawn(move || {
            backend.register_current(waiter_tid);
            let mut guard = m2.lock(waiter_tid, Some(Duration::from_secs(5))).unwrap();
            while !*guard {
                guard = c2
                    .wait(guard, waiter_tid, Some(Duration::from_secs(5)))
                    .unwrap();
            }
        });

        thread::sleep(Duration::from_millis(50));
        {
            let mut guard = mutex.lock(notifier_tid, Some(Duration::from_secs(5))).unwrap();
            *guard = true;
        }
        condvar.notify_one();

        waiter.join().unwrap();
    }
}

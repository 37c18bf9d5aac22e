//! Recursive-capable blocking mutex (§4.3), bit-packed exactly as
//! `original_source/librt/libos/threads/mutex.c`.
//!
//! `State` packs a 24-bit owning thread id and an 8-bit recursion count
//! (`__BUILD_STATE`/`__STATE_OWNER`/`__STATE_REFCOUNT`); `Value` is the
//! separate futex word with the classic 0/1/2 (unlocked/locked/locked
//! with waiters) encoding that lets unlock skip the wake syscall when
//! nothing is waiting. A destroyed mutex wakes every waiter with
//! [`OsError::Cancelled`] instead of letting them wait forever.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;

use vali_core::config::MUTEX_SPINS;
use vali_core::error::{OsError, OsResult};
use vali_core::id::ThreadId;

use crate::waitqueue::WaitQueue;

const VALUE_UNLOCKED: u32 = 0;
const VALUE_LOCKED: u32 = 1;
const VALUE_LOCKED_CONTENDED: u32 = 2;

const STATE_NO_OWNER: u32 = u32::MAX >> 8;

fn build_state(owner: u32, recursion: u8) -> u32 {
    (owner << 8) | u32::from(recursion)
}

fn state_owner(state: u32) -> u32 {
    state >> 8
}

fn state_recursion(state: u32) -> u8 {
    (state & 0xFF) as u8
}

const MAX_WAITERS: usize = vali_core::config::MAX_WAITERS_PER_QUEUE;

/// A blocking mutex with optional recursive-acquire support.
pub struct Mutex<T: ?Sized> {
    value: AtomicU32,
    state: AtomicU32,
    recursive: bool,
    destroyed: core::sync::atomic::AtomicBool,
    waiters: WaitQueue<MAX_WAITERS>,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new non-recursive, unlocked mutex.
    pub const fn new(value: T) -> Self {
        Self::with_recursion(value, false)
    }

    /// Creates a new unlocked mutex that allows its owning thread to
    /// re-acquire it, up to [`vali_core::config::MUTEX_MAX_RECURSION`]
    /// times.
    pub const fn new_recursive(value: T) -> Self {
        Self::with_recursion(value, true)
    }

    const fn with_recursion(value: T, recursive: bool) -> Self {
        Self {
            value: AtomicU32::new(VALUE_UNLOCKED),
            state: AtomicU32::new(build_state(STATE_NO_OWNER, 0)),
            recursive,
            destroyed: core::sync::atomic::AtomicBool::new(false),
            waiters: WaitQueue::new(),
            data: UnsafeCell::new(value),
        }
    }
}

impl<T: ?Sized> Mutex<T> {
    fn try_lock_recursive(&self, thread: ThreadId) -> Option<MutexGuard<'_, T>> {
        loop {
            let state = self.state.load(Ordering::Acquire);
            let owner = state_owner(state);
            let recursion = state_recursion(state);
            if recursion != 0 && owner == thread.as_u32() {
                let new_recursion = recursion.checked_add(1)?;
                let new_state = build_state(owner, new_recursion);
                if self
                    .state
                    .compare_exchange_weak(state, new_state, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    return Some(MutexGuard { mutex: self });
                }
                continue;
            }
            return None;
        }
    }

    /// Attempts to acquire the mutex without blocking.
    pub fn try_lock(&self, thread: ThreadId) -> OsResult<MutexGuard<'_, T>> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(OsError::Cancelled);
        }
        if self.recursive {
            if let Some(guard) = self.try_lock_recursive(thread) {
                return Ok(guard);
            }
        }
        if self
            .value
            .compare_exchange(
                VALUE_UNLOCKED,
                VALUE_LOCKED,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_err()
        {
            return Err(OsError::Busy);
        }
        self.state
            .store(build_state(thread.as_u32(), 1), Ordering::Release);
        Ok(MutexGuard { mutex: self })
    }

    /// Acquires the mutex, blocking `thread` if it is already held.
    ///
    /// Spins up to [`MUTEX_SPINS`] times before parking, matching
    /// `mutex.c`'s `__perform_lock`. Returns
    /// [`OsError::Cancelled`](vali_core::error::OsError::Cancelled) if
    /// the mutex is destroyed while this call is waiting, and
    /// [`OsError::Timeout`] if `timeout` elapses first.
    pub fn lock(
        &self,
        thread: ThreadId,
        timeout: Option<Duration>,
    ) -> OsResult<MutexGuard<'_, T>> {
        if self.recursive {
            if let Some(guard) = self.try_lock_recursive(thread) {
                return Ok(guard);
            }
        }

        if self
            .value
            .compare_exchange(
                VALUE_UNLOCKED,
                VALUE_LOCKED,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
        {
            self.state
                .store(build_state(thread.as_u32(), 1), Ordering::Release);
            return Ok(MutexGuard { mutex: self });
        }

        for _ in 0..MUTEX_SPINS {
            if let Ok(guard) = self.try_lock(thread) {
                return Ok(guard);
            }
        }

        loop {
            let prev = self.value.swap(VALUE_LOCKED_CONTENDED, Ordering::AcqRel);
            if prev == VALUE_UNLOCKED {
                self.state
                    .store(build_state(thread.as_u32(), 1), Ordering::Release);
                return Ok(MutexGuard { mutex: self });
            }

            self.waiters.park_while(
                thread,
                || self.value.load(Ordering::SeqCst) != VALUE_UNLOCKED,
                timeout,
            )?;

            if self.destroyed.load(Ordering::Acquire) {
                return Err(OsError::Cancelled);
            }
            if self
                .value
                .compare_exchange(
                    VALUE_UNLOCKED,
                    VALUE_LOCKED,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                self.state
                    .store(build_state(thread.as_u32(), 1), Ordering::Release);
                return Ok(MutexGuard { mutex: self });
            }
        }
    }

    fn unlock(&self) {
        let state = self.state.load(Ordering::Acquire);
        let recursion = state_recursion(state);
        if self.recursive && recursion > 1 {
            self.state.store(
                build_state(state_owner(state), recursion - 1),
                Ordering::Release,
            );
            return;
        }

        self.state
            .store(build_state(STATE_NO_OWNER, 0), Ordering::Release);
        let prev = self.value.swap(VALUE_UNLOCKED, Ordering::Release);
        if prev == VALUE_LOCKED_CONTENDED {
            self.waiters.wake_n(1);
        }
    }

    /// Marks the mutex destroyed and wakes every thread currently
    /// blocked in [`lock`](Self::lock), which then observe
    /// [`OsError::Cancelled`]. Mirrors `MutexDestroy`'s
    /// `MUTEX_DESTROYED` flag plus an unconditional futex wake.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        self.waiters.wake_all();
    }
}

/// RAII guard releasing the [`Mutex`] when dropped.
pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    pub(crate) fn mutex_ref(&self) -> &'a Mutex<T> {
        self.mutex
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
    fn try_lock_then_unlock() {
        let mutex = Mutex::new(0);
        let tid = ThreadId::new(1);
        {
            let mut guard = mutex.try_lock(tid).unwrap();
            *guard = 42;
        }
        let guard = mutex.try_lock(tid).unwrap();
        assert_eq!(*guard, 42);
    }

    #[test]
    fn try_lock_fails_when_held_by_other_thread() {
        let mutex = Mutex::new(0);
        let _guard = mutex.try_lock(ThreadId::new(1)).unwrap();
        assert_eq!(mutex.try_lock(ThreadId::new(2)), Err(OsError::Busy));
    }

    #[test]
    fn recursive_mutex_allows_reentry_from_owner() {
        let mutex = Mutex::new_recursive(0);
        let tid = ThreadId::new(1);
        let g1 = mutex.try_lock(tid).unwrap();
        let g2 = mutex.try_lock(tid).unwrap();
        drop(g2);
        drop(g1);
        assert!(mutex.try_lock(tid).is_ok());
    }

    #[test]
    fn non_recursive_mutex_rejects_reentry_from_owner() {
        let mutex = Mutex::new(0);
        let tid = ThreadId::new(1);
        let _g1 = mutex.try_lock(tid).unwrap();
        assert_eq!(mutex.try_lock(tid), Err(OsError::Busy));
    }

    #[test]
    fn contended_lock_blocks_until_unlock() {
        let backend = install_backend();
        let mutex = Arc::new(Mutex::new(0));
        let holder_tid = ThreadId::new(10);
        let waiter_tid = ThreadId::new(11);

        backend.register_current(holder_tid);
        let guard = mutex.try_lock(holder_tid).unwrap();

        let m2 = mutex.clone();
        let waiter = thread::spawn(move || {
            backend.register_current(waiter_tid);
            let g = m2.lock(waiter_tid, Some(Duration::from_secs(5))).unwrap();
            *g
        });

        thread::sleep(Duration::from_millis(50));
        drop(guard);

        let seen = waiter.join().unwrap();
        assert_eq!(seen, 0);
    }

    #[test]
    fn destroy_wakes_waiters_with_cancelled() {
        let backend = install_backend();
        let mutex = Arc::new(Mutex::new(0));
        let holder_tid = ThreadId::new(20);
        let waiter_tid = ThreadId::new(21);

        backend.register_current(holder_tid);
        let guard = mutex.try_lock(holder_tid).unwrap();

        let m2 = mutex.clone();
        let waiter = thread::spawn(move || {
            backend.register_current(waiter_tid);
            m2.lock(waiter_tid, Some(Duration::from_secs(5)))
        });

        thread::sleep(Duration::from_millis(50));
        mutex.destroy();
        let result = waiter.join().unwrap();
        assert_eq!(result.err(), Some(OsError::Cancelled));
        drop(guard);
    }
}

//! Thread-local storage slots (§4.3): "a fixed number of slots per
//! thread; slot destructors are invoked in reverse registration order
//! at thread exit, with up to a configurable number of destructor
//! passes to drain self-assignments."
//!
//! A destructor is modelled as a closure returning `Option<usize>`
//! rather than a bare function pointer so a test can simulate a
//! destructor that reassigns its own slot (as a real pthread-style
//! destructor does by calling `tls_set` on itself) without needing
//! back-access into the table that is currently iterating it.

use alloc::boxed::Box;

use planck_noalloc::vec::ArrayVec;

use vali_core::config::{TLS_MAX_DESTRUCTOR_PASSES, TLS_MAX_SLOTS};
use vali_core::error::{OsError, OsResult};

/// Called at thread exit for a slot with a non-null value. Returning
/// `Some(value)` re-arms the slot with a new value, exactly as if the
/// destructor (or code it called) had reassigned it; another
/// destructor pass then runs for it. Returning `None` leaves it
/// cleared.
pub type TlsDestructor = Box<dyn FnMut(usize) -> Option<usize> + Send>;

struct Slot {
    value: usize,
    destructor: Option<TlsDestructor>,
}

/// A fixed-capacity set of thread-local slots, owned by one
/// [`crate::thread::Thread`].
pub struct TlsTable {
    slots: [Option<Slot>; TLS_MAX_SLOTS],
    order: ArrayVec<usize, TLS_MAX_SLOTS>,
}

impl TlsTable {
    /// Creates an empty TLS table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: [const { None }; TLS_MAX_SLOTS],
            order: ArrayVec::new(),
        }
    }

    /// Stores `value` in `index`, registering `destructor` to run (if
    /// any) when the slot is non-null at thread exit. The first write
    /// to a slot records its registration order; later writes update
    /// the value in place without changing that order.
    pub fn set(
        &mut self,
        index: usize,
        value: usize,
        destructor: Option<TlsDestructor>,
    ) -> OsResult<()> {
        let slot = self.slots.get_mut(index).ok_or(OsError::InvalidParams)?;
        let first_write = slot.is_none();
        *slot = Some(Slot { value, destructor });
        if first_write {
            self.order.try_push(index).map_err(|_| OsError::Overflow)?;
        }
        Ok(())
    }

    /// Reads the current value of `index`, or `None` if never set (or
    /// cleared).
    #[must_use]
    pub fn get(&self, index: usize) -> Option<usize> {
        self.slots.get(index)?.as_ref().map(|s| s.value)
    }

    /// Clears `index` without running its destructor.
    pub fn clear(&mut self, index: usize) -> OsResult<()> {
        let slot = self.slots.get_mut(index).ok_or(OsError::InvalidParams)?;
        *slot = None;
        Ok(())
    }

    /// Runs destructors in reverse registration order, for up to
    /// [`TLS_MAX_DESTRUCTOR_PASSES`] passes, stopping early once a pass
    /// clears every slot without any destructor re-arming its own.
    pub fn run_destructors(&mut self) {
        for _ in 0..TLS_MAX_DESTRUCTOR_PASSES {
            let mut ran_any = false;
            for i in (0..self.order.len()).rev() {
                let idx = self.order.as_slice()[i];
                let Some(mut slot) = self.slots[idx].take() else {
                    continue;
                };
                ran_any = true;
                if let Some(destructor) = slot.destructor.as_mut() {
                    if let Some(new_value) = destructor(slot.value) {
                        slot.value = new_value;
                        self.slots[idx] = Some(slot);
                    }
                }
            }
            if !ran_any {
                break;
            }
        }
    }
}

impl Default for TlsTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn get_set_roundtrip() {
        let mut tls = TlsTable::new();
        tls.set(0, 42, None).unwrap();
        assert_eq!(tls.get(0), Some(42));
        assert_eq!(tls.get(1), None);
    }

    #[test]
    fn out_of_range_index_is_invalid() {
        let mut tls = TlsTable::new();
        assert_eq!(
            tls.set(TLS_MAX_SLOTS, 1, None),
            Err(OsError::InvalidParams)
        );
    }

    #[test]
    fn destructors_run_in_reverse_registration_order() {
        let mut tls = TlsTable::new();
        let order = Arc::new(SpinOrder::default());

        let o1 = order.clone();
        tls.set(0, 1, Some(Box::new(move |_| { o1.record(0); None })))
            .unwrap();
        let o2 = order.clone();
        tls.set(1, 2, Some(Box::new(move |_| { o2.record(1); None })))
            .unwrap();

        tls.run_destructors();
        assert_eq!(order.log(), [1, 0]);
    }

    #[test]
    fn destructor_self_reassignment_is_drained_then_cleared() {
        let mut tls = TlsTable::new();
        let remaining = Arc::new(AtomicUsize::new(2));
        let r = remaining.clone();
        tls.set(
            0,
            0,
            Some(Box::new(move |value| {
                if r.load(Ordering::SeqCst) > 0 {
                    r.fetch_sub(1, Ordering::SeqCst);
                    Some(value + 1)
                } else {
                    None
                }
            })),
        )
        .unwrap();

        tls.run_destructors();
        assert_eq!(remaining.load(Ordering::SeqCst), 0);
        assert_eq!(tls.get(0), None);
    }

    #[derive(Default)]
    struct SpinOrder {
        log: vali_core::sync::SpinLock<alloc::vec::Vec<usize>>,
    }

    impl SpinOrder {
        fn record(&self, idx: usize) {
            self.log.lock().push(idx);
        }

        fn log(&self) -> alloc::vec::Vec<usize> {
            self.log.lock().clone()
        }
    }
}

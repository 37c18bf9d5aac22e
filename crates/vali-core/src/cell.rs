//! A minimal `UnsafeCell` wrapper that opts into `Send + Sync`.
//!
//! Used for statics where synchronization is handled externally by the
//! owning subsystem (e.g. the handle table's slot array, guarded by its
//! own spinlock rather than by the cell itself).

use core::cell::UnsafeCell;

/// An `UnsafeCell` wrapper that implements `Send` and `Sync`.
///
/// # Safety
///
/// The caller must ensure all accesses are properly synchronised; this
/// type only exists to let the compiler place `T` in a `static` when
/// the programmer — not the compiler — can prove exclusion.
#[repr(transparent)]
pub struct RacyCell<T>(UnsafeCell<T>);

// SAFETY: callers of `RacyCell` are responsible for synchronising access.
unsafe impl<T: Send> Send for RacyCell<T> {}
// SAFETY: same as above.
unsafe impl<T: Send> Sync for RacyCell<T> {}

impl<T> RacyCell<T> {
    /// Creates a new `RacyCell` wrapping `value`.
    #[inline]
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// Returns a raw pointer to the underlying data.
    #[inline]
    pub const fn get(&self) -> *mut T {
        self.0.get()
    }

    /// Returns a mutable reference to the underlying data.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.0.get_mut()
    }
}

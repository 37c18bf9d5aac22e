//! Per-type handle operations, mirroring `handles.c`'s
//! `OSHandleOps_t { Destroy, Serialize }` dispatched through the fixed
//! `g_osHandlers[__OSHANDLE_COUNT]` array.

use alloc::boxed::Box;
use core::any::Any;

use crate::table::HandleFlags;

/// Opaque per-handle payload. Boxed so entries of different concrete
/// types can live in the same table; the owning subsystem downcasts it
/// back inside its [`HandleOps`] implementation.
pub type HandlePayload = Box<dyn Any + Send + Sync>;

/// Type-specific behavior a subsystem registers for one [`HandleType`
/// variant](crate::HandleType) when the handle table is constructed.
///
/// A handle type with no registered ops can still be created and looked
/// up; `destroy` becomes a no-op drop and `serialize` writes zero
/// payload bytes, matching how `handles.c` tolerates a null entry in
/// `g_osHandlers`.
pub trait HandleOps: Send + Sync {
    /// Releases resources owned by `payload`. `flags` reflects the
    /// ownership bit recorded at `create`/`wrap` time: a handle wrapping
    /// an object it does not own must not release the underlying
    /// kernel object here, only the table-side bookkeeping.
    fn destroy(&self, flags: HandleFlags, payload: HandlePayload);

    /// Appends a type-specific payload to `buf`, returning the number
    /// of bytes written. Called after the table has already written the
    /// common `{id, type, flags}` header (§4.1).
    fn serialize(&self, payload: &(dyn Any + Send + Sync), buf: &mut [u8]) -> usize;
}

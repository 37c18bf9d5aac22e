//! The handle table itself (C1).
//!
//! One [`SpinLock`]-guarded map plays the role of `g_osHandles` /
//! `g_osHandlesLock` in `handles.c`. All operations take the lock for
//! their bookkeeping only; `destroy` drops the lock before calling into
//! a type's [`HandleOps::destroy`] so a destructor that itself touches
//! the table (closing a child handle, say) cannot deadlock against
//! itself — the same re-entrancy hazard `handles.c` avoids by copying
//! the `OSHandle` out of the table before invoking its destructor.

use alloc::collections::BTreeMap;
use core::any::Any;
use core::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

use vali_core::error::{OsError, OsResult};
use vali_core::id::HandleId;
use vali_core::sync::SpinLock;

use crate::ops::{HandleOps, HandlePayload};

/// The closed set of handle kinds the table can hold. Matches the
/// kernel object categories named in §3: files, events, queues, shared
/// memory regions, sockets, pipes, processes and threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u16)]
pub enum HandleType {
    /// An open VFS handle (C7).
    File = 0,
    /// A waitable event object.
    Event = 1,
    /// An IPC message queue endpoint (C5).
    Queue = 2,
    /// A shared-memory region.
    Shm = 3,
    /// A network socket.
    Socket = 4,
    /// A pipe endpoint.
    Pipe = 5,
    /// A handle referring to another process.
    Process = 6,
    /// A handle referring to another thread.
    Thread = 7,
}

/// Number of [`HandleType`] variants; sizes the per-type ops table.
pub const HANDLE_TYPE_COUNT: usize = 8;

impl HandleType {
    fn from_wire(value: u16) -> OsResult<Self> {
        match value {
            0 => Ok(Self::File),
            1 => Ok(Self::Event),
            2 => Ok(Self::Queue),
            3 => Ok(Self::Shm),
            4 => Ok(Self::Socket),
            5 => Ok(Self::Pipe),
            6 => Ok(Self::Process),
            7 => Ok(Self::Thread),
            _ => Err(OsError::ProtocolError),
        }
    }
}

bitflags! {
    /// Per-handle flag bits recorded at `create`/`wrap` time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HandleFlags: u16 {
        /// The table owns the underlying kernel object: `destroy`
        /// releases it. Absent for handles wrapping an id the caller
        /// does not own (mirrors `handles.c`'s distinction between a
        /// locally-constructed `OSHandle` and one wrapping an id
        /// received from elsewhere).
        const OWNED = 1 << 0;
        /// Set on entries created by [`HandleTable::deserialize`] until
        /// [`HandleTable::bind_payload`] attaches a payload.
        const UNBOUND = 1 << 1;
    }
}

struct Entry {
    htype: HandleType,
    flags: HandleFlags,
    payload: Option<HandlePayload>,
    refcount: u32,
}

/// A snapshot of a table entry's identity, returned by
/// [`HandleTable::lookup`] without holding the table lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleEntryView {
    /// The handle's type.
    pub htype: HandleType,
    /// The handle's flags.
    pub flags: HandleFlags,
    /// The handle's current reference count.
    pub refcount: u32,
}

/// The process-wide handle table.
pub struct HandleTable {
    entries: SpinLock<BTreeMap<u32, Entry>>,
    next_id: AtomicU32,
    ops: [Option<&'static dyn HandleOps>; HANDLE_TYPE_COUNT],
}

impl HandleTable {
    /// Creates an empty table with the given per-type operations.
    /// `ops[htype as usize]` is consulted by `destroy`/`serialize`; a
    /// `None` entry is tolerated (see [`HandleOps`]).
    #[must_use]
    pub const fn new(ops: [Option<&'static dyn HandleOps>; HANDLE_TYPE_COUNT]) -> Self {
        Self {
            entries: SpinLock::new(BTreeMap::new()),
            next_id: AtomicU32::new(0),
            ops,
        }
    }

    fn ops_for(&self, htype: HandleType) -> Option<&'static dyn HandleOps> {
        self.ops[htype as usize]
    }

    /// Allocates a fresh id, inserts `payload` with refcount 1, and
    /// returns the new [`HandleId`].
    pub fn create(
        &self,
        htype: HandleType,
        flags: HandleFlags,
        payload: HandlePayload,
    ) -> OsResult<HandleId> {
        let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
        if raw == u32::MAX {
            return Err(OsError::OutOfMemory);
        }
        let mut table = self.entries.lock();
        table.insert(
            raw,
            Entry {
                htype,
                flags,
                payload: Some(payload),
                refcount: 1,
            },
        );
        Ok(HandleId::new(raw))
    }

    /// Inserts `payload` under an id chosen by the caller (typically one
    /// obtained from another process or from the kernel directly).
    /// Fails with [`OsError::Exists`] if the id is already in use.
    pub fn wrap(
        &self,
        id: HandleId,
        htype: HandleType,
        flags: HandleFlags,
        payload: HandlePayload,
    ) -> OsResult<()> {
        let mut table = self.entries.lock();
        if table.contains_key(&id.as_u32()) {
            return Err(OsError::Exists);
        }
        table.insert(
            id.as_u32(),
            Entry {
                htype,
                flags,
                payload: Some(payload),
                refcount: 1,
            },
        );
        Ok(())
    }

    /// Increments an entry's reference count.
    pub fn acquire(&self, id: HandleId) -> OsResult<()> {
        let mut table = self.entries.lock();
        let entry = table.get_mut(&id.as_u32()).ok_or(OsError::NotFound)?;
        entry.refcount = entry.refcount.checked_add(1).ok_or(OsError::Overflow)?;
        Ok(())
    }

    /// Decrements an entry's reference count, removing and destroying it
    /// once the count reaches zero. The table lock is released before
    /// [`HandleOps::destroy`] runs.
    pub fn destroy(&self, id: HandleId) -> OsResult<()> {
        let removed = {
            let mut table = self.entries.lock();
            let entry = table.get_mut(&id.as_u32()).ok_or(OsError::NotFound)?;
            entry.refcount -= 1;
            if entry.refcount > 0 {
                None
            } else {
                table.remove(&id.as_u32())
            }
        };
        if let Some(entry) = removed {
            if let (Some(ops), Some(payload)) = (self.ops_for(entry.htype), entry.payload) {
                ops.destroy(entry.flags, payload);
            }
        }
        Ok(())
    }

    /// Returns a snapshot of an entry's identity without touching its
    /// refcount.
    pub fn lookup(&self, id: HandleId) -> OsResult<HandleEntryView> {
        let table = self.entries.lock();
        let entry = table.get(&id.as_u32()).ok_or(OsError::NotFound)?;
        Ok(HandleEntryView {
            htype: entry.htype,
            flags: entry.flags,
            refcount: entry.refcount,
        })
    }

    /// Runs `f` against an entry's payload while holding the table lock.
    /// Fails with [`OsError::InvalidParams`] if the entry is still
    /// unbound (see [`HandleTable::deserialize`]).
    pub fn with_payload<R>(
        &self,
        id: HandleId,
        f: impl FnOnce(&(dyn Any + Send + Sync)) -> R,
    ) -> OsResult<R> {
        let table = self.entries.lock();
        let entry = table.get(&id.as_u32()).ok_or(OsError::NotFound)?;
        let payload = entry.payload.as_deref().ok_or(OsError::InvalidParams)?;
        Ok(f(payload))
    }

    /// Attaches a payload to an entry previously created by
    /// [`HandleTable::deserialize`], clearing [`HandleFlags::UNBOUND`].
    pub fn bind_payload(&self, id: HandleId, payload: HandlePayload) -> OsResult<()> {
        let mut table = self.entries.lock();
        let entry = table.get_mut(&id.as_u32()).ok_or(OsError::NotFound)?;
        if entry.payload.is_some() {
            return Err(OsError::Exists);
        }
        entry.payload = Some(payload);
        entry.flags.remove(HandleFlags::UNBOUND);
        Ok(())
    }

    /// Writes `{id, type, flags}` followed by the type's serialized
    /// payload into `buf`, returning the total byte count (§4.1).
    pub fn serialize(&self, id: HandleId, buf: &mut [u8]) -> OsResult<usize> {
        const HEADER_LEN: usize = 8;
        if buf.len() < HEADER_LEN {
            return Err(OsError::Overflow);
        }
        let table = self.entries.lock();
        let entry = table.get(&id.as_u32()).ok_or(OsError::NotFound)?;
        buf[0..4].copy_from_slice(&id.as_u32().to_le_bytes());
        buf[4..6].copy_from_slice(&(entry.htype as u16).to_le_bytes());
        buf[6..8].copy_from_slice(&entry.flags.bits().to_le_bytes());
        let written = match (self.ops_for(entry.htype), entry.payload.as_deref()) {
            (Some(ops), Some(payload)) => ops.serialize(payload, &mut buf[HEADER_LEN..]),
            _ => 0,
        };
        Ok(HEADER_LEN + written)
    }

    /// Parses a `{id, type, flags}` header from `buf` and inserts an
    /// unreferenced, payload-less entry for it, returning the id. The
    /// payload is attached later via [`HandleTable::bind_payload`] once
    /// the owning subsystem resolves it (§4.1: "payload is re-bound via
    /// a later find").
    pub fn deserialize(&self, buf: &[u8]) -> OsResult<HandleId> {
        const HEADER_LEN: usize = 8;
        if buf.len() < HEADER_LEN {
            return Err(OsError::ProtocolError);
        }
        let raw = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let htype = HandleType::from_wire(u16::from_le_bytes(buf[4..6].try_into().unwrap()))?;
        let flags = HandleFlags::from_bits_truncate(u16::from_le_bytes(
            buf[6..8].try_into().unwrap(),
        )) | HandleFlags::UNBOUND;
        let mut table = self.entries.lock();
        if table.contains_key(&raw) {
            return Err(OsError::Exists);
        }
        table.insert(
            raw,
            Entry {
                htype,
                flags,
                payload: None,
                refcount: 1,
            },
        );
        Ok(HandleId::new(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::sync::Arc;
    use core::sync::atomic::AtomicBool;

    struct RecordingOps {
        destroyed: Arc<AtomicBool>,
    }

    impl HandleOps for RecordingOps {
        fn destroy(&self, _flags: HandleFlags, _payload: HandlePayload) {
            self.destroyed.store(true, Ordering::SeqCst);
        }

        fn serialize(&self, payload: &(dyn Any + Send + Sync), buf: &mut [u8]) -> usize {
            let value = *payload.downcast_ref::<u32>().unwrap();
            buf[0..4].copy_from_slice(&value.to_le_bytes());
            4
        }
    }

    fn leak_ops(destroyed: Arc<AtomicBool>) -> &'static dyn HandleOps {
        let boxed: &'static mut RecordingOps = Box::leak(Box::new(RecordingOps { destroyed }));
        boxed as &'static dyn HandleOps
    }

    #[test]
    fn create_lookup_destroy_runs_destructor_after_unlock() {
        let destroyed = Arc::new(AtomicBool::new(false));
        let mut ops: [Option<&'static dyn HandleOps>; HANDLE_TYPE_COUNT] = [None; HANDLE_TYPE_COUNT];
        ops[HandleType::Event as usize] = Some(leak_ops(destroyed.clone()));
        let table = HandleTable::new(ops);

        let id = table
            .create(HandleType::Event, HandleFlags::OWNED, Box::new(7u32))
            .unwrap();
        let view = table.lookup(id).unwrap();
        assert_eq!(view.htype, HandleType::Event);
        assert_eq!(view.refcount, 1);
        assert!(!destroyed.load(Ordering::SeqCst));

        table.destroy(id).unwrap();
        assert!(destroyed.load(Ordering::SeqCst));
        assert_eq!(table.lookup(id), Err(OsError::NotFound));
    }

    #[test]
    fn acquire_keeps_entry_alive_until_matching_destroy() {
        let table = HandleTable::new([None; HANDLE_TYPE_COUNT]);
        let id = table
            .create(HandleType::Queue, HandleFlags::empty(), Box::new(1u32))
            .unwrap();
        table.acquire(id).unwrap();
        table.destroy(id).unwrap();
        assert!(table.lookup(id).is_ok());
        table.destroy(id).unwrap();
        assert_eq!(table.lookup(id), Err(OsError::NotFound));
    }

    #[test]
    fn wrap_rejects_duplicate_id() {
        let table = HandleTable::new([None; HANDLE_TYPE_COUNT]);
        let id = HandleId::new(5);
        table
            .wrap(id, HandleType::File, HandleFlags::empty(), Box::new(0u32))
            .unwrap();
        let err = table
            .wrap(id, HandleType::File, HandleFlags::empty(), Box::new(0u32))
            .unwrap_err();
        assert_eq!(err, OsError::Exists);
    }

    #[test]
    fn serialize_then_deserialize_roundtrips_header() {
        let destroyed = Arc::new(AtomicBool::new(false));
        let mut ops: [Option<&'static dyn HandleOps>; HANDLE_TYPE_COUNT] = [None; HANDLE_TYPE_COUNT];
        ops[HandleType::Shm as usize] = Some(leak_ops(destroyed));
        let table = HandleTable::new(ops);

        let id = table
            .create(HandleType::Shm, HandleFlags::OWNED, Box::new(123u32))
            .unwrap();
        let mut buf = [0u8; 16];
        let len = table.serialize(id, &mut buf).unwrap();
        assert_eq!(len, 12);

        let table2 = HandleTable::new([None; HANDLE_TYPE_COUNT]);
        let id2 = table2.deserialize(&buf[..len]).unwrap();
        assert_eq!(id2, id);
        let view = table2.lookup(id2).unwrap();
        assert_eq!(view.htype, HandleType::Shm);
        assert!(view.flags.contains(HandleFlags::UNBOUND));
        assert!(table2.with_payload(id2, |_| ()).is_err());

        table2.bind_payload(id2, Box::new(123u32)).unwrap();
        let bound = table2.with_payload(id2, |p| *p.downcast_ref::<u32>().unwrap());
        assert_eq!(bound.unwrap(), 123);
    }

    #[test]
    fn lookup_missing_is_not_found() {
        let table = HandleTable::new([None; HANDLE_TYPE_COUNT]);
        assert_eq!(table.lookup(HandleId::new(99)), Err(OsError::NotFound));
    }
}

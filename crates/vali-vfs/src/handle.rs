//! VFS handle lifecycle (§3 "VFS handle", §4.7 "Handle lifecycle").
//!
//! Grounded on `vali-handle::table`'s registry shape and, for the
//! destroy seam, `vali-handle::ops::HandleOps` — a `File`-typed handle
//! in the global handle table (C1) carries a [`HandleId`] here as its
//! payload; [`VfsHandleOps`] bridges the table's generic
//! `destroy(flags, payload)` callback to this registry's own
//! `close`, the same indirection `original_source/librt/libos/handles.c`
//! achieves via `g_osHandlers[__OSHANDLE_FILE]`.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;
use core::any::Any;

use bitflags::bitflags;

use vali_core::error::{OsError, OsResult};
use vali_core::id::{EntryId, HandleId, ProcessId};
use vali_core::sync::SpinLock;

use vali_handle::{HandleFlags, HandleOps, HandlePayload};

use crate::access::AccessFlags;
use crate::entry::EntryCache;
use crate::interface::{FilesystemInterface, FsEntryRef, FsHandleRef, SEEK_END};

bitflags! {
    /// Handle-open option bits (§3 "VFS handle": "option flags").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HandleOptions: u32 {
        /// Skip the read-ahead buffer even for a file entry (§4.7:
        /// "unless the `volatile` option is set and the entry is a
        /// file, allocates a read-ahead buffer").
        const VOLATILE = 1 << 0;
        /// Seek to the entry's current end immediately after opening.
        const APPEND = 1 << 1;
    }
}

/// A sector-sized read-ahead buffer (§4.7: "allocates a read-ahead
/// buffer sized to the disk sector").
#[derive(Debug, Clone)]
pub struct ReadAheadBuffer {
    data: Vec<u8>,
    /// Absolute file offset the buffer was last filled from, or `None`
    /// while empty.
    origin: Option<u64>,
    filled: usize,
}

impl ReadAheadBuffer {
    fn new(sector_size: u32) -> Self {
        Self {
            data: vec![0u8; sector_size as usize],
            origin: None,
            filled: 0,
        }
    }

    /// Serves `len` bytes at `offset` from the buffer if it is already
    /// resident, without touching the filesystem module.
    #[must_use]
    pub fn try_serve(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let origin = self.origin?;
        if offset < origin {
            return None;
        }
        let start = usize::try_from(offset - origin).ok()?;
        if start >= self.filled {
            return None;
        }
        let end = (start + len).min(self.filled);
        Some(&self.data[start..end])
    }

    fn fill(&mut self, offset: u64, bytes: &[u8]) {
        let n = bytes.len().min(self.data.len());
        self.data[..n].copy_from_slice(&bytes[..n]);
        self.origin = Some(offset);
        self.filled = n;
    }
}

/// An open VFS handle (§3 "VFS handle").
#[derive(Debug)]
pub struct VfsHandle {
    owner: ProcessId,
    entry: EntryId,
    module_handle: FsHandleRef,
    access: AccessFlags,
    options: HandleOptions,
    position: u64,
    read_ahead: Option<ReadAheadBuffer>,
}

impl VfsHandle {
    /// The process this handle was opened for.
    #[must_use]
    pub const fn owner(&self) -> ProcessId {
        self.owner
    }

    /// The entry-cache entry this handle is open on.
    #[must_use]
    pub const fn entry(&self) -> EntryId {
        self.entry
    }

    /// Current byte position.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Access flags this handle was opened with.
    #[must_use]
    pub const fn access(&self) -> AccessFlags {
        self.access
    }
}

struct State {
    handles: BTreeMap<HandleId, VfsHandle>,
    next_id: u32,
}

/// Owns every open [`VfsHandle`] and drives its open/close lifecycle
/// against a filesystem module and its [`EntryCache`].
pub struct HandleRegistry {
    state: SpinLock<State>,
}

impl HandleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SpinLock::new(State { handles: BTreeMap::new(), next_id: 0 }),
        }
    }

    /// Opens a handle on `entry` (already resolved through
    /// [`EntryCache::acquire`]): calls the interface's `open_handle`,
    /// allocates a read-ahead buffer unless `VOLATILE` is set, and
    /// seeks to the entry's end if `APPEND` is set (§4.7 "Handle
    /// lifecycle").
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &self,
        interface: &dyn FilesystemInterface,
        fs: FsEntryRef,
        owner: ProcessId,
        entry: EntryId,
        module_entry: FsEntryRef,
        access: AccessFlags,
        options: HandleOptions,
        sector_size: u32,
        is_file: bool,
    ) -> OsResult<HandleId> {
        let module_handle = interface.open_handle(fs, module_entry)?;

        let position = if options.contains(HandleOptions::APPEND) {
            match interface.seek(fs, module_entry, module_handle, SEEK_END) {
                Ok(pos) => pos,
                Err(e) => {
                    let _ = interface.close_handle(fs, module_handle);
                    return Err(e);
                }
            }
        } else {
            0
        };

        let read_ahead = if is_file && !options.contains(HandleOptions::VOLATILE) {
            Some(ReadAheadBuffer::new(sector_size))
        } else {
            None
        };

        let mut state = self.state.lock();
        let id = HandleId::new(state.next_id);
        state.next_id += 1;
        state.handles.insert(
            id,
            VfsHandle { owner, entry, module_handle, access, options, position, read_ahead },
        );
        Ok(id)
    }

    /// Repositions `id` to `absolute_pos`.
    pub fn seek(&self, interface: &dyn FilesystemInterface, fs: FsEntryRef, module_entry: FsEntryRef, id: HandleId, absolute_pos: u64) -> OsResult<()> {
        let module_handle = {
            let state = self.state.lock();
            state.handles.get(&id).ok_or(OsError::NotFound)?.module_handle
        };
        let pos = interface.seek(fs, module_entry, module_handle, absolute_pos)?;
        let mut state = self.state.lock();
        let handle = state.handles.get_mut(&id).ok_or(OsError::NotFound)?;
        handle.position = pos;
        Ok(())
    }

    /// Closes `id`: calls the interface's `close_handle` and, when the
    /// owning entry's handle count reaches zero, releases it from
    /// `cache` (§4.7: "when the entry's handle count reaches zero the
    /// entry is evicted from the cache").
    pub fn close(&self, interface: &dyn FilesystemInterface, fs: FsEntryRef, cache: &EntryCache, id: HandleId) -> OsResult<()> {
        let handle = {
            let mut state = self.state.lock();
            state.handles.remove(&id).ok_or(OsError::NotFound)?
        };
        interface.close_handle(fs, handle.module_handle)?;
        cache.release(interface, fs, handle.entry, handle.access)
    }

    /// The module-internal handle reference backing `id`, for use by
    /// the read/write paths.
    pub fn module_handle(&self, id: HandleId) -> OsResult<FsHandleRef> {
        Ok(self.state.lock().handles.get(&id).ok_or(OsError::NotFound)?.module_handle)
    }

    /// Current position of `id`.
    pub fn position(&self, id: HandleId) -> OsResult<u64> {
        Ok(self.state.lock().handles.get(&id).ok_or(OsError::NotFound)?.position)
    }

    /// Advances `id`'s position by `delta` bytes after a read or write.
    pub fn advance(&self, id: HandleId, delta: u64) -> OsResult<()> {
        let mut state = self.state.lock();
        let handle = state.handles.get_mut(&id).ok_or(OsError::NotFound)?;
        handle.position += delta;
        Ok(())
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridges the global handle table's generic destroy callback (C1) to
/// this registry's own `close`, for [`HandleType::File`](vali_handle::table::HandleType::File)
/// entries whose payload is a [`HandleId`] keyed into a [`HandleRegistry`].
///
/// A destroy reached through the table no longer has the filesystem
/// interface or entry cache in scope, so this records them at
/// construction; one instance serves exactly one mounted filesystem.
pub struct VfsHandleOps {
    registry: &'static HandleRegistry,
    cache: &'static EntryCache,
    interface: &'static dyn FilesystemInterface,
    fs: FsEntryRef,
}

impl VfsHandleOps {
    /// Creates ops bound to one mounted filesystem's registry, cache
    /// and interface.
    #[must_use]
    pub const fn new(
        registry: &'static HandleRegistry,
        cache: &'static EntryCache,
        interface: &'static dyn FilesystemInterface,
        fs: FsEntryRef,
    ) -> Self {
        Self { registry, cache, interface, fs }
    }
}

impl HandleOps for VfsHandleOps {
    fn destroy(&self, _flags: HandleFlags, payload: HandlePayload) {
        if let Ok(id) = payload.downcast::<HandleId>() {
            let _ = self.registry.close(self.interface, self.fs, self.cache, *id);
        }
    }

    fn serialize(&self, payload: &(dyn Any + Send + Sync), buf: &mut [u8]) -> usize {
        if let (Some(id), true) = (payload.downcast_ref::<HandleId>(), buf.len() >= 4) {
            buf[..4].copy_from_slice(&id.as_u32().to_le_bytes());
            4
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{BufferHandle, CreateOptions};

    struct StubFs {
        size: u64,
    }

    impl FilesystemInterface for StubFs {
        fn initialize(&self, _fs: FsEntryRef) -> OsResult<()> {
            Ok(())
        }
        fn destroy(&self, _fs: FsEntryRef, _unmount_flags: u32) -> OsResult<()> {
            Ok(())
        }
        fn open_entry(&self, _fs: FsEntryRef, _path: &str) -> OsResult<FsEntryRef> {
            Ok(FsEntryRef(1))
        }
        fn create_path(&self, _fs: FsEntryRef, _path: &str, _options: CreateOptions) -> OsResult<FsEntryRef> {
            Err(OsError::NotSupported)
        }
        fn close_entry(&self, _fs: FsEntryRef, _entry: FsEntryRef) -> OsResult<()> {
            Ok(())
        }
        fn delete_entry(&self, _fs: FsEntryRef, _entry: FsEntryRef) -> OsResult<()> {
            Ok(())
        }
        fn open_handle(&self, _fs: FsEntryRef, _entry: FsEntryRef) -> OsResult<FsHandleRef> {
            Ok(FsHandleRef(7))
        }
        fn close_handle(&self, _fs: FsEntryRef, _handle: FsHandleRef) -> OsResult<()> {
            Ok(())
        }
        fn read(&self, _fs: FsEntryRef, _entry: FsEntryRef, _handle: FsHandleRef, _buffer: BufferHandle, _off: u64, _units: usize) -> OsResult<usize> {
            Ok(0)
        }
        fn write(&self, _fs: FsEntryRef, _entry: FsEntryRef, _handle: FsHandleRef, _buffer: BufferHandle, _off: u64, _units: usize) -> OsResult<usize> {
            Ok(0)
        }
        fn seek(&self, _fs: FsEntryRef, _entry: FsEntryRef, _handle: FsHandleRef, absolute_pos: u64) -> OsResult<u64> {
            if absolute_pos == SEEK_END {
                Ok(self.size)
            } else {
                Ok(absolute_pos)
            }
        }
        fn change_size(&self, _fs: FsEntryRef, _entry: FsEntryRef, _size: u64) -> OsResult<()> {
            Ok(())
        }
    }

    #[test]
    fn open_allocates_read_ahead_for_non_volatile_file() {
        let fs = StubFs { size: 0 };
        let registry = HandleRegistry::new();
        let id = registry
            .open(&fs, FsEntryRef(0), ProcessId::new(1), EntryId::new(0), FsEntryRef(1), AccessFlags::READ, HandleOptions::empty(), 512, true)
            .unwrap();
        assert_eq!(registry.position(id).unwrap(), 0);
    }

    #[test]
    fn append_seeks_to_entry_end() {
        let fs = StubFs { size: 4096 };
        let registry = HandleRegistry::new();
        let id = registry
            .open(&fs, FsEntryRef(0), ProcessId::new(1), EntryId::new(0), FsEntryRef(1), AccessFlags::WRITE, HandleOptions::APPEND, 512, true)
            .unwrap();
        assert_eq!(registry.position(id).unwrap(), 4096);
    }

    #[test]
    fn close_releases_entry_from_cache() {
        let fs = StubFs { size: 0 };
        let registry = HandleRegistry::new();
        let cache = EntryCache::new();
        let read = AccessFlags::READ | AccessFlags::READ_SHARE;
        let entry = cache.acquire(&fs, FsEntryRef(0), "/a", read).unwrap();
        let id = registry
            .open(&fs, FsEntryRef(0), ProcessId::new(1), entry, FsEntryRef(1), read, HandleOptions::empty(), 512, true)
            .unwrap();

        registry.close(&fs, FsEntryRef(0), &cache, id).unwrap();
        assert_eq!(cache.handle_count(entry), 0);
        assert_eq!(registry.position(id), Err(OsError::NotFound));
    }

    #[test]
    fn read_ahead_buffer_serves_cached_bytes() {
        let mut buf = ReadAheadBuffer::new(512);
        buf.fill(1024, &[1, 2, 3, 4]);
        assert_eq!(buf.try_serve(1024, 2), Some(&[1u8, 2][..]));
        assert_eq!(buf.try_serve(1026, 2), Some(&[3u8, 4][..]));
        assert_eq!(buf.try_serve(2048, 2), None);
        assert_eq!(buf.try_serve(1000, 2), None);
    }
}

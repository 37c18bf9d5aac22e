//! The per-filesystem entry cache (§4.7 "Entry cache").
//!
//! Grounded on `vali-devmgr::manager`'s `SpinLock`-guarded `BTreeMap`
//! registry shape, with the filesystem module itself passed in as a
//! `&dyn FilesystemInterface` seam per call — the same style
//! `DeviceManager` takes a `&dyn DriverSpawner` rather than storing one,
//! since one `EntryCache` only ever serves the single mount that owns
//! it and the module implementation can be `'static` shared state.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use vali_core::error::{OsError, OsResult};
use vali_core::id::EntryId;
use vali_core::sync::SpinLock;

use crate::access::{access_allowed, AccessFlags};
use crate::interface::{FilesystemInterface, FsEntryRef};

struct CacheEntry {
    path: String,
    module_entry: FsEntryRef,
    /// One element per currently open handle on this entry.
    access: Vec<AccessFlags>,
}

struct State {
    by_path: BTreeMap<String, EntryId>,
    by_id: BTreeMap<EntryId, CacheEntry>,
    next_id: u32,
}

/// A path-keyed cache of open entries for one mounted filesystem
/// (§4.7: "each cache entry owns a list of open handles plus a
/// reference count"). The count here is just `access.len()`.
pub struct EntryCache {
    state: SpinLock<State>,
}

impl EntryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SpinLock::new(State {
                by_path: BTreeMap::new(),
                by_id: BTreeMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Resolves `path`, consulting the cache first and falling back to
    /// `interface.open_entry` on a miss (§4.7). Fails with
    /// [`OsError::Permissions`] if `requested` conflicts with the
    /// sharing rules against handles already open on this entry.
    pub fn acquire(
        &self,
        interface: &dyn FilesystemInterface,
        fs: FsEntryRef,
        path: &str,
        requested: AccessFlags,
    ) -> OsResult<EntryId> {
        let mut state = self.state.lock();
        if let Some(&id) = state.by_path.get(path) {
            let entry = state.by_id.get_mut(&id).expect("by_path/by_id inconsistent");
            if !access_allowed(&entry.access, requested) {
                return Err(OsError::Permissions);
            }
            entry.access.push(requested);
            return Ok(id);
        }
        drop(state);

        let module_entry = interface.open_entry(fs, path)?;

        let mut state = self.state.lock();
        // Another opener may have raced us to the miss; recheck.
        if let Some(&id) = state.by_path.get(path) {
            let entry = state.by_id.get_mut(&id).expect("by_path/by_id inconsistent");
            if !access_allowed(&entry.access, requested) {
                let _ = interface.close_entry(fs, module_entry);
                return Err(OsError::Permissions);
            }
            entry.access.push(requested);
            return Ok(id);
        }

        let id = EntryId::new(state.next_id);
        state.next_id += 1;
        state.by_path.insert(String::from(path), id);
        state.by_id.insert(
            id,
            CacheEntry {
                path: String::from(path),
                module_entry,
                access: alloc::vec![requested],
            },
        );
        Ok(id)
    }

    /// Releases one handle's hold on `id`. When the last handle is
    /// released the entry is evicted from the cache and
    /// `interface.close_entry` is called (§4.7 "Handle lifecycle":
    /// "when the entry's handle count reaches zero the entry is
    /// evicted from the cache").
    pub fn release(&self, interface: &dyn FilesystemInterface, fs: FsEntryRef, id: EntryId, access: AccessFlags) -> OsResult<()> {
        let mut state = self.state.lock();
        let entry = state.by_id.get_mut(&id).ok_or(OsError::NotFound)?;
        if let Some(pos) = entry.access.iter().position(|a| *a == access) {
            entry.access.remove(pos);
        }
        if entry.access.is_empty() {
            let module_entry = entry.module_entry;
            let path = entry.path.clone();
            state.by_id.remove(&id);
            state.by_path.remove(&path);
            drop(state);
            interface.close_entry(fs, module_entry)?;
        }
        Ok(())
    }

    /// The filesystem module's own reference for `id`.
    pub fn module_entry(&self, id: EntryId) -> OsResult<FsEntryRef> {
        Ok(self.state.lock().by_id.get(&id).ok_or(OsError::NotFound)?.module_entry)
    }

    /// Number of handles currently open on `id`, or `0` if it is not
    /// cached.
    #[must_use]
    pub fn handle_count(&self, id: EntryId) -> usize {
        self.state.lock().by_id.get(&id).map_or(0, |e| e.access.len())
    }
}

impl Default for EntryCache {
    fn default() -> Self {
        Self::new()
    }
}

//! Filesystem-storage registration and setup (§4.7 "Filesystem-storage
//! lifecycle", §3 "Filesystem-storage").
//!
//! Grounded on `vali-devmgr::manager`'s registry-plus-seam shape (a
//! `SpinLock`-guarded `BTreeMap` with monotonic ids, with the actual
//! I/O delegated to trait objects the caller supplies) — the natural
//! fit here too, since device query, partition probing and filesystem
//! module loading are all collaborators §1 places out of scope.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use bitflags::bitflags;

use vali_core::error::{OsError, OsResult};
use vali_core::id::{DeviceId, DriverId, FsStorageId};
use vali_core::sync::SpinLock;
use vali_core::{kinfo, kwarn};

use crate::interface::{FilesystemInterface, FsEntryRef, FsTypeName};

bitflags! {
    /// Storage-device-level flags recorded at registration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StorageFlags: u32 {
        /// The backing device cannot be written to.
        const READ_ONLY = 1 << 0;
        /// The device may be physically removed (USB mass storage, …).
        const REMOVABLE = 1 << 1;
    }
}

/// Sector geometry reported by the backing device (§4.7 step a/b:
/// "queries the device descriptor over C5 ... validates sector
/// geometry").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorGeometry {
    /// Bytes per sector. Must be a power of two per §4.7's validation
    /// step.
    pub sector_size: u32,
    /// Total sector count.
    pub sector_count: u64,
}

/// A filesystem-storage's lifecycle state (§3's "state ∈ {initializing,
/// connected, disconnected, failed}").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageState {
    /// Setup is still running.
    Initializing,
    /// Setup completed; at least one partition is mounted.
    Connected,
    /// The backing device is gone (e.g. removable media ejected).
    Disconnected,
    /// Setup failed before any partition could be mounted.
    Failed,
}

/// One partition (or, for an unpartitioned disk, the single
/// whole-disk pseudo-partition) mounted under a storage's directory.
#[derive(Debug, Clone)]
pub struct MountedFilesystem {
    /// Offset of the partition's first sector.
    pub start_sector: u64,
    /// Partition length in sectors.
    pub sector_count: u64,
    /// The detected filesystem type.
    pub fs_type: FsTypeName,
    /// Absolute mount path, e.g. `/storage/<serial>/0`.
    pub mount_path: String,
    /// The module-internal reference returned by the interface's
    /// `initialize`, passed back on every later call into it.
    pub fs_base: FsEntryRef,
}

/// A registered storage device and the filesystems mounted on it
/// (§3 "Filesystem-storage").
#[derive(Debug, Clone)]
pub struct FileSystemStorage {
    id: FsStorageId,
    driver: DriverId,
    device: DeviceId,
    serial: String,
    geometry: Option<SectorGeometry>,
    flags: StorageFlags,
    mounts: Vec<MountedFilesystem>,
    state: StorageState,
}

impl FileSystemStorage {
    /// This storage's identifier.
    #[must_use]
    pub const fn id(&self) -> FsStorageId {
        self.id
    }

    /// The serial string used for its mount directory,
    /// `/storage/<serial>/`.
    #[must_use]
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> StorageState {
        self.state
    }

    /// Filesystems mounted so far.
    #[must_use]
    pub fn mounts(&self) -> &[MountedFilesystem] {
        &self.mounts
    }

    /// The root directory this storage is mounted under.
    #[must_use]
    pub fn root_path(&self) -> String {
        alloc::format!("/storage/{}/", self.serial)
    }
}

/// Reports a backing device's sector geometry (§4.7 step a/b). A real
/// implementation routes this through `vali-ipc` to the storage
/// driver; out of scope here per §1.
pub trait DeviceQuery {
    /// Queries `device`, owned by `driver`, for its sector geometry.
    fn query_geometry(&self, driver: DriverId, device: DeviceId) -> OsResult<SectorGeometry>;
}

/// One candidate partition surfaced by partition-layout parsing
/// (§4.7 step d).
#[derive(Debug, Clone)]
pub struct PartitionLayout {
    /// Offset of the partition's first sector.
    pub start_sector: u64,
    /// Partition length in sectors.
    pub sector_count: u64,
}

/// Parses a storage's partition table, or reports none for an
/// unpartitioned disk (§4.7 step d: "or treats the whole disk as one
/// filesystem").
pub trait PartitionProbe {
    /// Returns the partitions found on `storage`, or an empty `Vec` if
    /// the disk carries no partition table and should be treated as a
    /// single filesystem.
    fn probe(&self, storage: &FileSystemStorage) -> OsResult<Vec<PartitionLayout>>;
}

/// Detects a partition's filesystem type and loads the matching
/// interface module (§4.7 step e).
pub trait FsModuleLoader {
    /// Detects the filesystem type present in `partition` of `storage`.
    fn detect(&self, storage: &FileSystemStorage, partition: &PartitionLayout) -> OsResult<FsTypeName>;

    /// Loads the interface module for `fs_type`.
    fn load(&self, fs_type: &FsTypeName) -> OsResult<&'static dyn FilesystemInterface>;
}

struct Registry {
    storages: BTreeMap<FsStorageId, FileSystemStorage>,
    next_id: u32,
}

/// The process-wide filesystem-storage registry (§5: "cross-filesystem
/// iteration ... uses a dedicated mutex", the `g_disks` equivalent).
pub struct StorageRegistry {
    state: SpinLock<Registry>,
}

impl StorageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SpinLock::new(Registry {
                storages: BTreeMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Registers a newly discovered storage device in state
    /// `initializing` (§4.7: "the VFS acquires a unique id, creates a
    /// `FileSystemStorage` object in state `initializing`").
    pub fn register(&self, driver: DriverId, device: DeviceId, serial: &str, flags: StorageFlags) -> FsStorageId {
        let mut state = self.state.lock();
        let id = FsStorageId::new(state.next_id);
        state.next_id += 1;
        state.storages.insert(
            id,
            FileSystemStorage {
                id,
                driver,
                device,
                serial: String::from(serial),
                geometry: None,
                flags,
                mounts: Vec::new(),
                state: StorageState::Initializing,
            },
        );
        kinfo!("vfs: registered storage {} (serial '{}')", id, serial);
        id
    }

    /// Runs the setup job described by §4.7 steps (a)-(e) against a
    /// registered storage, driving it to `connected`, `disconnected` or
    /// `failed`.
    pub fn setup(
        &self,
        id: FsStorageId,
        query: &dyn DeviceQuery,
        probe: &dyn PartitionProbe,
        loader: &dyn FsModuleLoader,
    ) -> OsResult<()> {
        let (driver, device) = {
            let state = self.state.lock();
            let storage = state.storages.get(&id).ok_or(OsError::NotFound)?;
            (storage.driver, storage.device)
        };

        let geometry = match query.query_geometry(driver, device) {
            Ok(g) if g.sector_size.is_power_of_two() && g.sector_size > 0 => g,
            Ok(_) => {
                self.fail(id, "invalid sector geometry");
                return Err(OsError::InvalidParams);
            }
            Err(e) => {
                self.fail(id, "device geometry query failed");
                return Err(e);
            }
        };
        {
            let mut state = self.state.lock();
            state.storages.get_mut(&id).ok_or(OsError::NotFound)?.geometry = Some(geometry);
        }

        let partitions = {
            let state = self.state.lock();
            let storage = state.storages.get(&id).ok_or(OsError::NotFound)?;
            match probe.probe(storage) {
                Ok(p) => p,
                Err(e) => {
                    drop(state);
                    self.fail(id, "partition probe failed");
                    return Err(e);
                }
            }
        };
        let partitions = if partitions.is_empty() {
            alloc::vec![PartitionLayout {
                start_sector: 0,
                sector_count: geometry.sector_count,
            }]
        } else {
            partitions
        };

        let mut mounted = Vec::new();
        for (index, partition) in partitions.iter().enumerate() {
            let root_path = {
                let state = self.state.lock();
                state.storages[&id].root_path()
            };
            let mount_result = (|| -> OsResult<MountedFilesystem> {
                let fs_type = loader.detect(&self.state.lock().storages[&id], partition)?;
                let interface = loader.load(&fs_type)?;
                let fs_base = FsEntryRef(u64::from(index as u32));
                interface.initialize(fs_base)?;
                Ok(MountedFilesystem {
                    start_sector: partition.start_sector,
                    sector_count: partition.sector_count,
                    fs_type,
                    mount_path: alloc::format!("{root_path}{index}"),
                    fs_base,
                })
            })();
            match mount_result {
                Ok(mount) => mounted.push(mount),
                Err(e) => kwarn!("vfs: storage {} partition {} mount failed: {}", id, index, e),
            }
        }

        let mut state = self.state.lock();
        let storage = state.storages.get_mut(&id).ok_or(OsError::NotFound)?;
        storage.mounts = mounted;
        storage.state = if storage.mounts.is_empty() {
            StorageState::Failed
        } else {
            StorageState::Connected
        };
        if storage.state == StorageState::Failed {
            kwarn!("vfs: storage {} failed: no partition mounted", id);
            Err(OsError::DeviceFault)
        } else {
            kinfo!("vfs: storage {} connected with {} mount(s)", id, storage.mounts.len());
            Ok(())
        }
    }

    /// Marks a storage `disconnected` (e.g. removable media ejected).
    pub fn disconnect(&self, id: FsStorageId) -> OsResult<()> {
        let mut state = self.state.lock();
        let storage = state.storages.get_mut(&id).ok_or(OsError::NotFound)?;
        storage.state = StorageState::Disconnected;
        Ok(())
    }

    fn fail(&self, id: FsStorageId, reason: &str) {
        let mut state = self.state.lock();
        if let Some(storage) = state.storages.get_mut(&id) {
            storage.state = StorageState::Failed;
        }
        kwarn!("vfs: storage {} failed: {}", id, reason);
    }

    /// Returns a snapshot of a registered storage.
    pub fn storage(&self, id: FsStorageId) -> OsResult<FileSystemStorage> {
        self.state.lock().storages.get(&id).cloned().ok_or(OsError::NotFound)
    }
}

impl Default for StorageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

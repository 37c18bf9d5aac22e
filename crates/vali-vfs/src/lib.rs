//! VFS request engine (C7) for the Vali execution substrate.
//!
//! Splits along §4.7's own subsections: filesystem-storage lifecycle
//! (`storage`), the per-filesystem entry cache and its shared-access
//! rule (`entry`, `access`), open-handle lifecycle (`handle`), the
//! loadable filesystem module seam every one of those calls through
//! (`interface`), and fault-driven file views (`view`). The "request
//! actor" §4.7 describes (one job queue draining requests per
//! filesystem, so that device I/O blocks only that filesystem's own
//! cooperative job) is left as a seam: this crate provides the
//! data structures and synchronous operations an actor loop would call
//! into, the way `vali-devmgr::DeviceManager` provides the state
//! machine a driver-RPC dispatch loop calls into.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod access;
pub mod entry;
pub mod handle;
pub mod interface;
pub mod storage;
pub mod view;

pub use access::{access_allowed, AccessFlags};
pub use entry::EntryCache;
pub use handle::{HandleOptions, HandleRegistry, ReadAheadBuffer, VfsHandle, VfsHandleOps};
pub use interface::{
    BufferHandle, CreateOptions, FilesystemInterface, FsEntryRef, FsHandleRef, FsTypeName,
    SEEK_END,
};
pub use storage::{
    DeviceQuery, FileSystemStorage, FsModuleLoader, MountedFilesystem, PartitionLayout,
    PartitionProbe, SectorGeometry, StorageFlags, StorageRegistry, StorageState,
};
pub use view::{FileService, FileView, ViewManager};

pub use vali_core::error::{OsError, OsResult};

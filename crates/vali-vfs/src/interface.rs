//! The loadable filesystem module interface (§6 "Filesystem interface").
//!
//! A concrete filesystem (MFS and friends, §1's "concrete filesystem
//! parsers" — explicitly out of scope) implements this trait; the VFS
//! request engine only ever calls through it. `FsEntryRef`/`FsHandleRef`
//! stand in for the module's own `entry_base`/`handle_base` pointers —
//! opaque to this crate, passed back unexamined on every subsequent
//! call, the same way `original_source/librt/libddk/include/ddk/filesystem.h`
//! treats a filesystem's internal entry/handle pointers as opaque
//! `void*` the VFS layer only ever round-trips.

use alloc::string::String;

use vali_core::error::OsResult;

/// Options accepted by [`FilesystemInterface::create_path`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOptions {
    /// Create intermediate directories that do not yet exist.
    pub create_parents: bool,
    /// Create a directory rather than a file.
    pub directory: bool,
    /// Fail if the path already exists, rather than returning its
    /// existing entry.
    pub fail_if_exists: bool,
}

/// Sentinel `absolute_pos` value for [`FilesystemInterface::seek`]
/// meaning "the entry's current end", used to resolve append-mode
/// handle creation without a dedicated stat call.
pub const SEEK_END: u64 = u64::MAX;

/// Opaque handle to a filesystem module's internal entry record,
/// mirroring the `entry_base` pointer §6 passes through every
/// entry-scoped operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FsEntryRef(pub u64);

/// Opaque handle to a filesystem module's internal open-file record
/// (`handle_base` in §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FsHandleRef(pub u64);

/// Identifies a shared-memory buffer used for a transfer, in place of a
/// raw pointer (§6: "Buffer transfers use shared-memory handles, not
/// pointers").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// The operations a loadable filesystem module exports (§6). Implemented
/// once per filesystem type and shared across every mounted instance of
/// that type; `fs` distinguishes which mount an entry-scoped call
/// targets.
pub trait FilesystemInterface: Send + Sync {
    /// Prepares a freshly mounted instance (superblock read, root entry
    /// construction, …).
    fn initialize(&self, fs: FsEntryRef) -> OsResult<()>;

    /// Tears down a mounted instance. `unmount_flags` is opaque to this
    /// crate and forwarded verbatim.
    fn destroy(&self, fs: FsEntryRef, unmount_flags: u32) -> OsResult<()>;

    /// Resolves `path` (relative to `fs`'s root) to a module-internal
    /// entry reference.
    fn open_entry(&self, fs: FsEntryRef, path: &str) -> OsResult<FsEntryRef>;

    /// Creates `path`, per `options`, returning the new entry.
    fn create_path(&self, fs: FsEntryRef, path: &str, options: CreateOptions) -> OsResult<FsEntryRef>;

    /// Releases a module-internal entry reference obtained from
    /// [`open_entry`](Self::open_entry) or
    /// [`create_path`](Self::create_path).
    fn close_entry(&self, fs: FsEntryRef, entry: FsEntryRef) -> OsResult<()>;

    /// Removes the object `entry` refers to from the filesystem.
    fn delete_entry(&self, fs: FsEntryRef, entry: FsEntryRef) -> OsResult<()>;

    /// Opens an I/O-capable handle onto `entry`.
    fn open_handle(&self, fs: FsEntryRef, entry: FsEntryRef) -> OsResult<FsHandleRef>;

    /// Closes a handle obtained from [`open_handle`](Self::open_handle).
    fn close_handle(&self, fs: FsEntryRef, handle: FsHandleRef) -> OsResult<()>;

    /// Reads `units` filesystem-defined units starting at `off` from
    /// `handle` into `buffer`, returning the count actually read.
    fn read(
        &self,
        fs: FsEntryRef,
        entry: FsEntryRef,
        handle: FsHandleRef,
        buffer: BufferHandle,
        off: u64,
        units: usize,
    ) -> OsResult<usize>;

    /// Writes `units` units from `buffer` to `handle` at `off`,
    /// returning the count actually written.
    fn write(
        &self,
        fs: FsEntryRef,
        entry: FsEntryRef,
        handle: FsHandleRef,
        buffer: BufferHandle,
        off: u64,
        units: usize,
    ) -> OsResult<usize>;

    /// Repositions `handle` to `absolute_pos` and returns the resulting
    /// absolute position, mirroring `lseek`'s return convention. The
    /// sentinel [`SEEK_END`] stands in for "the entry's current size" —
    /// the distillation's interface surface has no separate stat call,
    /// so append-mode handle creation (§4.7 "Handle lifecycle") resolves
    /// its position by seeking to this sentinel and reading back the
    /// real offset the module reports.
    fn seek(&self, fs: FsEntryRef, entry: FsEntryRef, handle: FsHandleRef, absolute_pos: u64) -> OsResult<u64>;

    /// Grows or truncates `entry` to `size` bytes.
    fn change_size(&self, fs: FsEntryRef, entry: FsEntryRef, size: u64) -> OsResult<()>;
}

/// A human-readable filesystem type tag, supplementing §6 — the
/// distillation names filesystem *operations* but not how the VFS picks
/// which module to load for a freshly detected partition; this mirrors
/// the type string `original_source/kernel/System/FileSystems/Mfs/Mfs.c`'s
/// caller matches against before invoking `Initialize`.
pub type FsTypeName = String;

//! File views, i.e. memory-mapped files (§3 "File view", §4.7 "File
//! views (memory-mapped files)").
//!
//! Grounded on `vali-mm::fault::PageFaultHandler` as the seam back into
//! a memory space, and on
//! `original_source/librt/libos/services/fileview.c`'s split between
//! `OSFileViewCreate` (map + register fault handler) and the
//! fault-time `transfer_absolute` round trip to the owning filesystem's
//! request actor — out of scope here per §1, so [`FileService`] stands
//! in for it exactly the way [`crate::interface::FilesystemInterface`]
//! stands in for a concrete filesystem module.

use alloc::sync::Arc;
use alloc::vec::Vec;

use vali_core::addr::{VirtAddr, PAGE_SIZE};
use vali_core::error::{OsError, OsResult};
use vali_core::id::{HandleId, ProcessId};
use vali_core::sync::SpinLock;

use vali_mm::{MemAttrs, MemorySpace, PageFaultHandler};

use crate::interface::BufferHandle;

/// The file service's transfer primitive used by file views (§6:
/// "`transfer_absolute(process, file_handle, write, offset_lo,
/// offset_hi, shm_handle, shm_offset, length) -> (status, bytes)`").
/// The 32-bit `offset_lo`/`offset_hi` wire split collapses to one `u64`
/// here; this crate has no wire encoding of its own to preserve.
pub trait FileService: Send + Sync {
    /// Transfers `length` bytes between `file_handle` at `offset` and
    /// the shared-memory buffer `shm` at `shm_offset`, in the direction
    /// given by `write`. Returns the number of bytes actually
    /// transferred.
    fn transfer_absolute(
        &self,
        process: ProcessId,
        file_handle: HandleId,
        write: bool,
        offset: u64,
        shm: BufferHandle,
        shm_offset: u64,
        length: usize,
    ) -> OsResult<usize>;
}

/// A mapped file view (§3 "File view").
pub struct FileView {
    process: ProcessId,
    file_handle: HandleId,
    file_offset: u64,
    shm: BufferHandle,
    writable: bool,
    service: Arc<dyn FileService>,
}

impl PageFaultHandler for FileView {
    fn fill(&self, page_index: u64, buf: &mut [u8]) -> OsResult<()> {
        let offset = self.file_offset + page_index * PAGE_SIZE;
        let shm_offset = page_index * PAGE_SIZE;
        let n = self.service.transfer_absolute(
            self.process,
            self.file_handle,
            false,
            offset,
            self.shm,
            shm_offset,
            buf.len(),
        )?;
        if n < buf.len() {
            buf[n..].fill(0);
        }
        Ok(())
    }

    fn flush(&self, page_index: u64, buf: &[u8]) -> OsResult<()> {
        if !self.writable {
            return Ok(());
        }
        let offset = self.file_offset + page_index * PAGE_SIZE;
        let shm_offset = page_index * PAGE_SIZE;
        self.service
            .transfer_absolute(self.process, self.file_handle, true, offset, self.shm, shm_offset, buf.len())?;
        Ok(())
    }
}

struct MappedView {
    base: VirtAddr,
    length: u64,
    shm: BufferHandle,
    view: Arc<FileView>,
}

/// Tracks every file view mapped into one memory space, so
/// [`ViewManager::flush`]/[`ViewManager::unmap`] can be driven by
/// address alone the way the host-facing API (§4.7) describes.
pub struct ViewManager {
    views: SpinLock<Vec<MappedView>>,
}

impl ViewManager {
    /// Creates an empty view manager for one memory space.
    #[must_use]
    pub fn new() -> Self {
        Self { views: SpinLock::new(Vec::new()) }
    }

    /// `view_create(file_handle, flags, offset, length) -> addr`
    /// (§4.7): allocates a clean fault-driven region in `space` sized to
    /// `length`, rounded up to whole pages.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        space: &MemorySpace,
        process: ProcessId,
        file_handle: HandleId,
        flags: MemAttrs,
        offset: u64,
        length: u64,
        shm: BufferHandle,
        service: Arc<dyn FileService>,
    ) -> OsResult<VirtAddr> {
        if length == 0 {
            return Err(OsError::InvalidParams);
        }
        let view = Arc::new(FileView {
            process,
            file_handle,
            file_offset: offset,
            shm,
            writable: flags.contains(MemAttrs::WRITE),
            service,
        });
        let base = space.map(length, flags | MemAttrs::FILE_BACKED, view.clone())?;
        self.views.lock().push(MappedView { base, length, shm, view });
        Ok(base)
    }

    /// `view_flush(addr, length, flags)` (§4.7): walks the view's page
    /// range, batches consecutive dirty pages and issues one
    /// `transfer_absolute` per run.
    pub fn flush(&self, space: &MemorySpace, addr: VirtAddr) -> OsResult<()> {
        let mapped = self.find(addr).ok_or(OsError::NotFound)?;
        let page_count = mapped.length.div_ceil(PAGE_SIZE);

        let mut run_start: Option<u64> = None;
        for idx in 0..=page_count {
            let dirty = idx < page_count && {
                let page_addr = VirtAddr::new(addr.as_u64() + idx * PAGE_SIZE);
                space.is_dirty(page_addr).unwrap_or(false)
            };
            match (dirty, run_start) {
                (true, None) => run_start = Some(idx),
                (false, Some(start)) => {
                    let buf = [0u8; PAGE_SIZE as usize];
                    for page in start..idx {
                        mapped.view.flush(page, &buf)?;
                        let page_addr = VirtAddr::new(addr.as_u64() + page * PAGE_SIZE);
                        space.clear_dirty(page_addr)?;
                    }
                    run_start = None;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// `view_unmap` (§4.7): flushes a writable view, then unmaps it and
    /// releases the tracking entry. The shared-memory handle itself is
    /// released by the caller (the shm subsystem is out of scope here).
    pub fn unmap(&self, space: &MemorySpace, addr: VirtAddr) -> OsResult<BufferHandle> {
        if self.find(addr).is_some_and(|m| m.view.writable) {
            self.flush(space, addr)?;
        }
        space.unmap(addr)?;
        let mut views = self.views.lock();
        let pos = views.iter().position(|m| m.base == addr).ok_or(OsError::NotFound)?;
        Ok(views.remove(pos).shm)
    }

    fn find(&self, addr: VirtAddr) -> Option<MappedViewSnapshot> {
        self.views
            .lock()
            .iter()
            .find(|m| m.base == addr)
            .map(|m| MappedViewSnapshot { length: m.length, view: m.view.clone() })
    }
}

struct MappedViewSnapshot {
    length: u64,
    view: Arc<FileView>,
}

impl Default for ViewManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct CountingService {
        reads: AtomicUsize,
        writes: AtomicUsize,
    }

    impl FileService for CountingService {
        fn transfer_absolute(
            &self,
            _process: ProcessId,
            _file_handle: HandleId,
            write: bool,
            _offset: u64,
            _shm: BufferHandle,
            _shm_offset: u64,
            length: usize,
        ) -> OsResult<usize> {
            if write {
                self.writes.fetch_add(1, Ordering::SeqCst);
            } else {
                self.reads.fetch_add(1, Ordering::SeqCst);
            }
            Ok(length)
        }
    }

    #[test]
    fn first_touch_faults_in_via_transfer_absolute() {
        let space = MemorySpace::new(VirtAddr::new(0x1000), 0x100000);
        let service = Arc::new(CountingService { reads: AtomicUsize::new(0), writes: AtomicUsize::new(0) });
        let manager = ViewManager::new();
        let addr = manager
            .create(&space, ProcessId::new(1), HandleId::new(1), MemAttrs::READ, 0, PAGE_SIZE, BufferHandle(1), service.clone())
            .unwrap();

        assert_eq!(service.reads.load(Ordering::SeqCst), 0);
        space.handle_fault(addr, false).unwrap();
        assert_eq!(service.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unmap_flushes_dirty_pages_of_writable_view() {
        let space = MemorySpace::new(VirtAddr::new(0x1000), 0x100000);
        let service = Arc::new(CountingService { reads: AtomicUsize::new(0), writes: AtomicUsize::new(0) });
        let manager = ViewManager::new();
        let addr = manager
            .create(&space, ProcessId::new(1), HandleId::new(1), MemAttrs::RW, 0, PAGE_SIZE, BufferHandle(1), service.clone())
            .unwrap();

        space.handle_fault(addr, true).unwrap();
        assert!(space.is_dirty(addr).unwrap());

        manager.unmap(&space, addr).unwrap();
        assert_eq!(service.writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn read_only_view_never_flushes() {
        let space = MemorySpace::new(VirtAddr::new(0x1000), 0x100000);
        let service = Arc::new(CountingService { reads: AtomicUsize::new(0), writes: AtomicUsize::new(0) });
        let manager = ViewManager::new();
        let addr = manager
            .create(&space, ProcessId::new(1), HandleId::new(1), MemAttrs::READ, 0, PAGE_SIZE, BufferHandle(1), service.clone())
            .unwrap();

        space.handle_fault(addr, false).unwrap();
        manager.unmap(&space, addr).unwrap();
        assert_eq!(service.writes.load(Ordering::SeqCst), 0);
    }
}

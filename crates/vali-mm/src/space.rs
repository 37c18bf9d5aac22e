//! Per-process memory space (C2): reserve/commit/map/unmap, attribute
//! queries and fault dispatch.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use vali_core::addr::{VirtAddr, PAGE_SIZE};
use vali_core::error::{OsError, OsResult};
use vali_core::sync::SpinLock;

use crate::attrs::MemAttrs;
use crate::fault::PageFaultHandler;
use crate::region::VaAllocator;

#[derive(Debug, Clone, Copy, Default)]
struct PageState {
    committed: bool,
    dirty: bool,
}

struct Region {
    size: u64,
    attrs: MemAttrs,
    pages: Vec<PageState>,
    fault_handler: Option<Arc<dyn PageFaultHandler>>,
}

impl Region {
    fn page_count(size: u64) -> usize {
        (size / PAGE_SIZE) as usize
    }

    fn contains(&self, base: u64, addr: u64) -> bool {
        addr >= base && addr < base + self.size
    }
}

/// A process's virtual memory space: a set of non-overlapping regions
/// carved out of a fixed virtual address range.
///
/// Mirrors the teacher's `AddressSpace`/region-allocator split
/// (`kernel/mm/src/address_space.rs`, `kernel/mm/src/region.rs`) but
/// tracks per-page commit/dirty state instead of real page table
/// entries, since no architecture backend is in scope here.
pub struct MemorySpace {
    va: SpinLock<VaAllocator>,
    regions: SpinLock<BTreeMap<u64, Region>>,
}

impl MemorySpace {
    /// Creates a memory space managing the virtual range
    /// `[base, base + size)`.
    #[must_use]
    pub fn new(base: VirtAddr, size: u64) -> Self {
        Self {
            va: SpinLock::new(VaAllocator::new(base, size)),
            regions: SpinLock::new(BTreeMap::new()),
        }
    }

    /// Reserves `size` bytes of address space with `attrs`, with no
    /// backing pages committed yet. Returns the region's base address.
    pub fn reserve(&self, size: u64, attrs: MemAttrs) -> OsResult<VirtAddr> {
        if size == 0 {
            return Err(OsError::InvalidParams);
        }
        let base = self.va.lock().allocate(size)?;
        let page_count = Region::page_count(VaAllocator::page_align(size));
        let mut regions = self.regions.lock();
        regions.insert(
            base.as_u64(),
            Region {
                size: VaAllocator::page_align(size),
                attrs,
                pages: vec![PageState::default(); page_count],
                fault_handler: None,
            },
        );
        Ok(base)
    }

    /// Commits every page in `[addr, addr + size)`, marking them
    /// present. `addr` must be a region base previously returned by
    /// [`reserve`](Self::reserve) or [`map`](Self::map); only the pages
    /// covered by `size` (rounded up to page granularity) are touched,
    /// leaving the rest of the region exactly as it was — a caller that
    /// commits a sub-range of a larger reservation must not over-commit
    /// the pages it never asked for.
    pub fn commit(&self, addr: VirtAddr, size: u64) -> OsResult<()> {
        let mut regions = self.regions.lock();
        let region = regions.get_mut(&addr.as_u64()).ok_or(OsError::NotFound)?;
        if size > region.size {
            return Err(OsError::InvalidParams);
        }
        let page_count = Region::page_count(VaAllocator::page_align(size)).min(region.pages.len());
        for page in &mut region.pages[..page_count] {
            page.committed = true;
        }
        Ok(())
    }

    /// Maps a file-backed (or otherwise fault-driven) region: pages
    /// start uncommitted and are filled lazily through `handler` when
    /// first touched by [`handle_fault`](Self::handle_fault).
    pub fn map(
        &self,
        size: u64,
        attrs: MemAttrs,
        handler: Arc<dyn PageFaultHandler>,
    ) -> OsResult<VirtAddr> {
        if size == 0 {
            return Err(OsError::InvalidParams);
        }
        let base = self.va.lock().allocate(size)?;
        let aligned = VaAllocator::page_align(size);
        let page_count = Region::page_count(aligned);
        let mut regions = self.regions.lock();
        regions.insert(
            base.as_u64(),
            Region {
                size: aligned,
                attrs: attrs | MemAttrs::FILE_BACKED,
                pages: vec![PageState::default(); page_count],
                fault_handler: Some(handler),
            },
        );
        Ok(base)
    }

    /// Unmaps the region at `addr`, flushing any dirty pages through
    /// its fault handler before dropping the region.
    pub fn unmap(&self, addr: VirtAddr) -> OsResult<()> {
        let region = {
            let mut regions = self.regions.lock();
            regions.remove(&addr.as_u64()).ok_or(OsError::NotFound)?
        };
        if let Some(handler) = &region.fault_handler {
            let buf = [0u8; PAGE_SIZE as usize];
            for (idx, page) in region.pages.iter().enumerate() {
                if page.committed && page.dirty {
                    handler.flush(idx as u64, &buf)?;
                }
            }
        }
        self.va.lock().deallocate(addr, region.size)?;
        Ok(())
    }

    /// `clone_mapping(src_space, dst_space, vaddr, len, attrs)` (§4.2):
    /// shares the region at `addr` into `target`, preserving its fault
    /// handler (the closest approximation to "shares the same physical
    /// pages" available at this layer, since no architecture-level frame
    /// allocator is in scope — see `vali-core::addr`'s doc comment) but
    /// resetting per-page commit/dirty state so the target re-faults on
    /// first touch. `attrs` is intersected with the source region's own
    /// attributes: a clone can only narrow permissions the source
    /// grants, never widen them (a read-only source cannot be
    /// clone-mapped writable into the destination).
    pub fn clone_mapping(
        &self,
        addr: VirtAddr,
        target: &MemorySpace,
        attrs: MemAttrs,
    ) -> OsResult<VirtAddr> {
        let (size, src_attrs, handler) = {
            let regions = self.regions.lock();
            let region = regions.get(&addr.as_u64()).ok_or(OsError::NotFound)?;
            (region.size, region.attrs, region.fault_handler.clone())
        };
        let granted = (attrs & src_attrs) | MemAttrs::SHARED;
        let new_base = target.va.lock().allocate(size)?;
        let page_count = Region::page_count(size);
        target.regions.lock().insert(
            new_base.as_u64(),
            Region {
                size,
                attrs: granted,
                pages: vec![PageState::default(); page_count],
                fault_handler: handler,
            },
        );
        Ok(new_base)
    }

    /// Returns the attributes of the region containing `addr`.
    pub fn query_attributes(&self, addr: VirtAddr) -> OsResult<MemAttrs> {
        let regions = self.regions.lock();
        let (_, region) = Self::find(&regions, addr.as_u64()).ok_or(OsError::NotFound)?;
        Ok(region.attrs)
    }

    /// Returns whether the page containing `addr` has been written
    /// since it was last committed or cleared via
    /// [`clear_dirty`](Self::clear_dirty).
    pub fn is_dirty(&self, addr: VirtAddr) -> OsResult<bool> {
        let regions = self.regions.lock();
        let (base, region) = Self::find(&regions, addr.as_u64()).ok_or(OsError::NotFound)?;
        let idx = Self::page_index(base, addr.as_u64());
        Ok(region.pages.get(idx).is_some_and(|p| p.dirty))
    }

    /// Clears the dirty bit of the page containing `addr` without
    /// flushing it. Dirty-bit clearing is a separate, explicit call
    /// rather than an implicit side effect of commit or unmap, so a
    /// caller controls exactly when a page is considered clean again.
    pub fn clear_dirty(&self, addr: VirtAddr) -> OsResult<()> {
        let mut regions = self.regions.lock();
        let base = regions
            .range(..=addr.as_u64())
            .rev()
            .find(|(base, region)| region.contains(**base, addr.as_u64()))
            .map(|(base, _)| *base)
            .ok_or(OsError::NotFound)?;
        let region = regions.get_mut(&base).unwrap();
        let idx = Self::page_index(base, addr.as_u64());
        if let Some(page) = region.pages.get_mut(idx) {
            page.dirty = false;
        }
        Ok(())
    }

    /// Services a page fault at `addr`. Returns [`OsError::Permissions`]
    /// if `write` is set but the region is not writable; for an
    /// uncommitted page in a file-backed region, invokes the fault
    /// handler to fill it before marking it present.
    pub fn handle_fault(&self, addr: VirtAddr, write: bool) -> OsResult<()> {
        let mut regions = self.regions.lock();
        let base = regions
            .range(..=addr.as_u64())
            .rev()
            .find(|(base, region)| region.contains(**base, addr.as_u64()))
            .map(|(base, _)| *base)
            .ok_or(OsError::NotFound)?;
        let region = regions.get_mut(&base).unwrap();
        if write && !region.attrs.contains(MemAttrs::WRITE) {
            return Err(OsError::Permissions);
        }
        let idx = Self::page_index(base, addr.as_u64());
        let page = region.pages.get_mut(idx).ok_or(OsError::InvalidParams)?;
        if !page.committed {
            if let Some(handler) = &region.fault_handler {
                let mut buf = [0u8; PAGE_SIZE as usize];
                handler.fill(idx as u64, &mut buf)?;
            }
            region.pages[idx].committed = true;
        }
        if write {
            region.pages[idx].dirty = true;
        }
        Ok(())
    }

    fn find(regions: &BTreeMap<u64, Region>, addr: u64) -> Option<(u64, &Region)> {
        regions
            .range(..=addr)
            .rev()
            .find(|(base, region)| region.contains(**base, addr))
            .map(|(base, region)| (*base, region))
    }

    fn page_index(base: u64, addr: u64) -> usize {
        ((addr - base) / PAGE_SIZE) as usize
    }
}

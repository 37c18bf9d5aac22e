//! Demand-paging callback invoked by [`crate::MemorySpace::handle_fault`].
//!
//! Grounded on the file-view fault path described for C7: a mapped file
//! view has no backing pages until touched, at which point the VFS
//! request engine supplies the missing page's bytes. This trait is the
//! seam between `vali-mm` and that subsystem; `vali-vfs` implements it
//! for its file views.

use vali_core::error::OsResult;

/// Supplies and persists page contents for a file-backed region.
pub trait PageFaultHandler: Send + Sync {
    /// Fills `buf` (exactly one page) with the contents backing the
    /// region's `page_index`-th page (0-based, relative to the region's
    /// base address).
    fn fill(&self, page_index: u64, buf: &mut [u8]) -> OsResult<()>;

    /// Writes a dirty page's contents back to the backing store. Called
    /// by [`crate::MemorySpace::unmap`] for pages marked dirty; the
    /// default implementation discards the write, appropriate for
    /// read-only or purely anonymous-on-fault views.
    fn flush(&self, _page_index: u64, _buf: &[u8]) -> OsResult<()> {
        Ok(())
    }
}

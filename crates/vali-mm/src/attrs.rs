//! Per-region protection and mapping attributes.

use bitflags::bitflags;

bitflags! {
    /// Protection and mapping-kind bits recorded per region and
    /// returned by [`crate::MemorySpace::query_attributes`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemAttrs: u32 {
        /// Pages may be read.
        const READ = 1 << 0;
        /// Pages may be written.
        const WRITE = 1 << 1;
        /// Pages may be executed.
        const EXEC = 1 << 2;
        /// The region is backed by a file view rather than anonymous
        /// memory; its pages are filled by a [`crate::PageFaultHandler`].
        const FILE_BACKED = 1 << 3;
        /// The region is shared with at least one other memory space
        /// (created via [`crate::MemorySpace::clone_mapping`]).
        const SHARED = 1 << 4;
    }
}

impl MemAttrs {
    /// Common read/write anonymous-memory attributes.
    pub const RW: Self = Self::READ.union(Self::WRITE);

    /// Common read/execute attributes for mapped code.
    pub const RX: Self = Self::READ.union(Self::EXEC);
}

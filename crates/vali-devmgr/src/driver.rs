//! Driver records and the vendor/class matching rule (§4.6).

use alloc::string::String;
use alloc::vec::Vec;

use vali_core::id::{DeviceId, DriverId, HandleId};

/// A driver's stated match criteria: a list of `(vendor, product)` pairs
/// it claims, plus an optional `(class, subclass)` pair it claims
/// irrespective of vendor.
#[derive(Debug, Clone, Default)]
pub struct DriverMatch {
    /// `(vendor, product)` pairs this driver explicitly supports.
    pub vendor_products: Vec<(u32, u32)>,
    /// `(class, subclass)` this driver supports regardless of vendor.
    pub class_subclass: Option<(u32, u32)>,
}

impl DriverMatch {
    /// Whether this driver's criteria match `descriptor` per §4.6's
    /// matching rule: a vendor/product hit, or an exact class/subclass
    /// hit.
    #[must_use]
    pub fn matches(&self, descriptor: super::device::DeviceDescriptor) -> bool {
        let vendor_hit = self
            .vendor_products
            .iter()
            .any(|&(v, p)| v == descriptor.vendor && p == descriptor.product);
        let class_hit = self
            .class_subclass
            .is_some_and(|(c, s)| c == descriptor.class && s == descriptor.subclass);
        vendor_hit || class_hit
    }
}

/// A driver's lifecycle state (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Not spawned yet.
    NotLoaded,
    /// Spawned; waiting on [`crate::DeviceManager::driver_loaded`].
    Loading,
    /// Loaded and reachable over its RPC endpoint.
    Available,
}

/// A registered driver (§4.6).
#[derive(Debug, Clone)]
pub struct DriverRecord {
    id: DriverId,
    /// Executable path, passed to the spawner when a match first loads
    /// this driver.
    path: String,
    matcher: DriverMatch,
    state: DriverState,
    /// Devices matched to this driver while it is `notloaded` or
    /// `loading`, re-dispatched once it becomes `available`.
    pending: Vec<DeviceId>,
    /// The driver's RPC endpoint handle, set by
    /// [`crate::DeviceManager::driver_loaded`].
    handle: Option<HandleId>,
}

impl DriverRecord {
    pub(crate) fn new(id: DriverId, path: String, matcher: DriverMatch) -> Self {
        Self {
            id,
            path,
            matcher,
            state: DriverState::NotLoaded,
            pending: Vec::new(),
            handle: None,
        }
    }

    /// This driver's identifier.
    #[must_use]
    pub const fn id(&self) -> DriverId {
        self.id
    }

    /// The executable path recorded for this driver.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// This driver's current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> DriverState {
        self.state
    }

    /// The driver's RPC endpoint handle, once `available`.
    #[must_use]
    pub const fn handle(&self) -> Option<HandleId> {
        self.handle
    }

    /// Devices currently queued for this driver.
    #[must_use]
    pub fn pending(&self) -> &[DeviceId] {
        &self.pending
    }

    pub(crate) fn matches(&self, descriptor: super::device::DeviceDescriptor) -> bool {
        self.matcher.matches(descriptor)
    }

    pub(crate) fn push_pending(&mut self, device: DeviceId) {
        self.pending.push(device);
    }

    pub(crate) fn take_pending(&mut self) -> Vec<DeviceId> {
        core::mem::take(&mut self.pending)
    }

    pub(crate) fn set_state(&mut self, state: DriverState) {
        self.state = state;
    }

    pub(crate) fn set_handle(&mut self, handle: HandleId) {
        self.handle = Some(handle);
    }
}

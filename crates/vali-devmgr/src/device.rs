//! Device records (§4.6).

use vali_core::id::{DeviceId, DriverId};

/// Vendor/product/class identification a device advertises at
/// registration and a driver matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Vendor identifier, e.g. a PCI vendor id.
    pub vendor: u32,
    /// Product identifier, e.g. a PCI device id.
    pub product: u32,
    /// Device class (PCI base class or equivalent).
    pub class: u32,
    /// Device subclass.
    pub subclass: u32,
}

/// Whether a device is itself a bus controller (and therefore a valid
/// target for `ioctl`) or a leaf device hanging off one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// A bus controller; `ioctl` is valid against it.
    Bus,
    /// A leaf device; `ioctl` against it returns
    /// [`vali_core::error::OsError::InvalidParams`].
    Leaf,
}

/// A registered device (§4.6, §3).
#[derive(Debug, Clone)]
pub struct Device {
    id: DeviceId,
    parent: Option<DeviceId>,
    descriptor: DeviceDescriptor,
    kind: DeviceKind,
    /// The driver currently attached, or [`DriverId::INVALID`] before a
    /// match lands.
    driver: DriverId,
}

impl Device {
    pub(crate) fn new(
        id: DeviceId,
        parent: Option<DeviceId>,
        descriptor: DeviceDescriptor,
        kind: DeviceKind,
    ) -> Self {
        Self {
            id,
            parent,
            descriptor,
            kind,
            driver: DriverId::INVALID,
        }
    }

    /// This device's identifier.
    #[must_use]
    pub const fn id(&self) -> DeviceId {
        self.id
    }

    /// The parent device this one was enumerated under, if any.
    #[must_use]
    pub const fn parent(&self) -> Option<DeviceId> {
        self.parent
    }

    /// This device's identification descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> DeviceDescriptor {
        self.descriptor
    }

    /// Whether this device is a bus controller or a leaf device.
    #[must_use]
    pub const fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// The driver currently attached to this device, if any.
    #[must_use]
    pub const fn driver(&self) -> DriverId {
        self.driver
    }

    pub(crate) fn set_driver(&mut self, driver: DriverId) {
        self.driver = driver;
    }
}

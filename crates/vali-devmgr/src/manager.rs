//! The device manager itself (§4.6): device/driver registries, the
//! vendor/class matching rule, and the spawn/dispatch state machine.
//!
//! Grounded on the teacher's `hadron-kernel/src/drivers/device_registry.rs`
//! (a `SpinLock`-guarded `BTreeMap` registry with monotonic id
//! generation) for the registry shape, and on
//! `original_source/servers/devicemanager/main.c`'s `RegisterDevice`/
//! `RegisterContract`/`InstallDriver` flow for the id-generation and
//! match-then-spawn-or-queue sequencing — that original predates the
//! vendor/class matching rule this module implements, which instead
//! comes straight from §4.6.
//!
//! Actually spawning a driver process and actually delivering a matched
//! device over IPC are both host responsibilities this crate has no
//! business owning directly (no dependency on a process-creation
//! syscall or on `vali-ipc`'s concrete arena type); both are seams —
//! [`DriverSpawner`] and [`DriverChannel`] — a caller backs with real
//! implementations, the same pattern `vali-mm`'s `PageFaultHandler` and
//! `vali-ipc`'s `Mapper` use.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use bitflags::bitflags;

use vali_core::error::{OsError, OsResult};
use vali_core::id::{DeviceId, DriverId, HandleId};
use vali_core::sync::SpinLock;
use vali_core::{kinfo, kwarn};

use crate::device::{Device, DeviceDescriptor, DeviceKind};
use crate::driver::{DriverMatch, DriverRecord, DriverState};

bitflags! {
    /// Flags accepted by [`DeviceManager::register_device`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegisterFlags: u32 {
        /// Attempt a driver match immediately after storing the device
        /// record.
        const LOAD_DRIVER = 1 << 0;
    }
}

/// Spawns a driver executable for a first match against a `notloaded`
/// driver record (§4.6: "spawn the driver executable ... passing an
/// identification argument").
pub trait DriverSpawner {
    /// Spawns `path`, passing `device` as its identification argument.
    /// An `Err` return puts the driver back to `notloaded` per §4.6's
    /// failure semantics.
    fn spawn(&self, path: &str, device: &Device) -> OsResult<()>;
}

/// Delivers a matched device to an `available` driver over its RPC
/// endpoint (§4.6 "send the device record to the driver immediately via
/// C5").
pub trait DriverChannel {
    /// Sends `device` to the driver reachable at `handle`.
    fn notify(&self, handle: HandleId, device: &Device) -> OsResult<()>;
}

/// Valid `ioctl` targets (§4.6: "I/O-ctl to a non-bus device returns
/// *invalid*"). Only [`IoctlTarget::Bus`] exists today, mirroring
/// `original_source`'s single `__DEVICEMANAGER_IOCTL_BUS` target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlTarget {
    /// The bus-level ioctl surface, valid only against
    /// [`DeviceKind::Bus`] devices.
    Bus,
}

struct Registries {
    devices: BTreeMap<DeviceId, Device>,
    drivers: BTreeMap<DriverId, DriverRecord>,
    next_device: u32,
    next_driver: u32,
}

/// The device manager (§4.6): owns the device and driver registries and
/// drives the matching/spawn/dispatch state machine.
pub struct DeviceManager {
    state: SpinLock<Registries>,
}

impl DeviceManager {
    /// Creates an empty device manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SpinLock::new(Registries {
                devices: BTreeMap::new(),
                drivers: BTreeMap::new(),
                next_device: 0,
                next_driver: 0,
            }),
        }
    }

    /// Registers a driver definition (its executable path and match
    /// criteria) so later device registrations can be matched against
    /// it. §4.6 does not name this operation explicitly — it presumes
    /// driver records already exist to match against — so it is
    /// supplemented here the way `original_source`'s `RegisterContract`
    /// populates the contract table a query later searches.
    pub fn register_driver(&self, path: &str, matcher: DriverMatch) -> DriverId {
        let mut state = self.state.lock();
        let id = DriverId::new(state.next_driver);
        state.next_driver += 1;
        state
            .drivers
            .insert(id, DriverRecord::new(id, String::from(path), matcher));
        kinfo!("devmgr: registered driver {} at '{}'", id, path);
        id
    }

    /// Registers a device (§4.6 `device_register`). If `flags` includes
    /// [`RegisterFlags::LOAD_DRIVER`], attempts a match immediately.
    pub fn register_device(
        &self,
        parent: Option<DeviceId>,
        descriptor: DeviceDescriptor,
        kind: DeviceKind,
        flags: RegisterFlags,
        spawner: &dyn DriverSpawner,
        channel: &dyn DriverChannel,
    ) -> OsResult<DeviceId> {
        let id = {
            let mut state = self.state.lock();
            let id = DeviceId::new(state.next_device);
            state.next_device += 1;
            state.devices.insert(id, Device::new(id, parent, descriptor, kind));
            id
        };

        if flags.contains(RegisterFlags::LOAD_DRIVER) {
            self.try_match(id, spawner, channel)?;
        }
        Ok(id)
    }

    /// Finds the first driver whose criteria match `device`'s
    /// descriptor and advances the match state machine for it (§4.6).
    /// If no driver matches, the device is left unattached; a later
    /// `driver_loaded`/`register_driver` call does not automatically
    /// retry it — §4.6 only promises a retry after a spawn failure.
    pub fn try_match(
        &self,
        device: DeviceId,
        spawner: &dyn DriverSpawner,
        channel: &dyn DriverChannel,
    ) -> OsResult<()> {
        let mut state = self.state.lock();
        let descriptor = state
            .devices
            .get(&device)
            .ok_or(OsError::NotFound)?
            .descriptor();

        let Some(&driver_id) = state
            .drivers
            .iter()
            .find(|(_, d)| d.matches(descriptor))
            .map(|(id, _)| id)
        else {
            return Ok(());
        };

        let driver_state = state.drivers[&driver_id].state();
        match driver_state {
            DriverState::NotLoaded => {
                let path = String::from(state.drivers[&driver_id].path());
                let dev = state.devices[&device].clone();
                drop(state);
                let spawn_result = spawner.spawn(&path, &dev);
                let mut state = self.state.lock();
                let driver = state.drivers.get_mut(&driver_id).expect("driver vanished");
                match spawn_result {
                    Ok(()) => {
                        driver.push_pending(device);
                        driver.set_state(DriverState::Loading);
                        state
                            .devices
                            .get_mut(&device)
                            .expect("device vanished")
                            .set_driver(driver_id);
                        Ok(())
                    }
                    Err(e) => {
                        kwarn!("devmgr: spawn of driver {} failed: {}", driver_id, e);
                        driver.set_state(DriverState::NotLoaded);
                        Err(OsError::DeviceFault)
                    }
                }
            }
            DriverState::Loading => {
                state
                    .drivers
                    .get_mut(&driver_id)
                    .expect("driver vanished")
                    .push_pending(device);
                state
                    .devices
                    .get_mut(&device)
                    .expect("device vanished")
                    .set_driver(driver_id);
                Ok(())
            }
            DriverState::Available => {
                let handle = state.drivers[&driver_id]
                    .handle()
                    .expect("available driver always has a handle");
                let dev = state.devices[&device].clone();
                drop(state);
                channel.notify(handle, &dev)?;
                let mut state = self.state.lock();
                state
                    .devices
                    .get_mut(&device)
                    .expect("device vanished")
                    .set_driver(driver_id);
                Ok(())
            }
        }
    }

    /// Marks a driver available (§4.6 `driver_loaded`) and re-dispatches
    /// every device queued for it while it was loading.
    pub fn driver_loaded(
        &self,
        driver: DriverId,
        driver_handle: HandleId,
        channel: &dyn DriverChannel,
    ) -> OsResult<()> {
        let pending = {
            let mut state = self.state.lock();
            let record = state.drivers.get_mut(&driver).ok_or(OsError::NotFound)?;
            record.set_handle(driver_handle);
            record.set_state(DriverState::Available);
            record.take_pending()
        };

        for device_id in pending {
            let dev = {
                let state = self.state.lock();
                state.devices.get(&device_id).cloned()
            };
            let Some(dev) = dev else { continue };
            if let Err(e) = channel.notify(driver_handle, &dev) {
                kwarn!(
                    "devmgr: dispatch of pending device {} to driver {} failed: {}",
                    device_id,
                    driver,
                    e
                );
            }
        }
        Ok(())
    }

    /// Looks up a device record by id (§4.6: "Device lookups for an
    /// unknown id return *not-found*").
    pub fn device(&self, id: DeviceId) -> OsResult<Device> {
        self.state
            .lock()
            .devices
            .get(&id)
            .cloned()
            .ok_or(OsError::NotFound)
    }

    /// Performs an `ioctl` against a device (§4.6: "I/O-ctl to a
    /// non-bus device returns *invalid*").
    pub fn ioctl(
        &self,
        device: DeviceId,
        target: IoctlTarget,
        bus: &dyn BusIoctl,
    ) -> OsResult<()> {
        let dev = self.device(device)?;
        let IoctlTarget::Bus = target;
        if dev.kind() != DeviceKind::Bus {
            return Err(OsError::InvalidParams);
        }
        bus.ioctl(dev.id())
    }

    /// Returns every device id currently registered, for diagnostics and
    /// tests.
    #[must_use]
    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.state.lock().devices.keys().copied().collect()
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Performs the bus-specific side of an [`IoctlTarget::Bus`] request.
pub trait BusIoctl {
    /// Executes the bus ioctl for `device`.
    fn ioctl(&self, device: DeviceId) -> OsResult<()>;
}

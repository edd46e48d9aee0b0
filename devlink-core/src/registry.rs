//! Fixed-capacity device registry.
//!
//! The registry is a dense array with a hard capacity: predictable memory
//! on constrained targets. Devices are added at setup time and never
//! removed; a slot is permanent once assigned. Lookups are linear scans,
//! which is fine at tens of entries touched only on message receipt.

use crate::device::Device;
use crate::error::CoreError;
use crate::{MAX_DEVICES, MAX_DEVICE_ID};

pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: Vec::with_capacity(MAX_DEVICES),
        }
    }

    /// Adds a device, assigning the next sequential id when the device
    /// carries none. Fails once the capacity is reached or when the id is
    /// already taken.
    pub fn add(&mut self, mut device: Device) -> Result<u8, CoreError> {
        if self.devices.len() >= MAX_DEVICES {
            return Err(CoreError::RegistryFull {
                capacity: MAX_DEVICES,
            });
        }
        if device.id() == 0 {
            device.set_id(self.next_free_id());
        } else if self.get(device.id()).is_some() {
            return Err(CoreError::DuplicateId { id: device.id() });
        }
        let id = device.id();
        tracing::debug!(id, name = device.name(), "device registered");
        self.devices.push(device);
        Ok(id)
    }

    fn next_free_id(&self) -> u8 {
        let mut id = self.devices.len() as u8 + 1;
        while self.get(id).is_some() {
            id += 1;
        }
        id
    }

    pub fn get(&self, id: u8) -> Option<&Device> {
        self.devices.iter().find(|d| d.id() == id)
    }

    pub fn get_mut(&mut self, id: u8) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.id() == id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name() == name)
    }

    pub fn get_at(&self, index: usize) -> Option<&Device> {
        self.devices.get(index)
    }

    pub fn get_at_mut(&mut self, index: usize) -> Option<&mut Device> {
        self.devices.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.devices.iter_mut()
    }

    /// The current id list, in slot order. This is what gets persisted.
    pub fn ids(&self) -> Vec<u8> {
        self.devices.iter().map(|d| d.id()).collect()
    }

    /// Reassigns ids positionally: slot *i* gets `ids[i]`.
    ///
    /// The whole batch is validated first; on any failure the registry is
    /// left unchanged.
    pub fn sync_ids(&mut self, ids: &[u8]) -> Result<(), CoreError> {
        if ids.len() != self.devices.len() {
            return Err(CoreError::CountMismatch {
                expected: self.devices.len(),
                actual: ids.len(),
            });
        }
        if let Some(&id) = ids.iter().find(|&&id| id == 0 || id > MAX_DEVICE_ID) {
            return Err(CoreError::IdOutOfRange {
                id,
                max: MAX_DEVICE_ID,
            });
        }
        for (device, &id) in self.devices.iter_mut().zip(ids) {
            device.set_id(id);
        }
        tracing::debug!(count = ids.len(), "device ids resynced");
        Ok(())
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Compute device enumeration and selection.
//!
//! "Distribution" in voxelfit means partitioning chunks across locally
//! available accelerators within one process. Device handles are resolved
//! once at configuration time and never reassigned mid-run; an out-of-range
//! index is a configuration error caught before any work is dispatched.

use vx_core::error::{Error, Result};

/// The kind of compute device backing a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// Host CPU thread pool.
    Cpu,
}

/// One compute device available to the processing strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Position in the enumerated device list.
    pub index: usize,
    /// Human-readable device name.
    pub name: String,
    /// Device kind.
    pub device_type: DeviceType,
    /// Worker threads this device can sustain.
    pub threads: usize,
}

/// Enumerate the devices available to this process.
pub fn enumerate_devices() -> Vec<DeviceInfo> {
    let threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    vec![DeviceInfo {
        index: 0,
        name: format!("cpu ({threads} thread(s))"),
        device_type: DeviceType::Cpu,
        threads,
    }]
}

/// Resolve a device selection against an enumerated list.
///
/// `None` selects every available device. Each index is validated; the
/// first out-of-range index aborts with [`Error::InvalidDeviceIndex`].
pub fn resolve_devices(
    selection: Option<&[usize]>,
    available: &[DeviceInfo],
) -> Result<Vec<DeviceInfo>> {
    match selection {
        None => Ok(available.to_vec()),
        Some(indices) => {
            let mut devices = Vec::with_capacity(indices.len());
            for &index in indices {
                let device = available.get(index).ok_or(Error::InvalidDeviceIndex {
                    index,
                    available: available.len(),
                })?;
                devices.push(device.clone());
            }
            Ok(devices)
        }
    }
}

//! Device collaborator traits
//!
//! Boundary of the hardware driver: enumeration, connection management, and
//! the per-frame contact callback. Implemented by real and mock drivers alike.

use std::sync::Arc;

use crate::{Contact, ContractError, DeviceId};

/// One driver callback invocation, borrowed from the driver's buffers.
#[derive(Debug, Clone, Copy)]
pub struct ContactReport<'a> {
    /// Device that produced the frame
    pub device: &'a DeviceId,

    /// Contacts of this sampling instant (`contacts.len()` is the contact count)
    pub contacts: &'a [Contact],

    /// Driver timestamp (seconds)
    pub timestamp: f64,

    /// Driver frame index
    pub frame_index: u64,
}

/// Contact callback type
///
/// Invoked on the driver's own thread, once per sampling instant.
pub type ContactCallback = Arc<dyn Fn(ContactReport<'_>) + Send + Sync>;

/// Device enumeration collaborator
pub trait DeviceEnumerator: Send + Sync {
    /// Currently available devices, in stable enumeration order
    fn list_devices(&self) -> Vec<DeviceId>;
}

/// Device management collaborator
///
/// Implementations may invoke the registered callback synchronously from
/// inside `start`/`stop`, so callers must not hold locks the callback needs.
///
/// # Example
///
/// ```ignore
/// manager.register_callback(&device, Some(callback))?;
/// manager.start(&device)?;
/// // ... frames arrive on the driver thread ...
/// manager.register_callback(&device, None)?;
/// manager.stop(&device)?;
/// manager.release(&device)?;
/// ```
pub trait DeviceManager: Send + Sync {
    /// Register (`Some`) or clear (`None`) the contact callback of a device
    fn register_callback(
        &self,
        device: &DeviceId,
        callback: Option<ContactCallback>,
    ) -> Result<(), ContractError>;

    /// Start sampling
    fn start(&self, device: &DeviceId) -> Result<(), ContractError>;

    /// Stop sampling; no callback runs after this returns
    fn stop(&self, device: &DeviceId) -> Result<(), ContractError>;

    /// Release the connection handle
    fn release(&self, device: &DeviceId) -> Result<(), ContractError>;
}

/// A driver that both enumerates and manages devices
pub trait DeviceDriver: DeviceEnumerator + DeviceManager {}

impl<T: DeviceEnumerator + DeviceManager> DeviceDriver for T {}

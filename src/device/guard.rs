//! Scoped connection ownership.

use std::ops::{Deref, DerefMut};

use tracing::debug;

use super::Device;
use crate::error::VdlError;

/// Keeps a device connected for a scope.
///
/// [`DeviceGuard::connect`] connects the device if needed and, when it was the
/// one that connected it, disconnects it again on drop. A device that was
/// already connected is left alone.
///
/// ```rust
/// use vdl::{BinaryCodec, Device, DeviceGuard, GenericDevice, MockTransport};
///
/// # tokio_test::block_on(async {
/// let mut device = GenericDevice::new(MockTransport::new(), Box::new(BinaryCodec::new()));
/// {
///     let guard = DeviceGuard::connect(&mut device).await;
///     assert!(guard.is_connected());
/// }
/// assert!(!device.is_connected());
/// # });
/// ```
pub struct DeviceGuard<'a, D: Device> {
    device: &'a mut D,
    owns_connection: bool,
    connect_error: Option<VdlError>,
}

impl<'a, D: Device> DeviceGuard<'a, D> {
    /// Connect `device` unless it already is.
    ///
    /// A failed connect does not fail construction; check
    /// [`connect_error`](Self::connect_error).
    pub async fn connect(device: &'a mut D) -> Self {
        let mut guard = Self::attach(device);
        if !guard.device.is_connected() {
            match guard.device.connect().await {
                Ok(()) => guard.owns_connection = true,
                Err(e) => {
                    debug!("Guard connect failed: {}", e);
                    guard.connect_error = Some(e);
                }
            }
        }
        guard
    }

    /// Wrap `device` without connecting it.
    pub fn attach(device: &'a mut D) -> Self {
        Self {
            device,
            owns_connection: false,
            connect_error: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.device.is_connected()
    }

    pub fn has_error(&self) -> bool {
        self.connect_error.is_some()
    }

    pub fn connect_error(&self) -> Option<&VdlError> {
        self.connect_error.as_ref()
    }

    /// True when drop will disconnect the device.
    pub fn owns_connection(&self) -> bool {
        self.owns_connection
    }

    /// Leave the device connected when the guard drops.
    pub fn release(&mut self) {
        self.owns_connection = false;
    }
}

impl<D: Device> Deref for DeviceGuard<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.device
    }
}

impl<D: Device> DerefMut for DeviceGuard<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.device
    }
}

impl<D: Device> Drop for DeviceGuard<'_, D> {
    fn drop(&mut self) {
        if self.owns_connection && self.device.is_connected() {
            self.device.disconnect();
        }
    }
}

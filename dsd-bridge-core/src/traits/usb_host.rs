use crate::models::device::UsbDeviceInfo;
use crate::models::error::BridgeError;

/// An open USB device connection owned by the acquisition state machine.
pub trait UsbConnection: Send {
    /// Raw file descriptor the decoder engine drives the device through.
    fn file_descriptor(&self) -> i32;

    /// Release the connection. Called at most once.
    fn close(&mut self);
}

/// Platform USB host service.
///
/// Implemented per platform (e.g. a JNI wrapper over the Android USB manager).
/// Permission prompts are asynchronous: `request_permission` only issues the
/// prompt, and the platform later reports the user's choice through
/// [`crate::session::usb_acquisition::UsbAcquisition::on_permission_result`].
pub trait UsbHost: Send + Sync {
    /// All currently attached devices. Does not require permission.
    fn attached_devices(&self) -> Vec<UsbDeviceInfo>;

    fn has_permission(&self, path: &str) -> bool;

    /// Show the platform permission prompt for the device at `path`.
    fn request_permission(&self, path: &str) -> Result<(), BridgeError>;

    /// Open the device. `None` when the platform refuses.
    fn open_device(&self, path: &str) -> Option<Box<dyn UsbConnection>>;

    /// Look up one attached device by path.
    fn find_device(&self, path: &str) -> Option<UsbDeviceInfo> {
        self.attached_devices().into_iter().find(|d| d.path == path)
    }
}

//! USB device acquisition: enumerate, request permission, open, hand off.
//!
//! Permission prompts resolve asynchronously. At most one request is
//! outstanding; opening another device before the first resolves cancels the
//! first caller's completion with [`BridgeError::PermissionSuperseded`].

use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::device::{DeviceDescriptor, UsbDeviceId, UsbHandle, RTL_SDR_DEVICES};
use crate::models::error::BridgeError;
use crate::models::state::UsbAcquisitionState;
use crate::session::pending::{Completion, PendingSlot};
use crate::traits::usb_host::{UsbConnection, UsbHost};

/// Attached devices on `allow_list`, with their current permission flag.
pub fn scan_devices(host: &dyn UsbHost, allow_list: &[UsbDeviceId]) -> Vec<DeviceDescriptor> {
    host.attached_devices()
        .iter()
        .filter(|info| allow_list.contains(&info.id))
        .map(|info| DeviceDescriptor::from_info(info, host.has_permission(&info.path)))
        .collect()
}

/// Result of [`UsbAcquisition::open`].
pub enum OpenRequest {
    /// Permission was already held; the device is open.
    Ready(UsbHandle),
    /// A permission prompt is showing. Resolves with the handle, or with
    /// [`BridgeError::PermissionDenied`] / [`BridgeError::OpenFailed`].
    Pending(Completion<UsbHandle>),
}

struct Acquired {
    connection: Box<dyn UsbConnection>,
    handle: UsbHandle,
}

struct Inner {
    state: UsbAcquisitionState,
    acquired: Option<Acquired>,
}

/// Acquisition state machine for one family of USB front ends.
pub struct UsbAcquisition {
    host: Arc<dyn UsbHost>,
    allow_list: &'static [UsbDeviceId],
    inner: Mutex<Inner>,
    pending: PendingSlot<UsbHandle>,
}

impl UsbAcquisition {
    pub fn new(host: Arc<dyn UsbHost>, allow_list: &'static [UsbDeviceId]) -> Self {
        Self {
            host,
            allow_list,
            inner: Mutex::new(Inner {
                state: UsbAcquisitionState::Idle,
                acquired: None,
            }),
            pending: PendingSlot::new(),
        }
    }

    /// Acquisition for RTL-SDR dongles.
    pub fn rtl_sdr(host: Arc<dyn UsbHost>) -> Self {
        Self::new(host, RTL_SDR_DEVICES)
    }

    pub fn state(&self) -> UsbAcquisitionState {
        self.inner.lock().state
    }

    pub fn current_handle(&self) -> Option<UsbHandle> {
        self.inner.lock().acquired.as_ref().map(|a| a.handle.clone())
    }

    pub fn has_pending_request(&self) -> bool {
        self.pending.is_pending()
    }

    /// Scan attached devices. Does not need permission.
    pub fn list_devices(&self) -> Vec<DeviceDescriptor> {
        {
            let mut inner = self.inner.lock();
            if matches!(
                inner.state,
                UsbAcquisitionState::Idle | UsbAcquisitionState::Closed
            ) {
                inner.state = UsbAcquisitionState::Enumerating;
            }
        }

        let devices = scan_devices(self.host.as_ref(), self.allow_list);
        log::debug!("USB scan found {} supported device(s)", devices.len());
        devices
    }

    /// Open the device at `path`, looking it up among attached devices.
    pub fn open_path(&self, path: &str) -> Result<OpenRequest, BridgeError> {
        let info = self
            .host
            .find_device(path)
            .ok_or_else(|| BridgeError::DeviceNotFound(path.to_string()))?;
        let descriptor = DeviceDescriptor::from_info(&info, self.host.has_permission(path));
        self.open(&descriptor)
    }

    /// Open `descriptor`, prompting for permission if it is not yet held.
    pub fn open(&self, descriptor: &DeviceDescriptor) -> Result<OpenRequest, BridgeError> {
        let path = descriptor.path.as_str();

        if !descriptor.matches(self.allow_list) {
            return Err(BridgeError::DeviceNotApplicable(path.to_string()));
        }

        // The descriptor may be stale.
        let attached = self
            .host
            .find_device(path)
            .ok_or_else(|| BridgeError::DeviceNotFound(path.to_string()))?;
        if attached.id != descriptor.device_id() {
            return Err(BridgeError::DeviceNotApplicable(path.to_string()));
        }

        if descriptor.has_permission || self.host.has_permission(path) {
            return self.open_now(path).map(OpenRequest::Ready);
        }

        // Armed under the state lock so an early answer cannot be overwritten.
        let completion = {
            let mut inner = self.inner.lock();
            inner.state = UsbAcquisitionState::PermissionRequested;
            self.pending.arm(path)
        };
        log::info!("Requesting USB permission for {}", path);

        if let Err(e) = self.host.request_permission(path) {
            log::error!("USB permission request for {} failed: {}", path, e);
            if let Some(resolver) = self.pending.take_for(path) {
                resolver.resolve(Err(e.clone()));
            }
            self.settle_state();
            return Err(e);
        }

        Ok(OpenRequest::Pending(completion))
    }

    /// Platform callback: the user answered the permission prompt for `path`.
    ///
    /// Returns whether a pending request was resolved. Answers for a device
    /// other than the pending one, or repeated answers, are ignored.
    pub fn on_permission_result(&self, path: &str, granted: bool) -> bool {
        let Some(resolver) = self.pending.take_for(path) else {
            log::debug!("Ignoring USB permission result for {} (not pending)", path);
            return false;
        };

        if granted {
            log::info!("USB permission granted for {}", path);
            resolver.resolve(self.open_now(path));
        } else {
            log::warn!("USB permission denied for {}", path);
            self.settle_state();
            resolver.resolve(Err(BridgeError::PermissionDenied));
        }
        true
    }

    /// Resolve the pending request for `path` with `error` without opening
    /// anything. The current handle, if any, stays open.
    pub fn fail_pending(&self, path: &str, error: BridgeError) -> bool {
        let Some(resolver) = self.pending.take_for(path) else {
            return false;
        };
        log::warn!("Failing USB open for {}: {}", path, error);
        self.settle_state();
        resolver.resolve(Err(error));
        true
    }

    /// Release the open handle. No-op when nothing is open.
    pub fn close(&self) {
        let acquired = {
            let mut inner = self.inner.lock();
            let acquired = inner.acquired.take();
            if acquired.is_some() {
                inner.state = UsbAcquisitionState::Closed;
            }
            acquired
        };

        if let Some(mut acquired) = acquired {
            acquired.connection.close();
            log::info!("Closed USB device {}", acquired.handle.device_path);
        }
    }

    /// Cancel any pending prompt and close the open handle.
    pub fn reset(&self) {
        if self.pending.resolve(Err(BridgeError::InvalidState(
            "USB acquisition reset".into(),
        ))) {
            log::info!("Cancelled pending USB permission request");
        }
        self.close();
        self.inner.lock().state = UsbAcquisitionState::Idle;
    }

    /// Leave a prompt state: back to `Opened` if a handle is still held.
    fn settle_state(&self) {
        let mut inner = self.inner.lock();
        inner.state = if inner.acquired.is_some() {
            UsbAcquisitionState::Opened
        } else {
            UsbAcquisitionState::Enumerating
        };
    }

    fn open_now(&self, path: &str) -> Result<UsbHandle, BridgeError> {
        self.close();

        let connection = match self.host.open_device(path) {
            Some(c) => c,
            None => {
                self.inner.lock().state = UsbAcquisitionState::Enumerating;
                return Err(BridgeError::OpenFailed(path.to_string()));
            }
        };

        let handle = UsbHandle {
            fd: connection.file_descriptor(),
            device_path: path.to_string(),
        };
        log::info!("Opened USB device {} (fd={})", path, handle.fd);

        let mut inner = self.inner.lock();
        inner.acquired = Some(Acquired {
            connection,
            handle: handle.clone(),
        });
        inner.state = UsbAcquisitionState::Opened;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::device::HACKRF_DEVICES;
    use crate::test_support::FakeUsbHost;

    const DONGLE: &str = "/dev/bus/usb/001/004";

    fn host_with_dongle(granted: bool) -> Arc<FakeUsbHost> {
        let host = FakeUsbHost::new();
        host.attach(0x0bda, 0x2838, DONGLE, granted);
        host
    }

    #[test]
    fn list_filters_by_allow_list() {
        let host = host_with_dongle(false);
        host.attach(0x046d, 0xc52b, "/dev/bus/usb/001/005", true);
        host.attach(0x1d50, 0x6089, "/dev/bus/usb/001/006", false);

        let acq = UsbAcquisition::rtl_sdr(host.clone());
        let devices = acq.list_devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].path, DONGLE);
        assert!(!devices[0].has_permission);
        assert_eq!(acq.state(), UsbAcquisitionState::Enumerating);

        let hackrfs = scan_devices(host.as_ref(), HACKRF_DEVICES);
        assert_eq!(hackrfs.len(), 1);
    }

    #[test]
    fn granted_device_opens_without_prompt() {
        let host = host_with_dongle(true);
        let acq = UsbAcquisition::rtl_sdr(host.clone());
        let descriptor = acq.list_devices().remove(0);

        let OpenRequest::Ready(handle) = acq.open(&descriptor).unwrap() else {
            panic!("expected immediate open");
        };
        assert!(handle.fd >= 0);
        assert_eq!(handle.device_path, DONGLE);
        assert_eq!(host.permission_requests(), 0);
        assert!(acq.state().is_opened());
    }

    #[test]
    fn permission_grant_resolves_pending_open() {
        let host = host_with_dongle(false);
        let acq = UsbAcquisition::rtl_sdr(host.clone());
        let descriptor = acq.list_devices().remove(0);

        let OpenRequest::Pending(done) = acq.open(&descriptor).unwrap() else {
            panic!("expected permission prompt");
        };
        assert_eq!(host.permission_requests(), 1);
        assert_eq!(acq.state(), UsbAcquisitionState::PermissionRequested);
        assert!(done.try_take().is_none());

        host.grant(DONGLE);
        assert!(acq.on_permission_result(DONGLE, true));
        let handle = done.wait().unwrap();
        assert_eq!(handle.device_path, DONGLE);

        // Resolution is idempotent.
        assert!(!acq.on_permission_result(DONGLE, true));
    }

    #[test]
    fn permission_denied() {
        let host = host_with_dongle(false);
        let acq = UsbAcquisition::rtl_sdr(host);
        let OpenRequest::Pending(done) = acq.open_path(DONGLE).unwrap() else {
            panic!("expected permission prompt");
        };

        assert!(acq.on_permission_result(DONGLE, false));
        assert_eq!(done.wait(), Err(BridgeError::PermissionDenied));
        assert!(acq.current_handle().is_none());
    }

    #[test]
    fn result_for_other_device_is_ignored() {
        let host = host_with_dongle(false);
        let acq = UsbAcquisition::rtl_sdr(host);
        let OpenRequest::Pending(done) = acq.open_path(DONGLE).unwrap() else {
            panic!("expected permission prompt");
        };

        assert!(!acq.on_permission_result("/dev/bus/usb/002/001", true));
        assert!(acq.has_pending_request());
        assert!(done.try_take().is_none());
    }

    #[test]
    fn second_open_supersedes_first() {
        let host = host_with_dongle(false);
        host.attach(0x0bda, 0x2832, "/dev/bus/usb/001/007", false);
        let acq = UsbAcquisition::rtl_sdr(host);

        let OpenRequest::Pending(first) = acq.open_path(DONGLE).unwrap() else {
            panic!("expected permission prompt");
        };
        let OpenRequest::Pending(_second) = acq.open_path("/dev/bus/usb/001/007").unwrap() else {
            panic!("expected permission prompt");
        };
        assert_eq!(first.try_take(), Some(Err(BridgeError::PermissionSuperseded)));
    }

    #[test]
    fn open_failures() {
        let host = host_with_dongle(true);
        host.attach(0x046d, 0xc52b, "/dev/bus/usb/001/005", true);
        let acq = UsbAcquisition::rtl_sdr(host.clone());

        assert!(matches!(
            acq.open_path("/dev/bus/usb/009/009"),
            Err(BridgeError::DeviceNotFound(_))
        ));
        assert!(matches!(
            acq.open_path("/dev/bus/usb/001/005"),
            Err(BridgeError::DeviceNotApplicable(_))
        ));

        host.refuse_open(true);
        assert!(matches!(
            acq.open_path(DONGLE),
            Err(BridgeError::OpenFailed(_))
        ));
    }

    #[test]
    fn unplugged_descriptor_is_not_found() {
        let host = host_with_dongle(true);
        let acq = UsbAcquisition::rtl_sdr(host.clone());
        let descriptor = acq.list_devices().remove(0);
        host.detach(DONGLE);

        assert!(matches!(
            acq.open(&descriptor),
            Err(BridgeError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn close_is_idempotent() {
        let host = host_with_dongle(true);
        let acq = UsbAcquisition::rtl_sdr(host.clone());
        acq.close();
        assert_eq!(acq.state(), UsbAcquisitionState::Idle);

        acq.open_path(DONGLE).unwrap();
        acq.close();
        acq.close();
        assert_eq!(acq.state(), UsbAcquisitionState::Closed);
        assert_eq!(host.closed_connections(), 1);
    }

    #[test]
    fn immediate_grant_from_another_thread_leaves_device_opened() {
        for _ in 0..50 {
            let host = host_with_dongle(false);
            let acq = Arc::new(UsbAcquisition::rtl_sdr(host.clone()));

            let answering = Arc::clone(&acq);
            let answer_host = Arc::clone(&host);
            let answer = std::thread::spawn(move || {
                while !answering.has_pending_request() {
                    std::thread::yield_now();
                }
                answer_host.grant(DONGLE);
                assert!(answering.on_permission_result(DONGLE, true));
            });

            let OpenRequest::Pending(done) = acq.open_path(DONGLE).unwrap() else {
                panic!("expected permission prompt");
            };
            answer.join().unwrap();

            assert_eq!(done.wait().unwrap().device_path, DONGLE);
            assert_eq!(acq.state(), UsbAcquisitionState::Opened);
        }
    }

    #[test]
    fn failed_pending_keeps_current_handle() {
        let host = host_with_dongle(true);
        host.attach(0x0bda, 0x2832, "/dev/bus/usb/001/007", false);
        let acq = UsbAcquisition::rtl_sdr(host.clone());
        let held = match acq.open_path(DONGLE).unwrap() {
            OpenRequest::Ready(handle) => handle,
            OpenRequest::Pending(_) => panic!("expected immediate open"),
        };

        let OpenRequest::Pending(done) = acq.open_path("/dev/bus/usb/001/007").unwrap() else {
            panic!("expected permission prompt");
        };
        let err = BridgeError::InvalidState("busy".into());
        assert!(!acq.fail_pending(DONGLE, err.clone()));
        assert!(acq.fail_pending("/dev/bus/usb/001/007", err.clone()));

        assert_eq!(done.wait(), Err(err));
        assert_eq!(acq.current_handle(), Some(held));
        assert_eq!(acq.state(), UsbAcquisitionState::Opened);
        assert_eq!(host.closed_connections(), 0);
    }

    #[test]
    fn reopening_closes_previous_handle() {
        let host = host_with_dongle(true);
        let acq = UsbAcquisition::rtl_sdr(host.clone());
        acq.open_path(DONGLE).unwrap();
        acq.open_path(DONGLE).unwrap();
        assert_eq!(host.closed_connections(), 1);
        assert!(acq.current_handle().is_some());
    }
}

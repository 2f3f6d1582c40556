use serde::Serialize;

/// USB vendor/product id pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsbDeviceId {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl UsbDeviceId {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

/// Known RTL2832U-based dongles.
pub const RTL_SDR_DEVICES: &[UsbDeviceId] = &[
    UsbDeviceId::new(0x0bda, 0x2832), // generic RTL2832U
    UsbDeviceId::new(0x0bda, 0x2838), // RTL-SDR Blog V3/V4
    UsbDeviceId::new(0x1f4d, 0xb803), // Afatech
    UsbDeviceId::new(0x1f4d, 0xc803), // Afatech
    UsbDeviceId::new(0x1b80, 0xd3a4),
    UsbDeviceId::new(0x1d19, 0x1101), // Dexatek
    UsbDeviceId::new(0x1d19, 0x1102), // Dexatek
    UsbDeviceId::new(0x1d19, 0x1103), // Dexatek
];

pub const HACKRF_DEVICES: &[UsbDeviceId] = &[UsbDeviceId::new(0x1d50, 0x6089)];

/// A device as reported by the platform USB host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    pub id: UsbDeviceId,
    /// Platform device path, e.g. `/dev/bus/usb/001/004`.
    pub path: String,
    pub product_name: Option<String>,
    pub manufacturer_name: Option<String>,
}

/// A candidate SDR that passed the allow-list filter.
///
/// Identity is `(vendor_id, product_id, path)`; the permission flag is a
/// snapshot taken at enumeration time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub path: String,
    pub product_name: String,
    pub manufacturer_name: String,
    pub has_permission: bool,
}

impl DeviceDescriptor {
    pub fn from_info(info: &UsbDeviceInfo, has_permission: bool) -> Self {
        Self {
            vendor_id: info.id.vendor_id,
            product_id: info.id.product_id,
            path: info.path.clone(),
            product_name: info.product_name.clone().unwrap_or_else(|| "RTL-SDR".into()),
            manufacturer_name: info
                .manufacturer_name
                .clone()
                .unwrap_or_else(|| "Unknown".into()),
            has_permission,
        }
    }

    pub fn device_id(&self) -> UsbDeviceId {
        UsbDeviceId::new(self.vendor_id, self.product_id)
    }

    pub fn matches(&self, allow_list: &[UsbDeviceId]) -> bool {
        allow_list.contains(&self.device_id())
    }
}

impl PartialEq for DeviceDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.vendor_id == other.vendor_id
            && self.product_id == other.product_id
            && self.path == other.path
    }
}

impl Eq for DeviceDescriptor {}

/// HackRF listing entry. Identity strings need permission to read, so the
/// fixed product strings are reported instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HackRfDeviceInfo {
    pub index: usize,
    pub name: String,
    pub manufacturer: String,
    pub serial: String,
    pub device_name: String,
    pub has_permission: bool,
}

impl HackRfDeviceInfo {
    pub fn from_descriptor(index: usize, descriptor: &DeviceDescriptor) -> Self {
        Self {
            index,
            name: "HackRF One".into(),
            manufacturer: "Great Scott Gadgets".into(),
            serial: String::new(),
            device_name: descriptor.path.clone(),
            has_permission: descriptor.has_permission,
        }
    }
}

/// An opened USB connection handed to the decoder engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsbHandle {
    pub fd: i32,
    pub device_path: String,
}

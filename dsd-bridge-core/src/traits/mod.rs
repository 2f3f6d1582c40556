pub mod event_subscriber;
pub mod hackrf_driver;
pub mod native_bridge;
pub mod usb_host;

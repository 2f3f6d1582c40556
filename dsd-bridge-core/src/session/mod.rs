pub mod bridge;
pub mod controller;
pub mod dispatcher;
pub mod pending;
pub mod usb_acquisition;

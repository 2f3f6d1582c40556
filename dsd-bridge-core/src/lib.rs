//! # dsd-bridge-core
//!
//! Control core between SDR front ends and an opaque native P25/DMR decoder
//! engine.
//!
//! Acquires a front end (rtl_tcp over the network, an RTL-SDR dongle or a
//! HackRF over USB), forwards raw sample buffers into the engine, and fans the
//! engine's structured events out to one subscriber per event kind. Platform
//! pieces (USB host, HackRF driver, the engine binding itself) plug in through
//! the traits in [`traits`].
//!
//! ## Architecture
//!
//! ```text
//! dsd-bridge-core (this crate)
//! ├── traits/       ← NativeCommandSink, NativeEventSource, UsbHost, HackRfDriver, Subscriber
//! ├── models/       ← BridgeError, SessionState, tuning configs, device descriptors, event records
//! ├── processing/   ← BufferPool, SampleForwardingPipeline, native event decoding
//! └── session/      ← SessionController, UsbAcquisition, EventDispatcher, SdrBridge
//! ```
//!
//! Data flow:
//!
//! ```text
//! [HackRfDriver] → SampleProducer → [bounded queue] → forwarding worker → NativeCommandSink
//! [engine threads] → NativeEventHandler → [inbox] → pump() → decode → subscriber
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export key types at crate root for convenience.
pub use models::config::{
    BackendConfig, BridgeConfig, HackRfTuning, NetworkTuning, PipelineConfig, RtlUsbTuning,
};
pub use models::device::{DeviceDescriptor, HackRfDeviceInfo, UsbDeviceId, UsbDeviceInfo, UsbHandle};
pub use models::error::BridgeError;
pub use models::events::{
    Affiliation, AffiliationEvent, CallEvent, CallEventType, EventKind, GroupAttachment,
    GroupAttachmentEvent, NetworkEvent, PatchEntry, PatchEvent, SignalEvent, SiteEvent,
};
pub use models::filter::FilterMode;
pub use models::state::{BackendKind, SessionState, UsbAcquisitionState};
pub use processing::buffer_pool::{BufferPool, PoolStats, SampleBuffer};
pub use processing::sample_pipeline::{PipelineStats, SampleForwardingPipeline, SampleProducer};
pub use session::bridge::SdrBridge;
pub use session::controller::SessionController;
pub use session::dispatcher::{BridgeEvent, EventDispatcher};
pub use session::pending::Completion;
pub use session::usb_acquisition::{OpenRequest, UsbAcquisition};
pub use traits::event_subscriber::Subscriber;
pub use traits::hackrf_driver::{HackRfDriver, HackRfInitCallback};
pub use traits::native_bridge::{NativeCommandSink, NativeEvent, NativeEventHandler, NativeEventSource};
pub use traits::usb_host::{UsbConnection, UsbHost};

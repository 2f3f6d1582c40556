use crate::models::error::BridgeError;
use crate::processing::sample_pipeline::SampleProducer;

/// Invoked once when asynchronous driver initialisation finishes.
/// `Err` carries the driver's message.
pub type HackRfInitCallback = Box<dyn FnOnce(Result<(), String>) + Send + 'static>;

/// Interface for a userspace HackRF driver.
///
/// The driver owns the USB transfer thread. Once RX is started it fills
/// buffers borrowed from the [`SampleProducer`] and submits them; it must
/// never block on a full queue.
pub trait HackRfDriver: Send + Sync {
    /// Begin initialisation (permission prompt, firmware handshake).
    ///
    /// Returns `Err` only when the request could not be issued at all;
    /// otherwise the outcome arrives through `on_done`.
    fn init(&self, on_done: HackRfInitCallback) -> Result<(), BridgeError>;

    fn set_frequency(&self, freq_hz: u64) -> Result<(), BridgeError>;

    fn set_sample_rate(&self, sample_rate: u32) -> Result<(), BridgeError>;

    fn set_lna_gain(&self, gain: u32) -> Result<(), BridgeError>;

    fn set_vga_gain(&self, gain: u32) -> Result<(), BridgeError>;

    /// Start receiving into buffers obtained from `producer`.
    fn start_rx(&self, producer: SampleProducer) -> Result<(), BridgeError>;

    /// Stop receiving. Safe to call when not receiving.
    fn stop(&self) -> Result<(), BridgeError>;
}

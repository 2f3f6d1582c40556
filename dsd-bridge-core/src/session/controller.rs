use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::models::config::{
    validate_lna_gain, validate_vga_gain, BackendConfig, HackRfTuning, PipelineConfig,
};
use crate::models::error::BridgeError;
use crate::models::state::{BackendKind, SessionState};
use crate::processing::sample_pipeline::{PipelineStats, SampleForwardingPipeline};
use crate::session::pending::{Completion, PendingSlot};
use crate::session::usb_acquisition::UsbAcquisition;
use crate::traits::hackrf_driver::{HackRfDriver, HackRfInitCallback};
use crate::traits::native_bridge::NativeCommandSink;

struct Session {
    state: SessionState,
    backend: Option<BackendKind>,
    id: Option<Uuid>,
}

impl Session {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            backend: None,
            id: None,
        }
    }

    fn label(&self) -> String {
        self.id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".into())
    }
}

/// Owns the single hardware session and sequences it against the engine.
///
/// ```text
/// connect ──→ [Connecting] ──native accepts──→ [Active] ──stop──→ [Stopping] ──→ [Idle]
///                  └──────native rejects──────→ [Idle]
/// cleanup: any state → [Idle]
/// ```
///
/// Every transition maps to exactly one native command. A failed precondition
/// returns an error and sends nothing.
pub struct SessionController {
    native: Arc<dyn NativeCommandSink>,
    rtl_usb: Arc<UsbAcquisition>,
    hackrf: Option<Arc<dyn HackRfDriver>>,
    pipeline: SampleForwardingPipeline,
    session: Session,

    // Shared with the driver's init callback, which may run on any thread.
    hackrf_init: Arc<PendingSlot<()>>,
    hackrf_ready: Arc<AtomicBool>,
}

impl SessionController {
    pub fn new(
        native: Arc<dyn NativeCommandSink>,
        rtl_usb: Arc<UsbAcquisition>,
        hackrf: Option<Arc<dyn HackRfDriver>>,
        pipeline_config: PipelineConfig,
    ) -> Self {
        let pipeline = SampleForwardingPipeline::new(pipeline_config, Arc::clone(&native));
        Self {
            native,
            rtl_usb,
            hackrf,
            pipeline,
            session: Session::new(),
            hackrf_init: Arc::new(PendingSlot::new()),
            hackrf_ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn backend(&self) -> Option<BackendKind> {
        self.session.backend
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.id
    }

    pub fn pipeline_stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    pub fn hackrf_initialized(&self) -> bool {
        self.hackrf_ready.load(Ordering::SeqCst)
    }

    pub fn hackrf_rx_running(&self) -> bool {
        self.pipeline.is_running()
    }

    /// Open a backend session. Fails unless the session is idle.
    pub fn connect(&mut self, config: &BackendConfig) -> Result<(), BridgeError> {
        let kind = config.kind();
        if !self.session.state.is_idle() {
            log::warn!(
                "Rejecting {:?} connect: session {} is {:?} on {:?}",
                kind,
                self.session.label(),
                self.session.state,
                self.session.backend
            );
            return Err(BridgeError::InvalidState(format!(
                "can only connect from idle state (currently {:?})",
                self.session.state
            )));
        }

        config.validate().map_err(BridgeError::InvalidArgument)?;

        self.session.id = Some(Uuid::new_v4());
        self.set_state(SessionState::Connecting);

        let result = match config {
            BackendConfig::Network(tuning) => self.native.connect_network(tuning),
            BackendConfig::RtlUsb(tuning) => {
                if self.native.is_rtl_usb_supported() {
                    self.native.open_rtl_usb(tuning)
                } else {
                    Err(BridgeError::NativeOperationFailed(
                        "decoder engine built without RTL-SDR USB support".into(),
                    ))
                }
            }
            BackendConfig::HackRf(tuning) => self
                .native
                .start_hackrf_mode(tuning.freq_hz, tuning.sample_rate)
                .map_err(|_| BridgeError::PipeSetupFailed),
        };

        match result {
            Ok(()) => {
                self.session.backend = Some(kind);
                self.set_state(SessionState::Active);
                Ok(())
            }
            Err(e) => {
                log::error!("{:?} connect rejected: {}", kind, e);
                self.session.id = None;
                self.set_state(SessionState::Idle);
                Err(e)
            }
        }
    }

    pub fn start(&mut self) -> Result<(), BridgeError> {
        self.require_control("start")?;
        self.native.start()
    }

    /// Stop decoding and release the backend. The session returns to idle.
    pub fn stop(&mut self) -> Result<(), BridgeError> {
        self.require_control("stop")?;
        self.set_state(SessionState::Stopping);
        self.native.stop();
        self.release_backend();
        self.set_state(SessionState::Idle);
        Ok(())
    }

    /// Release everything, whatever the current state.
    pub fn cleanup(&mut self) {
        if self.hackrf_init.resolve(Err(BridgeError::InvalidState(
            "session cleaned up".into(),
        ))) {
            log::info!("Cancelled pending HackRF init");
        }

        if self.session.state.accepts_control() {
            self.native.stop();
        }
        self.release_backend();
        self.rtl_usb.reset();
        self.native.cleanup();
        self.set_state(SessionState::Idle);
    }

    // -- RTL-SDR over USB ----------------------------------------------------

    /// Close the engine's USB source and the device handle. No-op without an
    /// RTL-SDR session.
    pub fn disconnect_rtl_usb(&mut self) {
        if self.session.backend != Some(BackendKind::RtlUsb) {
            log::debug!("disconnect_rtl_usb: no RTL-SDR session");
            self.rtl_usb.close();
            return;
        }
        self.release_backend();
        self.set_state(SessionState::Idle);
    }

    pub fn set_rtl_frequency(&self, freq_hz: u64) -> Result<(), BridgeError> {
        self.require_backend(BackendKind::RtlUsb)?;
        self.native.set_rtl_frequency(freq_hz)
    }

    pub fn set_rtl_gain(&self, gain: i32) -> Result<(), BridgeError> {
        self.require_backend(BackendKind::RtlUsb)?;
        self.native.set_rtl_gain(gain)
    }

    // -- HackRF ------------------------------------------------------------

    /// Create the engine's sample pipe, then make sure the driver is up.
    ///
    /// The returned completion resolves once the driver reports back; it is
    /// already resolved when the driver was initialised earlier.
    pub fn start_hackrf_mode(&mut self, tuning: &HackRfTuning) -> Result<Completion<()>, BridgeError> {
        self.connect(&BackendConfig::HackRf(tuning.clone()))?;

        if self.hackrf_ready.load(Ordering::SeqCst) {
            return Ok(Completion::ready(Ok(())));
        }

        let driver = self.hackrf.clone().ok_or(BridgeError::ContextUnavailable)?;

        let key = self.session.label();
        let completion = self.hackrf_init.arm(key.clone());

        let on_done: HackRfInitCallback = {
            let slot = Arc::clone(&self.hackrf_init);
            let ready = Arc::clone(&self.hackrf_ready);
            let key = key.clone();
            Box::new(move |result| {
                let outcome = match result {
                    Ok(()) => {
                        ready.store(true, Ordering::SeqCst);
                        log::info!("HackRF initialised");
                        Ok(())
                    }
                    Err(msg) => {
                        log::error!("HackRF init failed: {}", msg);
                        Err(BridgeError::NativeInitFailed(msg))
                    }
                };
                // A stale answer for an earlier session has nobody to resolve.
                if let Some(resolver) = slot.take_for(&key) {
                    resolver.resolve(outcome);
                }
            })
        };

        log::info!("Requesting HackRF init for session {}", key);
        if let Err(e) = driver.init(on_done) {
            let e = match e {
                BridgeError::NativeInitFailed(_) => e,
                other => BridgeError::NativeInitFailed(other.to_string()),
            };
            if let Some(resolver) = self.hackrf_init.take_for(&key) {
                resolver.resolve(Err(e.clone()));
            }
            return Err(e);
        }

        Ok(completion)
    }

    /// Stop RX and close the sample pipe. No-op without a HackRF session.
    pub fn stop_hackrf_mode(&mut self) {
        if self.session.backend != Some(BackendKind::HackRf) {
            log::debug!("stop_hackrf_mode: no HackRF session");
            return;
        }
        self.hackrf_init.resolve(Err(BridgeError::InvalidState(
            "HackRF mode stopped".into(),
        )));
        self.release_backend();
        self.set_state(SessionState::Idle);
    }

    pub fn hackrf_set_frequency(&self, freq_hz: u64) -> Result<(), BridgeError> {
        self.ready_driver()?.set_frequency(freq_hz)
    }

    pub fn hackrf_set_sample_rate(&self, sample_rate: u32) -> Result<(), BridgeError> {
        let driver = self.ready_driver()?;
        if sample_rate == 0 || sample_rate > HackRfTuning::MAX_SAMPLE_RATE {
            return Err(BridgeError::InvalidArgument(format!(
                "sample rate {} out of range",
                sample_rate
            )));
        }
        driver.set_sample_rate(sample_rate)
    }

    pub fn hackrf_set_lna_gain(&self, gain: u32) -> Result<(), BridgeError> {
        let driver = self.ready_driver()?;
        validate_lna_gain(gain).map_err(BridgeError::InvalidArgument)?;
        driver.set_lna_gain(gain)
    }

    pub fn hackrf_set_vga_gain(&self, gain: u32) -> Result<(), BridgeError> {
        let driver = self.ready_driver()?;
        validate_vga_gain(gain).map_err(BridgeError::InvalidArgument)?;
        driver.set_vga_gain(gain)
    }

    /// Start the forwarding pipeline and have the driver feed it.
    pub fn hackrf_start_rx(&mut self) -> Result<(), BridgeError> {
        let driver = Arc::clone(self.ready_driver()?);
        self.require_backend(BackendKind::HackRf)?;

        let producer = self.pipeline.start()?;
        if let Err(e) = driver.start_rx(producer) {
            log::error!("HackRF refused to start RX: {}", e);
            self.pipeline.stop();
            return Err(e);
        }
        log::info!("HackRF RX started for session {}", self.session.label());
        Ok(())
    }

    pub fn hackrf_stop_rx(&mut self) -> Result<(), BridgeError> {
        let result = match &self.hackrf {
            Some(driver) if self.pipeline.is_running() => driver.stop(),
            _ => Ok(()),
        };
        self.pipeline.stop();
        result
    }

    pub fn hackrf_pipe_fd(&self) -> i32 {
        self.native.hackrf_pipe_fd()
    }

    /// Push samples straight into the engine, bypassing the pipeline.
    pub fn feed_hackrf_samples(&self, samples: &[u8]) -> Result<(), BridgeError> {
        self.require_backend(BackendKind::HackRf)?;
        self.native.feed_samples(samples)
    }

    // -- internals -----------------------------------------------------------

    fn set_state(&mut self, state: SessionState) {
        if self.session.state != state {
            log::info!(
                "Session {}: {:?} -> {:?}",
                self.session.label(),
                self.session.state,
                state
            );
        }
        self.session.state = state;
    }

    fn require_control(&self, op: &str) -> Result<(), BridgeError> {
        if self.session.state.accepts_control() {
            return Ok(());
        }
        log::warn!("Rejecting {}: session is {:?}", op, self.session.state);
        Err(BridgeError::InvalidState(format!(
            "cannot {} while session is {:?}",
            op, self.session.state
        )))
    }

    fn require_backend(&self, kind: BackendKind) -> Result<(), BridgeError> {
        if self.session.backend == Some(kind) && self.session.state.accepts_control() {
            return Ok(());
        }
        Err(BridgeError::InvalidState(format!(
            "no active {:?} session",
            kind
        )))
    }

    /// Fails while a live RTL-USB session holds the acquired dongle. Only
    /// `stop`, `disconnect_rtl_usb` and `cleanup` may release it then.
    pub fn require_rtl_device_free(&self, op: &str) -> Result<(), BridgeError> {
        if self.require_backend(BackendKind::RtlUsb).is_err() {
            return Ok(());
        }
        log::warn!(
            "Rejecting {}: RTL-SDR in use by session {}",
            op,
            self.session.label()
        );
        Err(BridgeError::InvalidState(format!(
            "cannot {} while the RTL-SDR session is {:?}",
            op, self.session.state
        )))
    }

    fn ready_driver(&self) -> Result<&Arc<dyn HackRfDriver>, BridgeError> {
        let driver = self.hackrf.as_ref().ok_or(BridgeError::ContextUnavailable)?;
        if !self.hackrf_ready.load(Ordering::SeqCst) {
            return Err(BridgeError::InvalidState("HackRF not initialised".into()));
        }
        Ok(driver)
    }

    /// Tear down whatever the active backend holds.
    fn release_backend(&mut self) {
        match self.session.backend.take() {
            Some(BackendKind::HackRf) => {
                if let Err(e) = self.hackrf_stop_rx() {
                    log::warn!("HackRF stop failed: {}", e);
                }
                self.native.stop_hackrf_mode();
            }
            Some(BackendKind::RtlUsb) => {
                self.native.close_rtl_usb();
                self.rtl_usb.close();
            }
            Some(BackendKind::Network) | None => {}
        }
        self.session.id = None;
    }
}

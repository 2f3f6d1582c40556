use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::models::config::{BackendConfig, BridgeConfig, HackRfTuning, NetworkTuning, RtlUsbTuning};
use crate::models::device::{DeviceDescriptor, HackRfDeviceInfo, HACKRF_DEVICES};
use crate::models::error::BridgeError;
use crate::models::filter::FilterMode;
use crate::models::state::{SessionState, UsbAcquisitionState};
use crate::processing::sample_pipeline::PipelineStats;
use crate::session::controller::SessionController;
use crate::session::dispatcher::{BridgeEvent, DispatchStats, EventDispatcher};
use crate::session::pending::Completion;
use crate::session::usb_acquisition::{scan_devices, OpenRequest, UsbAcquisition};
use crate::traits::hackrf_driver::HackRfDriver;
use crate::traits::native_bridge::{NativeCommandSink, NativeEventSource};
use crate::traits::usb_host::UsbHost;

/// Host-facing command surface.
///
/// Owns the session controller, the RTL-SDR acquisition and the event
/// dispatcher, and registers the dispatcher with the engine on construction.
/// Every command either succeeds or returns a [`BridgeError`]; nothing retries.
pub struct SdrBridge {
    native: Arc<dyn NativeCommandSink>,
    events: Arc<dyn NativeEventSource>,
    usb_host: Arc<dyn UsbHost>,
    rtl_usb: Arc<UsbAcquisition>,
    controller: SessionController,
    dispatcher: Arc<EventDispatcher>,
}

impl SdrBridge {
    pub fn new<N>(
        native: Arc<N>,
        usb_host: Arc<dyn UsbHost>,
        hackrf: Option<Arc<dyn HackRfDriver>>,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError>
    where
        N: NativeCommandSink + NativeEventSource + 'static,
    {
        config.validate().map_err(BridgeError::InvalidArgument)?;

        let commands: Arc<dyn NativeCommandSink> = native.clone();
        let events: Arc<dyn NativeEventSource> = native;

        let dispatcher = Arc::new(EventDispatcher::new());
        events.set_event_handler(dispatcher.handler());

        let rtl_usb = Arc::new(UsbAcquisition::rtl_sdr(Arc::clone(&usb_host)));
        let controller = SessionController::new(
            Arc::clone(&commands),
            Arc::clone(&rtl_usb),
            hackrf,
            config.pipeline,
        );

        log::info!("SDR bridge ready");
        Ok(Self {
            native: commands,
            events,
            usb_host,
            rtl_usb,
            controller,
            dispatcher,
        })
    }

    // -- session -------------------------------------------------------------

    /// Connect to an rtl_tcp server.
    pub fn connect(&mut self, tuning: NetworkTuning) -> Result<(), BridgeError> {
        self.controller.connect(&BackendConfig::Network(tuning))
    }

    pub fn start(&mut self) -> Result<(), BridgeError> {
        self.controller.start()
    }

    pub fn stop(&mut self) -> Result<(), BridgeError> {
        self.controller.stop()
    }

    pub fn session_state(&self) -> SessionState {
        self.controller.state()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.controller.session_id()
    }

    pub fn pipeline_stats(&self) -> PipelineStats {
        self.controller.pipeline_stats()
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        self.native.set_audio_enabled(enabled);
    }

    /// Release everything and detach from the engine's event source.
    pub fn shutdown(&mut self) {
        self.controller.cleanup();
        self.events.clear_event_handler();
        let flushed = self.dispatcher.pump();
        log::info!("SDR bridge shut down ({} queued event(s) flushed)", flushed);
    }

    // -- RTL-SDR over USB ----------------------------------------------------

    pub fn is_native_rtl_sdr_supported(&self) -> bool {
        self.native.is_rtl_usb_supported()
    }

    pub fn list_rtl_devices(&self) -> Vec<DeviceDescriptor> {
        self.rtl_usb.list_devices()
    }

    /// Open an RTL-SDR by path, prompting for permission when needed.
    /// Rejected while an RTL-USB session is using the current dongle.
    pub fn open_rtl_device(&self, path: &str) -> Result<OpenRequest, BridgeError> {
        self.controller.require_rtl_device_free("open an RTL-SDR device")?;
        self.rtl_usb.open_path(path)
    }

    /// Release the opened dongle. Use `disconnect_native_usb` while a
    /// session is running on it.
    pub fn close_rtl_device(&self) -> Result<(), BridgeError> {
        self.controller.require_rtl_device_free("close the RTL-SDR device")?;
        self.rtl_usb.close();
        Ok(())
    }

    pub fn rtl_acquisition_state(&self) -> UsbAcquisitionState {
        self.rtl_usb.state()
    }

    /// Forward the platform's USB permission answer.
    ///
    /// A grant that lands while an RTL-USB session is running fails the
    /// pending open instead of replacing the session's handle.
    pub fn on_usb_permission_result(&self, device_path: &str, granted: bool) -> bool {
        if let Err(e) = self.controller.require_rtl_device_free("open an RTL-SDR device") {
            return self.rtl_usb.fail_pending(device_path, e);
        }
        self.rtl_usb.on_permission_result(device_path, granted)
    }

    /// Hand an opened dongle to the engine.
    pub fn connect_native_usb(&mut self, tuning: RtlUsbTuning) -> Result<(), BridgeError> {
        self.controller.connect(&BackendConfig::RtlUsb(tuning))
    }

    pub fn disconnect_native_usb(&mut self) {
        self.controller.disconnect_rtl_usb();
    }

    pub fn set_native_rtl_frequency(&self, freq_hz: u64) -> Result<(), BridgeError> {
        self.controller.set_rtl_frequency(freq_hz)
    }

    pub fn set_native_rtl_gain(&self, gain: i32) -> Result<(), BridgeError> {
        self.controller.set_rtl_gain(gain)
    }

    // -- HackRF ------------------------------------------------------------

    /// Attached HackRFs. Works without permission.
    pub fn hackrf_list_devices(&self) -> Vec<HackRfDeviceInfo> {
        scan_devices(self.usb_host.as_ref(), HACKRF_DEVICES)
            .iter()
            .enumerate()
            .map(|(index, d)| HackRfDeviceInfo::from_descriptor(index, d))
            .collect()
    }

    pub fn start_hackrf_mode(
        &mut self,
        freq_hz: u64,
        sample_rate: u32,
    ) -> Result<Completion<()>, BridgeError> {
        let tuning = HackRfTuning {
            freq_hz,
            sample_rate,
            ..HackRfTuning::default()
        };
        self.controller.start_hackrf_mode(&tuning)
    }

    pub fn hackrf_set_frequency(&self, freq_hz: u64) -> Result<(), BridgeError> {
        self.controller.hackrf_set_frequency(freq_hz)
    }

    pub fn hackrf_set_sample_rate(&self, sample_rate: u32) -> Result<(), BridgeError> {
        self.controller.hackrf_set_sample_rate(sample_rate)
    }

    pub fn hackrf_set_lna_gain(&self, gain: u32) -> Result<(), BridgeError> {
        self.controller.hackrf_set_lna_gain(gain)
    }

    pub fn hackrf_set_vga_gain(&self, gain: u32) -> Result<(), BridgeError> {
        self.controller.hackrf_set_vga_gain(gain)
    }

    pub fn hackrf_start_rx(&mut self) -> Result<(), BridgeError> {
        self.controller.hackrf_start_rx()
    }

    pub fn hackrf_stop_rx(&mut self) -> Result<(), BridgeError> {
        self.controller.hackrf_stop_rx()
    }

    pub fn hackrf_pipe_fd(&self) -> i32 {
        self.controller.hackrf_pipe_fd()
    }

    pub fn feed_hackrf_samples(&self, samples: &[u8]) -> Result<(), BridgeError> {
        self.controller.feed_hackrf_samples(samples)
    }

    pub fn stop_hackrf_mode(&mut self) {
        self.controller.stop_hackrf_mode();
    }

    // -- talkgroup filter ----------------------------------------------------

    pub fn set_filter_mode(&self, mode: i32) -> Result<(), BridgeError> {
        let mode = FilterMode::try_from(mode)?;
        self.native.set_filter_mode(mode.as_raw());
        Ok(())
    }

    pub fn filter_mode(&self) -> Result<FilterMode, BridgeError> {
        FilterMode::try_from(self.native.filter_mode())
    }

    pub fn set_filter_talkgroups(&self, talkgroups: &[i32]) {
        self.native.set_filter_talkgroups(talkgroups);
    }

    pub fn add_filter_talkgroup(&self, talkgroup: i32) {
        self.native.add_filter_talkgroup(talkgroup);
    }

    pub fn remove_filter_talkgroup(&self, talkgroup: i32) {
        self.native.remove_filter_talkgroup(talkgroup);
    }

    pub fn clear_filter_talkgroups(&self) {
        self.native.clear_filter_talkgroups();
    }

    // -- engine tuning -------------------------------------------------------

    pub fn set_custom_args(&self, args: &str) {
        self.native.set_custom_args(args);
    }

    pub fn set_retune_frozen(&self, frozen: bool) {
        self.native.set_retune_frozen(frozen);
    }

    pub fn retune(&self, freq_hz: u64) -> Result<(), BridgeError> {
        self.native.retune(freq_hz).map_err(|e| {
            log::warn!("Retune to {} Hz rejected: {}", freq_hz, e);
            e
        })
    }

    pub fn reset_p25_state(&self) {
        self.native.reset_p25_state();
    }

    pub fn set_bias_tee(&self, enabled: bool) -> Result<(), BridgeError> {
        self.native.set_bias_tee(enabled)
    }

    // -- events --------------------------------------------------------------

    pub fn subscribe<E: BridgeEvent>(&self, subscriber: impl Fn(&E) + Send + Sync + 'static) {
        self.dispatcher.subscribe(subscriber);
    }

    pub fn unsubscribe<E: BridgeEvent>(&self) {
        self.dispatcher.unsubscribe::<E>();
    }

    pub fn subscribe_output(&self, subscriber: impl Fn(&str) + Send + Sync + 'static) {
        self.dispatcher.subscribe_output(subscriber);
    }

    pub fn unsubscribe_output(&self) {
        self.dispatcher.unsubscribe_output();
    }

    /// Deliver queued engine events. Call from the delivery context.
    pub fn pump(&self) -> usize {
        self.dispatcher.pump()
    }

    pub fn pump_timeout(&self, timeout: Duration) -> usize {
        self.dispatcher.pump_timeout(timeout)
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }
}

//! Fakes for the boundary traits, shared by unit tests.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::models::config::{NetworkTuning, RtlUsbTuning};
use crate::models::device::{UsbDeviceId, UsbDeviceInfo};
use crate::models::error::BridgeError;
use crate::processing::sample_pipeline::SampleProducer;
use crate::traits::hackrf_driver::{HackRfDriver, HackRfInitCallback};
use crate::traits::native_bridge::{
    NativeCommandSink, NativeEvent, NativeEventHandler, NativeEventSource,
};
use crate::traits::usb_host::{UsbConnection, UsbHost};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

// ---------------------------------------------------------------------------
// Native engine

/// Blocks `feed_samples` until released.
pub struct FeedGate {
    entered: Receiver<()>,
    release: Sender<()>,
}

impl FeedGate {
    pub fn wait_entered(&self) {
        self.entered
            .recv_timeout(Duration::from_secs(2))
            .expect("feed_samples was never entered");
    }

    /// Unblock the current and all later feeds.
    pub fn release(self) {
        drop(self.release);
    }
}

#[derive(Default)]
struct GateEnds {
    entered: Option<Sender<()>>,
    release: Option<Receiver<()>>,
}

/// Recording decoder engine. Enforces the retune-frozen policy like the real
/// engine does.
#[derive(Default)]
pub struct FakeNative {
    commands: Mutex<Vec<String>>,
    fed: Mutex<Vec<Vec<u8>>>,
    fail_feeds: AtomicBool,
    gate: Mutex<GateEnds>,
    reject_connect: AtomicBool,
    reject_pipe: AtomicBool,
    rtl_unsupported: AtomicBool,
    retune_frozen: AtomicBool,
    hackrf_mode: AtomicBool,
    filter_mode: AtomicI32,
    talkgroups: Mutex<Vec<i32>>,
    handler: Mutex<Option<NativeEventHandler>>,
}

impl FakeNative {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.commands.lock().iter().filter(|c| *c == command).count()
    }

    pub fn fed_samples(&self) -> Vec<Vec<u8>> {
        self.fed.lock().clone()
    }

    pub fn fail_feeds(&self, fail: bool) {
        self.fail_feeds.store(fail, Ordering::SeqCst);
    }

    pub fn gate_feeds(&self) -> FeedGate {
        let (entered_tx, entered_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        *self.gate.lock() = GateEnds {
            entered: Some(entered_tx),
            release: Some(release_rx),
        };
        FeedGate {
            entered: entered_rx,
            release: release_tx,
        }
    }

    pub fn reject_connect(&self, reject: bool) {
        self.reject_connect.store(reject, Ordering::SeqCst);
    }

    pub fn reject_pipe(&self, reject: bool) {
        self.reject_pipe.store(reject, Ordering::SeqCst);
    }

    pub fn set_rtl_unsupported(&self) {
        self.rtl_unsupported.store(true, Ordering::SeqCst);
    }

    pub fn talkgroups(&self) -> Vec<i32> {
        self.talkgroups.lock().clone()
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().is_some()
    }

    /// Emit an event from a fresh engine thread.
    pub fn emit_from_thread(&self, events: Vec<NativeEvent>) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            thread::spawn(move || {
                for event in events {
                    handler(event);
                }
            })
            .join()
            .expect("emitter thread panicked");
        }
    }

    fn record(&self, command: impl Into<String>) {
        self.commands.lock().push(command.into());
    }
}

impl NativeCommandSink for FakeNative {
    fn connect_network(&self, _tuning: &NetworkTuning) -> Result<(), BridgeError> {
        self.record("connect_network");
        if self.reject_connect.load(Ordering::SeqCst) {
            return Err(BridgeError::native("connect"));
        }
        Ok(())
    }

    fn start(&self) -> Result<(), BridgeError> {
        self.record("start");
        Ok(())
    }

    fn stop(&self) {
        self.record("stop");
    }

    fn cleanup(&self) {
        self.record("cleanup");
    }

    fn set_audio_enabled(&self, enabled: bool) {
        self.record(format!("set_audio_enabled:{}", enabled));
    }

    fn is_rtl_usb_supported(&self) -> bool {
        !self.rtl_unsupported.load(Ordering::SeqCst)
    }

    fn open_rtl_usb(&self, _tuning: &RtlUsbTuning) -> Result<(), BridgeError> {
        self.record("open_rtl_usb");
        if self.reject_connect.load(Ordering::SeqCst) {
            return Err(BridgeError::native("open RTL-SDR"));
        }
        Ok(())
    }

    fn close_rtl_usb(&self) {
        self.record("close_rtl_usb");
    }

    fn set_rtl_frequency(&self, freq_hz: u64) -> Result<(), BridgeError> {
        self.record(format!("set_rtl_frequency:{}", freq_hz));
        Ok(())
    }

    fn set_rtl_gain(&self, gain: i32) -> Result<(), BridgeError> {
        self.record(format!("set_rtl_gain:{}", gain));
        Ok(())
    }

    fn start_hackrf_mode(&self, _freq_hz: u64, _sample_rate: u32) -> Result<(), BridgeError> {
        self.record("start_hackrf_mode");
        if self.reject_pipe.load(Ordering::SeqCst) {
            return Err(BridgeError::native("pipe"));
        }
        self.hackrf_mode.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn hackrf_pipe_fd(&self) -> i32 {
        if self.hackrf_mode.load(Ordering::SeqCst) {
            7
        } else {
            -1
        }
    }

    fn feed_samples(&self, samples: &[u8]) -> Result<(), BridgeError> {
        let (entered, release) = {
            let gate = self.gate.lock();
            (gate.entered.clone(), gate.release.clone())
        };
        if let (Some(entered), Some(release)) = (entered, release) {
            let _ = entered.send(());
            // Returns once the gate's sender is dropped.
            let _ = release.recv();
        }

        if self.fail_feeds.load(Ordering::SeqCst) {
            return Err(BridgeError::native("feed"));
        }
        self.fed.lock().push(samples.to_vec());
        Ok(())
    }

    fn stop_hackrf_mode(&self) {
        self.record("stop_hackrf_mode");
        self.hackrf_mode.store(false, Ordering::SeqCst);
    }

    fn set_filter_mode(&self, mode: i32) {
        self.filter_mode.store(mode, Ordering::SeqCst);
    }

    fn set_filter_talkgroups(&self, talkgroups: &[i32]) {
        *self.talkgroups.lock() = talkgroups.to_vec();
    }

    fn add_filter_talkgroup(&self, talkgroup: i32) {
        let mut tgs = self.talkgroups.lock();
        if !tgs.contains(&talkgroup) {
            tgs.push(talkgroup);
        }
    }

    fn remove_filter_talkgroup(&self, talkgroup: i32) {
        self.talkgroups.lock().retain(|tg| *tg != talkgroup);
    }

    fn clear_filter_talkgroups(&self) {
        self.talkgroups.lock().clear();
    }

    fn filter_mode(&self) -> i32 {
        self.filter_mode.load(Ordering::SeqCst)
    }

    fn set_custom_args(&self, args: &str) {
        self.record(format!("set_custom_args:{}", args));
    }

    fn set_retune_frozen(&self, frozen: bool) {
        self.retune_frozen.store(frozen, Ordering::SeqCst);
    }

    fn retune(&self, freq_hz: u64) -> Result<(), BridgeError> {
        if self.retune_frozen.load(Ordering::SeqCst) {
            return Err(BridgeError::native("retune"));
        }
        self.record(format!("retune:{}", freq_hz));
        Ok(())
    }

    fn reset_p25_state(&self) {
        self.record("reset_p25_state");
    }

    fn set_bias_tee(&self, enabled: bool) -> Result<(), BridgeError> {
        self.record(format!("set_bias_tee:{}", enabled));
        Ok(())
    }
}

impl NativeEventSource for FakeNative {
    fn set_event_handler(&self, handler: NativeEventHandler) {
        *self.handler.lock() = Some(handler);
    }

    fn clear_event_handler(&self) {
        *self.handler.lock() = None;
    }
}

// ---------------------------------------------------------------------------
// USB host

struct FakeDevice {
    info: UsbDeviceInfo,
    granted: bool,
}

#[derive(Default)]
pub struct FakeUsbHost {
    devices: Mutex<Vec<FakeDevice>>,
    permission_requests: AtomicUsize,
    refuse_open: AtomicBool,
    next_fd: AtomicI32,
    closed: Arc<AtomicUsize>,
}

impl FakeUsbHost {
    pub fn new() -> Arc<Self> {
        let host = Self::default();
        host.next_fd.store(20, Ordering::SeqCst);
        Arc::new(host)
    }

    pub fn attach(&self, vendor_id: u16, product_id: u16, path: &str, granted: bool) {
        self.devices.lock().push(FakeDevice {
            info: UsbDeviceInfo {
                id: UsbDeviceId::new(vendor_id, product_id),
                path: path.into(),
                product_name: None,
                manufacturer_name: None,
            },
            granted,
        });
    }

    pub fn detach(&self, path: &str) {
        self.devices.lock().retain(|d| d.info.path != path);
    }

    pub fn grant(&self, path: &str) {
        for d in self.devices.lock().iter_mut() {
            if d.info.path == path {
                d.granted = true;
            }
        }
    }

    pub fn refuse_open(&self, refuse: bool) {
        self.refuse_open.store(refuse, Ordering::SeqCst);
    }

    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }

    pub fn closed_connections(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeConnection {
    fd: i32,
    closed: Arc<AtomicUsize>,
}

impl UsbConnection for FakeConnection {
    fn file_descriptor(&self) -> i32 {
        self.fd
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl UsbHost for FakeUsbHost {
    fn attached_devices(&self) -> Vec<UsbDeviceInfo> {
        self.devices.lock().iter().map(|d| d.info.clone()).collect()
    }

    fn has_permission(&self, path: &str) -> bool {
        self.devices
            .lock()
            .iter()
            .any(|d| d.info.path == path && d.granted)
    }

    fn request_permission(&self, _path: &str) -> Result<(), BridgeError> {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn open_device(&self, path: &str) -> Option<Box<dyn UsbConnection>> {
        if self.refuse_open.load(Ordering::SeqCst) || !self.has_permission(path) {
            return None;
        }
        Some(Box::new(FakeConnection {
            fd: self.next_fd.fetch_add(1, Ordering::SeqCst),
            closed: Arc::clone(&self.closed),
        }))
    }
}

// ---------------------------------------------------------------------------
// HackRF driver

/// How [`FakeHackRf::init`] answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitBehavior {
    /// Hold the callback until [`FakeHackRf::complete_init`].
    Deferred,
    Succeed,
    Fail(String),
    /// Refuse to issue the request at all.
    Refuse,
}

pub struct FakeHackRf {
    behavior: Mutex<InitBehavior>,
    held: Mutex<Option<HackRfInitCallback>>,
    init_calls: AtomicUsize,
    calls: Mutex<Vec<String>>,
    refuse_rx: AtomicBool,
    producer: Mutex<Option<SampleProducer>>,
}

impl FakeHackRf {
    pub fn new(behavior: InitBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            held: Mutex::new(None),
            init_calls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            refuse_rx: AtomicBool::new(false),
            producer: Mutex::new(None),
        })
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Deliver the held init outcome from another thread.
    pub fn complete_init(&self, result: Result<(), String>) {
        let callback = self.held.lock().take().expect("no init in flight");
        thread::spawn(move || callback(result))
            .join()
            .expect("init callback panicked");
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn refuse_rx(&self, refuse: bool) {
        self.refuse_rx.store(refuse, Ordering::SeqCst);
    }

    pub fn producer(&self) -> Option<SampleProducer> {
        self.producer.lock().clone()
    }
}

impl HackRfDriver for FakeHackRf {
    fn init(&self, on_done: HackRfInitCallback) -> Result<(), BridgeError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().clone();
        match behavior {
            InitBehavior::Deferred => {
                *self.held.lock() = Some(on_done);
            }
            InitBehavior::Succeed => on_done(Ok(())),
            InitBehavior::Fail(msg) => on_done(Err(msg)),
            InitBehavior::Refuse => {
                return Err(BridgeError::NativeInitFailed("USB service missing".into()))
            }
        }
        Ok(())
    }

    fn set_frequency(&self, freq_hz: u64) -> Result<(), BridgeError> {
        self.calls.lock().push(format!("set_frequency:{}", freq_hz));
        Ok(())
    }

    fn set_sample_rate(&self, sample_rate: u32) -> Result<(), BridgeError> {
        self.calls.lock().push(format!("set_sample_rate:{}", sample_rate));
        Ok(())
    }

    fn set_lna_gain(&self, gain: u32) -> Result<(), BridgeError> {
        self.calls.lock().push(format!("set_lna_gain:{}", gain));
        Ok(())
    }

    fn set_vga_gain(&self, gain: u32) -> Result<(), BridgeError> {
        self.calls.lock().push(format!("set_vga_gain:{}", gain));
        Ok(())
    }

    fn start_rx(&self, producer: SampleProducer) -> Result<(), BridgeError> {
        if self.refuse_rx.load(Ordering::SeqCst) {
            return Err(BridgeError::NativeOperationFailed("RX refused".into()));
        }
        self.calls.lock().push("start_rx".into());
        *self.producer.lock() = Some(producer);
        Ok(())
    }

    fn stop(&self) -> Result<(), BridgeError> {
        self.calls.lock().push("stop".into());
        self.producer.lock().take();
        Ok(())
    }
}

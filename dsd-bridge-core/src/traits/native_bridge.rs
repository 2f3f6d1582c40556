use std::sync::Arc;

use crate::models::config::{NetworkTuning, RtlUsbTuning};
use crate::models::error::BridgeError;

/// Command side of the native decoder engine.
///
/// Implemented by the foreign-function binding. This trait and
/// [`NativeEventSource`] are the only places where native marshaling happens;
/// everything above them works with owned Rust values.
///
/// Calls are synchronous. Commands the engine can refuse return `Err`
/// (usually [`BridgeError::NativeOperationFailed`]).
pub trait NativeCommandSink: Send + Sync {
    /// Configure the engine for an rtl_tcp network source.
    fn connect_network(&self, tuning: &NetworkTuning) -> Result<(), BridgeError>;

    /// Start the decode loop.
    fn start(&self) -> Result<(), BridgeError>;

    /// Stop the decode loop, joining engine threads.
    fn stop(&self);

    /// Release all engine state.
    fn cleanup(&self);

    fn set_audio_enabled(&self, enabled: bool);

    /// Whether the engine was built with in-process RTL-SDR USB support.
    fn is_rtl_usb_supported(&self) -> bool;

    /// Hand an already-opened USB connection to the engine.
    fn open_rtl_usb(&self, tuning: &RtlUsbTuning) -> Result<(), BridgeError>;

    fn close_rtl_usb(&self);

    fn set_rtl_frequency(&self, freq_hz: u64) -> Result<(), BridgeError>;

    fn set_rtl_gain(&self, gain: i32) -> Result<(), BridgeError>;

    /// Create the sample pipe the engine reads HackRF IQ data from.
    fn start_hackrf_mode(&self, freq_hz: u64, sample_rate: u32) -> Result<(), BridgeError>;

    /// Write end of the HackRF sample pipe, or -1 when none exists.
    fn hackrf_pipe_fd(&self) -> i32;

    /// Push one buffer of interleaved 8-bit IQ samples into the engine.
    ///
    /// The slice is only borrowed for the duration of the call.
    fn feed_samples(&self, samples: &[u8]) -> Result<(), BridgeError>;

    fn stop_hackrf_mode(&self);

    fn set_filter_mode(&self, mode: i32);

    fn set_filter_talkgroups(&self, talkgroups: &[i32]);

    fn add_filter_talkgroup(&self, talkgroup: i32);

    fn remove_filter_talkgroup(&self, talkgroup: i32);

    fn clear_filter_talkgroups(&self);

    fn filter_mode(&self) -> i32;

    /// Extra engine command-line style arguments.
    fn set_custom_args(&self, args: &str);

    /// While frozen the engine refuses retune requests.
    fn set_retune_frozen(&self, frozen: bool);

    fn retune(&self, freq_hz: u64) -> Result<(), BridgeError>;

    fn reset_p25_state(&self);

    fn set_bias_tee(&self, enabled: bool) -> Result<(), BridgeError>;
}

/// Callback invoked by the engine for every emitted event.
///
/// May be called from any engine thread, must not block.
pub type NativeEventHandler = Arc<dyn Fn(NativeEvent) + Send + Sync + 'static>;

/// Event side of the native decoder engine.
pub trait NativeEventSource: Send + Sync {
    /// Register the single handler receiving engine events, replacing any
    /// previous one.
    fn set_event_handler(&self, handler: NativeEventHandler);

    fn clear_event_handler(&self);
}

/// Raw call notification, all scalar.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawCall {
    pub event_type: i32,
    pub talkgroup: i32,
    pub source_id: i32,
    pub nac: i32,
    pub call_type: String,
    pub is_encrypted: bool,
    pub is_emergency: bool,
    pub alg_name: String,
    pub slot: i32,
    pub frequency: f64,
    pub system_name: String,
    pub group_name: String,
    pub source_name: String,
}

/// Raw patch table. Parallel arrays indexed by entry; member arrays are
/// flat with a stride of eight per entry. Any array may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawPatchTable {
    pub patch_count: i32,
    pub sgids: Option<Vec<i32>>,
    pub is_patch: Option<Vec<bool>>,
    pub active: Option<Vec<bool>>,
    pub last_update: Option<Vec<i64>>,
    pub wgid_counts: Option<Vec<i32>>,
    pub wgids: Option<Vec<i32>>,
    pub wuid_counts: Option<Vec<i32>>,
    pub wuids: Option<Vec<i32>>,
    pub keys: Option<Vec<i32>>,
    pub algs: Option<Vec<i32>>,
    pub key_valid: Option<Vec<bool>>,
}

/// An event exactly as the engine emitted it.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeEvent {
    /// One line of engine log output.
    Output(String),
    Call(RawCall),
    Site {
        wacn: i64,
        site_id: i64,
        rfss_id: i64,
        system_id: i64,
        nac: i32,
    },
    Signal {
        tsbk_ok: i32,
        tsbk_err: i32,
        sync_type: i32,
        has_carrier: bool,
        has_sync: bool,
    },
    Network {
        neighbor_count: i32,
        neighbor_freqs: Option<Vec<i64>>,
        neighbor_last_seen: Option<Vec<i64>>,
    },
    Patch(RawPatchTable),
    GroupAttachment {
        ga_count: i32,
        rids: Option<Vec<i64>>,
        tgs: Option<Vec<i32>>,
        last_seen: Option<Vec<i64>>,
    },
    Affiliation {
        aff_count: i32,
        rids: Option<Vec<i64>>,
        last_seen: Option<Vec<i64>>,
    },
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::BridgeError;
use super::state::BackendKind;

/// Default control-channel frequency used when the host supplies none.
pub const DEFAULT_FREQ_HZ: u64 = 771_181_250;

/// Default RTL-SDR / HackRF sample rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 2_400_000;

/// Tuning for a network-streamed tuner (rtl_tcp server).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkTuning {
    pub host: String,
    pub port: u16,
    pub freq_hz: u64,
    /// Tuner gain in dB (0 = automatic).
    pub gain: i32,
    pub ppm: i32,
    pub bias_tee: bool,
}

impl NetworkTuning {
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host must not be empty".into());
        }
        if self.port == 0 {
            return Err("port must be non-zero".into());
        }
        if self.freq_hz == 0 {
            return Err("frequency must be positive".into());
        }
        Ok(())
    }
}

impl Default for NetworkTuning {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 1234,
            freq_hz: DEFAULT_FREQ_HZ,
            gain: 48,
            ppm: 0,
            bias_tee: false,
        }
    }
}

/// Tuning for an RTL-SDR dongle opened through the USB host API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RtlUsbTuning {
    /// File descriptor of the opened USB connection.
    pub fd: i32,
    pub device_path: String,
    pub freq_hz: u64,
    pub sample_rate: u32,
    pub gain: i32,
    pub ppm: i32,
    pub bias_tee: bool,
}

impl RtlUsbTuning {
    pub fn validate(&self) -> Result<(), String> {
        if self.fd < 0 {
            return Err(format!("invalid file descriptor: {}", self.fd));
        }
        if self.device_path.is_empty() {
            return Err("device path must not be empty".into());
        }
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        Ok(())
    }
}

impl Default for RtlUsbTuning {
    fn default() -> Self {
        Self {
            fd: -1,
            device_path: String::new(),
            freq_hz: DEFAULT_FREQ_HZ,
            sample_rate: DEFAULT_SAMPLE_RATE,
            gain: 0,
            ppm: 0,
            bias_tee: false,
        }
    }
}

/// HackRF receive settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HackRfTuning {
    pub freq_hz: u64,
    pub sample_rate: u32,
    pub lna_gain: u32,
    pub vga_gain: u32,
}

impl HackRfTuning {
    pub const MAX_SAMPLE_RATE: u32 = 20_000_000;

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 || self.sample_rate > Self::MAX_SAMPLE_RATE {
            return Err(format!("unsupported HackRF sample rate: {}", self.sample_rate));
        }
        validate_lna_gain(self.lna_gain)?;
        validate_vga_gain(self.vga_gain)
    }
}

impl Default for HackRfTuning {
    fn default() -> Self {
        Self {
            freq_hz: DEFAULT_FREQ_HZ,
            sample_rate: DEFAULT_SAMPLE_RATE,
            lna_gain: 16,
            vga_gain: 16,
        }
    }
}

/// LNA gain: 0-40 dB in 8 dB steps.
pub fn validate_lna_gain(gain: u32) -> Result<(), String> {
    if gain > 40 || gain % 8 != 0 {
        return Err(format!("unsupported LNA gain: {} (0-40 dB, 8 dB steps)", gain));
    }
    Ok(())
}

/// VGA gain: 0-62 dB in 2 dB steps.
pub fn validate_vga_gain(gain: u32) -> Result<(), String> {
    if gain > 62 || gain % 2 != 0 {
        return Err(format!("unsupported VGA gain: {} (0-62 dB, 2 dB steps)", gain));
    }
    Ok(())
}

/// Backend-specific connect request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "camelCase")]
pub enum BackendConfig {
    Network(NetworkTuning),
    RtlUsb(RtlUsbTuning),
    HackRf(HackRfTuning),
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Network(_) => BackendKind::Network,
            Self::RtlUsb(_) => BackendKind::RtlUsb,
            Self::HackRf(_) => BackendKind::HackRf,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Network(t) => t.validate(),
            Self::RtlUsb(t) => t.validate(),
            Self::HackRf(t) => t.validate(),
        }
    }
}

/// Sizing and timing of the sample forwarding pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Number of buffers the pool may have on loan at once.
    pub buffer_count: usize,

    /// Capacity of each buffer in bytes (one HackRF USB transfer).
    pub buffer_size: usize,

    /// Bounded queue depth between the driver and the forwarding worker.
    pub queue_capacity: usize,

    /// How long the worker blocks on the queue before re-checking its flag.
    #[serde(with = "millis")]
    pub poll_interval: Duration,

    /// Upper bound on how long `stop()` waits for the worker to exit.
    #[serde(with = "millis")]
    pub join_timeout: Duration,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_count == 0 {
            return Err("buffer count must be positive".into());
        }
        if self.buffer_size == 0 {
            return Err("buffer size must be positive".into());
        }
        if self.queue_capacity == 0 {
            return Err("queue capacity must be positive".into());
        }
        if self.poll_interval.is_zero() {
            return Err("poll interval must be positive".into());
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_count: 16,
            buffer_size: 262_144,
            queue_capacity: 64,
            poll_interval: Duration::from_millis(100),
            join_timeout: Duration::from_secs(1),
        }
    }
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    pub pipeline: PipelineConfig,
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.pipeline.validate()
    }

    /// Parse and validate a host-supplied JSON config. Missing fields take
    /// their defaults.
    pub fn from_json(json: &str) -> Result<Self, BridgeError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BridgeError::InvalidArgument(format!("failed to parse config: {}", e)))?;
        config.validate().map_err(BridgeError::InvalidArgument)?;
        Ok(config)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(NetworkTuning::default().validate().is_ok());
        assert!(HackRfTuning::default().validate().is_ok());
        assert!(BridgeConfig::default().validate().is_ok());
        // No descriptor until a device has been opened.
        assert!(RtlUsbTuning::default().validate().is_err());
    }

    #[test]
    fn gain_steps() {
        assert!(validate_lna_gain(24).is_ok());
        assert!(validate_lna_gain(20).is_err());
        assert!(validate_lna_gain(48).is_err());
        assert!(validate_vga_gain(62).is_ok());
        assert!(validate_vga_gain(63).is_err());
    }

    #[test]
    fn network_config_from_partial_json() {
        let cfg: BackendConfig =
            serde_json::from_str(r#"{"backend":"network","host":"10.0.0.2","freqHz":851000000}"#)
                .unwrap();
        let BackendConfig::Network(t) = cfg else {
            panic!("expected network backend");
        };
        assert_eq!(t.host, "10.0.0.2");
        assert_eq!(t.port, 1234);
        assert_eq!(t.freq_hz, 851_000_000);
        assert_eq!(t.gain, 48);
    }

    #[test]
    fn bridge_config_from_json() {
        let cfg = BridgeConfig::from_json(r#"{"pipeline":{"queueCapacity":8,"joinTimeout":250}}"#)
            .unwrap();
        assert_eq!(cfg.pipeline.queue_capacity, 8);
        assert_eq!(cfg.pipeline.join_timeout, Duration::from_millis(250));
        assert_eq!(cfg.pipeline.buffer_count, 16);

        let err = BridgeConfig::from_json(r#"{"pipeline":{"bufferCount":0}}"#).unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGS");
        assert!(BridgeConfig::from_json("not json").is_err());
    }

    #[test]
    fn pipeline_durations_round_trip_as_millis() {
        let json = serde_json::to_value(PipelineConfig::default()).unwrap();
        assert_eq!(json["pollInterval"], 100);
        assert_eq!(json["joinTimeout"], 1000);
    }
}

use thiserror::Error;

/// Errors surfaced by the bridge at its command boundary.
///
/// Every rejected command carries one of these kinds plus a readable message
/// (`Display`). The host decides whether to retry; nothing here retries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("USB permission denied by user")]
    PermissionDenied,

    #[error("USB device not found: {0}")]
    DeviceNotFound(String),

    #[error("device is not a supported SDR: {0}")]
    DeviceNotApplicable(String),

    #[error("failed to open USB device: {0}")]
    OpenFailed(String),

    #[error("failed to create HackRF sample pipe")]
    PipeSetupFailed,

    #[error("application context not available")]
    ContextUnavailable,

    #[error("native init failed: {0}")]
    NativeInitFailed(String),

    #[error("native operation failed: {0}")]
    NativeOperationFailed(String),

    /// Reserved for the host's external driver launcher (e.g. starting an
    /// rtl_tcp driver app). Nothing in this crate launches drivers itself.
    #[error("failed to launch driver: {0}")]
    DriverLaunchFailed(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("request superseded by a newer one")]
    PermissionSuperseded,
}

impl BridgeError {
    /// Stable identifier for the error kind, suitable for a host error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "USB_PERMISSION_DENIED",
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Self::DeviceNotApplicable(_) => "NOT_APPLICABLE",
            Self::OpenFailed(_) => "OPEN_FAILED",
            Self::PipeSetupFailed => "PIPE_ERROR",
            Self::ContextUnavailable => "CONTEXT_ERROR",
            Self::NativeInitFailed(_) => "INIT_ERROR",
            Self::NativeOperationFailed(_) => "NATIVE_ERROR",
            Self::DriverLaunchFailed(_) => "DRIVER_ERROR",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::InvalidArgument(_) => "INVALID_ARGS",
            Self::PermissionSuperseded => "SUPERSEDED",
        }
    }

    /// Rejection of `op` by the engine. For engine bindings.
    pub fn native(op: &str) -> Self {
        Self::NativeOperationFailed(format!("{} rejected by decoder engine", op))
    }
}

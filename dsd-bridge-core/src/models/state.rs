use serde::Serialize;

/// Hardware session state machine.
///
/// State transitions:
/// ```text
/// idle → connecting → active → stopping → idle
///   ↑________________________________________|   (cleanup from any state)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Stopping,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether start/stop commands may be forwarded in this state.
    pub fn accepts_control(&self) -> bool {
        matches!(self, Self::Connecting | Self::Active)
    }
}

/// Which front end the active session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendKind {
    Network,
    RtlUsb,
    HackRf,
}

/// USB acquisition state machine.
///
/// ```text
/// idle → enumerating → permission_requested ─┬→ opened → closed
///                            ↑ denied ←──────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsbAcquisitionState {
    Idle,
    Enumerating,
    PermissionRequested,
    Opened,
    Closed,
}

impl UsbAcquisitionState {
    pub fn is_opened(&self) -> bool {
        matches!(self, Self::Opened)
    }
}

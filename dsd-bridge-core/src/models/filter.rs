use serde::{Deserialize, Serialize};

use super::error::BridgeError;

/// Talkgroup filter policy applied by the decoder engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterMode {
    /// Every talkgroup is followed.
    Disabled,
    /// Only listed talkgroups are followed.
    AllowList,
    /// Listed talkgroups are skipped.
    BlockList,
}

impl FilterMode {
    pub fn as_raw(&self) -> i32 {
        match self {
            Self::Disabled => 0,
            Self::AllowList => 1,
            Self::BlockList => 2,
        }
    }
}

impl TryFrom<i32> for FilterMode {
    type Error = BridgeError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::AllowList),
            2 => Ok(Self::BlockList),
            other => Err(BridgeError::InvalidArgument(format!(
                "unknown filter mode: {}",
                other
            ))),
        }
    }
}

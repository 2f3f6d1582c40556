//! Decoded event records delivered to subscribers.
//!
//! Records are built by the event decoder from raw native callbacks and are
//! immutable once delivered. Each kind travels on its own channel. All of them
//! serialise to the camelCase maps the host UI consumes.

use arrayvec::ArrayVec;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Fixed per-entry member capacity of a patch record.
pub const PATCH_MEMBER_CAP: usize = 8;

/// One logical channel per event kind, plus the raw text output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Output,
    Call,
    Site,
    Signal,
    Network,
    Patch,
    GroupAttachment,
    Affiliation,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        Self::Output,
        Self::Call,
        Self::Site,
        Self::Signal,
        Self::Network,
        Self::Patch,
        Self::GroupAttachment,
        Self::Affiliation,
    ];

    /// Channel name as exposed to the host.
    pub fn channel_name(&self) -> &'static str {
        match self {
            Self::Output => "dsd_flutter/output",
            Self::Call => "dsd_flutter/call_events",
            Self::Site => "dsd_flutter/site_events",
            Self::Signal => "dsd_flutter/signal_events",
            Self::Network => "dsd_flutter/network_events",
            Self::Patch => "dsd_flutter/patch_events",
            Self::GroupAttachment => "dsd_flutter/group_attachment_events",
            Self::Affiliation => "dsd_flutter/affiliation_events",
        }
    }
}

/// Convert an epoch-seconds timestamp from the engine.
pub fn epoch_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0)
}

/// Phase of a call as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEventType {
    Start,
    Update,
    End,
    Unknown(i32),
}

impl CallEventType {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Start,
            1 => Self::Update,
            2 => Self::End,
            other => Self::Unknown(other),
        }
    }

    pub fn as_raw(&self) -> i32 {
        match self {
            Self::Start => 0,
            Self::Update => 1,
            Self::End => 2,
            Self::Unknown(raw) => *raw,
        }
    }
}

impl Serialize for CallEventType {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i32(self.as_raw())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    pub event_type: CallEventType,
    pub talkgroup: i32,
    pub source_id: i32,
    pub nac: i32,
    /// "Group" or "Private".
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteEvent {
    pub wacn: i64,
    pub site_id: i64,
    pub rfss_id: i64,
    pub system_id: i64,
    pub nac: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEvent {
    /// Control blocks decoded cleanly.
    pub tsbk_ok: i32,
    /// Control blocks that failed FEC/CRC.
    pub tsbk_err: i32,
    #[serde(rename = "synctype")]
    pub sync_type: i32,
    pub has_carrier: bool,
    pub has_sync: bool,
}

impl SignalEvent {
    /// Fraction of control blocks in error, 0.0 when nothing was decoded.
    pub fn error_ratio(&self) -> f32 {
        let total = self.tsbk_ok.max(0) + self.tsbk_err.max(0);
        if total == 0 {
            return 0.0;
        }
        self.tsbk_err.max(0) as f32 / total as f32
    }
}

/// Neighbor-site topology. Both sequences are exactly `neighbor_count` long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEvent {
    pub neighbor_count: usize,
    pub neighbor_freqs: Vec<i64>,
    pub neighbor_last_seen: Vec<i64>,
}

impl NetworkEvent {
    pub fn neighbors(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.neighbor_freqs
            .iter()
            .copied()
            .zip(self.neighbor_last_seen.iter().copied())
    }
}

/// One super-group patch or key-sharing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchEntry {
    pub sgid: i32,
    pub is_patch: bool,
    pub active: bool,
    pub last_update: i64,
    /// Member count reported by the engine. Exceeds `wgids.len()` when the
    /// list was capped.
    pub wgid_count: usize,
    pub wgids: ArrayVec<i32, PATCH_MEMBER_CAP>,
    pub wuid_count: usize,
    pub wuids: ArrayVec<i64, PATCH_MEMBER_CAP>,
    pub key: i32,
    pub alg: i32,
    pub key_valid: bool,
}

impl PatchEntry {
    pub fn last_update_at(&self) -> Option<DateTime<Utc>> {
        epoch_to_utc(self.last_update)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchEvent {
    pub patch_count: usize,
    pub patches: Vec<PatchEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupAttachment {
    pub rid: i64,
    pub tg: i32,
    pub last_seen: i64,
}

impl GroupAttachment {
    pub fn last_seen_at(&self) -> Option<DateTime<Utc>> {
        epoch_to_utc(self.last_seen)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupAttachmentEvent {
    pub ga_count: usize,
    pub attachments: Vec<GroupAttachment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Affiliation {
    pub rid: i64,
    pub last_seen: i64,
}

impl Affiliation {
    pub fn last_seen_at(&self) -> Option<DateTime<Utc>> {
        epoch_to_utc(self.last_seen)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliationEvent {
    pub aff_count: usize,
    pub affiliations: Vec<Affiliation>,
}

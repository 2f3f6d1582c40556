//! Turns raw native callbacks into typed event records.
//!
//! Every count reported by the engine is authoritative. Parallel arrays are
//! read up to that count; missing arrays or short arrays yield defaults
//! (zero / false) rather than errors. Negative counts are treated as zero.

use arrayvec::ArrayVec;

use crate::models::events::{
    Affiliation, AffiliationEvent, CallEvent, CallEventType, EventKind, GroupAttachment,
    GroupAttachmentEvent, NetworkEvent, PatchEntry, PatchEvent, SignalEvent, SiteEvent,
    PATCH_MEMBER_CAP,
};
use crate::models::error::BridgeError;
use crate::traits::native_bridge::{NativeEvent, RawCall, RawPatchTable};

/// A native event decoded into its record type.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    Output(String),
    Call(CallEvent),
    Site(SiteEvent),
    Signal(SignalEvent),
    Network(NetworkEvent),
    Patch(PatchEvent),
    GroupAttachment(GroupAttachmentEvent),
    Affiliation(AffiliationEvent),
}

impl DecodedEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Output(_) => EventKind::Output,
            Self::Call(_) => EventKind::Call,
            Self::Site(_) => EventKind::Site,
            Self::Signal(_) => EventKind::Signal,
            Self::Network(_) => EventKind::Network,
            Self::Patch(_) => EventKind::Patch,
            Self::GroupAttachment(_) => EventKind::GroupAttachment,
            Self::Affiliation(_) => EventKind::Affiliation,
        }
    }

    /// JSON payload for hosts that forward records over a message channel.
    pub fn to_json(&self) -> Result<String, BridgeError> {
        let json = match self {
            Self::Output(line) => serde_json::to_string(line),
            Self::Call(e) => serde_json::to_string(e),
            Self::Site(e) => serde_json::to_string(e),
            Self::Signal(e) => serde_json::to_string(e),
            Self::Network(e) => serde_json::to_string(e),
            Self::Patch(e) => serde_json::to_string(e),
            Self::GroupAttachment(e) => serde_json::to_string(e),
            Self::Affiliation(e) => serde_json::to_string(e),
        };
        json.map_err(|e| {
            BridgeError::InvalidArgument(format!(
                "failed to serialize {} payload: {}",
                self.kind().channel_name(),
                e
            ))
        })
    }
}

pub fn decode(event: NativeEvent) -> DecodedEvent {
    match event {
        NativeEvent::Output(line) => DecodedEvent::Output(line),
        NativeEvent::Call(raw) => DecodedEvent::Call(decode_call(raw)),
        NativeEvent::Site {
            wacn,
            site_id,
            rfss_id,
            system_id,
            nac,
        } => DecodedEvent::Site(SiteEvent {
            wacn,
            site_id,
            rfss_id,
            system_id,
            nac,
        }),
        NativeEvent::Signal {
            tsbk_ok,
            tsbk_err,
            sync_type,
            has_carrier,
            has_sync,
        } => DecodedEvent::Signal(SignalEvent {
            tsbk_ok,
            tsbk_err,
            sync_type,
            has_carrier,
            has_sync,
        }),
        NativeEvent::Network {
            neighbor_count,
            neighbor_freqs,
            neighbor_last_seen,
        } => {
            let n = count(neighbor_count);
            DecodedEvent::Network(NetworkEvent {
                neighbor_count: n,
                neighbor_freqs: take_n(&neighbor_freqs, n),
                neighbor_last_seen: take_n(&neighbor_last_seen, n),
            })
        }
        NativeEvent::Patch(table) => DecodedEvent::Patch(decode_patches(&table)),
        NativeEvent::GroupAttachment {
            ga_count,
            rids,
            tgs,
            last_seen,
        } => {
            let n = count(ga_count);
            let attachments = (0..n)
                .map(|i| GroupAttachment {
                    rid: at(&rids, i),
                    tg: at(&tgs, i),
                    last_seen: at(&last_seen, i),
                })
                .collect();
            DecodedEvent::GroupAttachment(GroupAttachmentEvent {
                ga_count: n,
                attachments,
            })
        }
        NativeEvent::Affiliation {
            aff_count,
            rids,
            last_seen,
        } => {
            let n = count(aff_count);
            let affiliations = (0..n)
                .map(|i| Affiliation {
                    rid: at(&rids, i),
                    last_seen: at(&last_seen, i),
                })
                .collect();
            DecodedEvent::Affiliation(AffiliationEvent {
                aff_count: n,
                affiliations,
            })
        }
    }
}

fn decode_call(raw: RawCall) -> CallEvent {
    CallEvent {
        event_type: CallEventType::from_raw(raw.event_type),
        talkgroup: raw.talkgroup,
        source_id: raw.source_id,
        nac: raw.nac,
        call_type: raw.call_type,
        is_encrypted: raw.is_encrypted,
        is_emergency: raw.is_emergency,
        alg_name: raw.alg_name,
        slot: raw.slot,
        frequency: raw.frequency,
        system_name: raw.system_name,
        group_name: raw.group_name,
        source_name: raw.source_name,
    }
}

fn decode_patches(table: &RawPatchTable) -> PatchEvent {
    let n = count(table.patch_count);
    let patches = (0..n)
        .map(|i| {
            let wgid_count = count(at(&table.wgid_counts, i));
            let wuid_count = count(at(&table.wuid_counts, i));
            PatchEntry {
                sgid: at(&table.sgids, i),
                is_patch: at(&table.is_patch, i),
                active: at(&table.active, i),
                last_update: at(&table.last_update, i),
                wgid_count,
                wgids: members(&table.wgids, wgid_count, i),
                wuid_count,
                wuids: members(&table.wuids, wuid_count, i)
                    .into_iter()
                    .map(i64::from)
                    .collect(),
                key: at(&table.keys, i),
                alg: at(&table.algs, i),
                key_valid: at(&table.key_valid, i),
            }
        })
        .collect();

    PatchEvent {
        patch_count: n,
        patches,
    }
}

/// Members of entry `i` from a flat array with a fixed stride of
/// [`PATCH_MEMBER_CAP`]. Anything past the cap is lost.
fn members(flat: &Option<Vec<i32>>, n: usize, i: usize) -> ArrayVec<i32, PATCH_MEMBER_CAP> {
    let Some(flat) = flat.as_deref() else {
        return ArrayVec::new();
    };
    let base = i * PATCH_MEMBER_CAP;
    (0..n.min(PATCH_MEMBER_CAP))
        .filter_map(|j| flat.get(base + j).copied())
        .collect()
}

fn count(raw: i32) -> usize {
    raw.max(0) as usize
}

fn at<T: Copy + Default>(values: &Option<Vec<T>>, i: usize) -> T {
    values
        .as_deref()
        .and_then(|v| v.get(i))
        .copied()
        .unwrap_or_default()
}

fn take_n<T: Copy + Default>(values: &Option<Vec<T>>, n: usize) -> Vec<T> {
    (0..n).map(|i| at(values, i)).collect()
}

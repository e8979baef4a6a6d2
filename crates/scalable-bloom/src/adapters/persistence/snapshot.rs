//! Versioned snapshot codec
//!
//! ```text
//! +--------+---------+----------------------------+
//! | "SBF1" | version | bincode body               |
//! | 4 B    | u8      | v1: config, tiers, count   |
//! |        |         | v2: v1 + weighted_count    |
//! +--------+---------+----------------------------+
//! ```
//!
//! The decoder dispatches on the version byte. Version 1 bodies carry no
//! weighted count and decode with `weighted_count == None`.

use serde::{Deserialize, Serialize};

use crate::domain::{ControllerState, ScalableConfig, TierRecord, SCHEMA_V1, SCHEMA_V2};
use crate::error::SnapshotError;

/// Leading bytes of every snapshot
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"SBF1";

const HEADER_LEN: usize = SNAPSHOT_MAGIC.len() + 1;

#[derive(Serialize, Deserialize)]
struct SnapshotV1 {
    config: ScalableConfig,
    tiers: Vec<TierRecord>,
    count: u64,
}

#[derive(Serialize, Deserialize)]
struct SnapshotV2 {
    config: ScalableConfig,
    tiers: Vec<TierRecord>,
    count: u64,
    weighted_count: u64,
}

/// Encode controller state
///
/// State with a weighted count is written as version 2, state without one
/// as version 1.
pub fn encode_snapshot(state: &ControllerState) -> Result<Vec<u8>, SnapshotError> {
    let (version, body) = match state.weighted_count {
        Some(weighted_count) => (
            SCHEMA_V2,
            bincode::serialize(&SnapshotV2 {
                config: state.config.clone(),
                tiers: state.tiers.clone(),
                count: state.count,
                weighted_count,
            }),
        ),
        None => (
            SCHEMA_V1,
            bincode::serialize(&SnapshotV1 {
                config: state.config.clone(),
                tiers: state.tiers.clone(),
                count: state.count,
            }),
        ),
    };
    let body = body.map_err(|e| SnapshotError::Serialization(e.to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(SNAPSHOT_MAGIC);
    bytes.push(version);
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Version byte of an encoded snapshot
pub fn snapshot_version(bytes: &[u8]) -> Result<u8, SnapshotError> {
    if bytes.len() < HEADER_LEN {
        return Err(SnapshotError::DataFormat(format!(
            "snapshot is {} bytes, shorter than its header",
            bytes.len()
        )));
    }
    if &bytes[..SNAPSHOT_MAGIC.len()] != SNAPSHOT_MAGIC {
        return Err(SnapshotError::DataFormat(
            "missing snapshot magic".to_string(),
        ));
    }
    Ok(bytes[SNAPSHOT_MAGIC.len()])
}

/// Decode controller state from any supported snapshot version
pub fn decode_snapshot(bytes: &[u8]) -> Result<ControllerState, SnapshotError> {
    let version = snapshot_version(bytes)?;
    let body = &bytes[HEADER_LEN..];
    let corrupt = |e: bincode::Error| SnapshotError::DataFormat(e.to_string());

    match version {
        SCHEMA_V1 => {
            let snapshot: SnapshotV1 = bincode::deserialize(body).map_err(corrupt)?;
            Ok(ControllerState {
                config: snapshot.config,
                tiers: snapshot.tiers,
                count: snapshot.count,
                weighted_count: None,
            })
        }
        SCHEMA_V2 => {
            let snapshot: SnapshotV2 = bincode::deserialize(body).map_err(corrupt)?;
            Ok(ControllerState {
                config: snapshot.config,
                tiers: snapshot.tiers,
                count: snapshot.count,
                weighted_count: Some(snapshot.weighted_count),
            })
        }
        version => Err(SnapshotError::UnsupportedVersion { version }),
    }
}

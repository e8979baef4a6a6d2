//! Controller state as captured by snapshots

use serde::{Deserialize, Serialize};

use super::config::ScalableConfig;
use super::tier::TierParams;

/// One tier as persisted: sizing metadata plus the backend's opaque payload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TierRecord {
    pub params: TierParams,
    pub payload: Vec<u8>,
}

/// Full controller state
///
/// `weighted_count` is `None` when weighted tracking is inactive, either
/// because the controller runs schema version 1 or because the state was
/// decoded from a version 1 snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerState {
    pub config: ScalableConfig,
    pub tiers: Vec<TierRecord>,
    pub count: u64,
    pub weighted_count: Option<u64>,
}

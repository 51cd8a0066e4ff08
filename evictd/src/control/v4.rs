//! Protocol variant B: evicted stores reported as a structured config
//! object keyed by store id.

use super::{
    ControlError, EVICT_LEADER_SCHEDULER, SchedulerControl, is_scheduler_missing, query_stores,
    run_ctl, schedule_evict, stores_by_id, unschedule_evict,
};
use evict_core::Store;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

pub struct ControlV4 {
    ctl_address: String,
}

impl ControlV4 {
    pub fn new(ctl_address: impl Into<String>) -> Self {
        Self {
            ctl_address: ctl_address.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EvictLeaderConfig {
    /// Keys are store ids rendered as strings; values are key-range lists
    /// this engine has no use for.
    #[serde(rename = "store-id-ranges", default)]
    store_id_ranges: HashMap<String, serde_json::Value>,
}

impl SchedulerControl for ControlV4 {
    async fn list_stores(&self) -> Result<Vec<Store>, ControlError> {
        query_stores(&self.ctl_address).await
    }

    async fn list_evicted_stores(&self) -> Result<Vec<Store>, ControlError> {
        let output = run_ctl(
            &self.ctl_address,
            &["scheduler", "config", EVICT_LEADER_SCHEDULER],
        )
        .await?;
        debug!(output = %output, "pd-ctl scheduler config");
        if is_scheduler_missing(&output) {
            return Ok(Vec::new());
        }
        let config: EvictLeaderConfig =
            serde_json::from_str(&output).map_err(|source| ControlError::Parse {
                source,
                output: output.clone(),
            })?;
        let ids = evicted_store_ids(&config);
        stores_by_id(&self.ctl_address, &ids).await
    }

    async fn add_evict_scheduler(&self, store_id: u64) -> Result<(), ControlError> {
        schedule_evict(&self.ctl_address, store_id).await
    }

    async fn remove_evict_scheduler(&self, store_id: u64) -> Result<(), ControlError> {
        unschedule_evict(&self.ctl_address, store_id).await
    }
}

/// Store ids from the config keys, skipping anything unparsable.
fn evicted_store_ids(config: &EvictLeaderConfig) -> Vec<u64> {
    let mut ids: Vec<u64> = config
        .store_id_ranges
        .keys()
        .filter_map(|key| match key.parse::<u64>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(key = %key, "could not parse store id from scheduler config");
                None
            }
        })
        .collect();
    ids.sort_unstable();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_store_ids_from_config_keys() {
        let config: EvictLeaderConfig = serde_json::from_str(
            r#"{"store-id-ranges": {"1": [{"start-key": "", "end-key": ""}], "42": []}}"#,
        )
        .unwrap();
        assert_eq!(evicted_store_ids(&config), vec![1, 42]);
    }

    #[test]
    fn unparsable_keys_are_skipped_not_fatal() {
        let config: EvictLeaderConfig =
            serde_json::from_str(r#"{"store-id-ranges": {"seven": [], "3": []}}"#).unwrap();
        assert_eq!(evicted_store_ids(&config), vec![3]);
    }

    #[test]
    fn missing_ranges_field_yields_no_ids() {
        let config: EvictLeaderConfig = serde_json::from_str("{}").unwrap();
        assert!(evicted_store_ids(&config).is_empty());
    }
}

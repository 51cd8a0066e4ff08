//! Protocol variant A: evicted stores reported as scheduler-name strings.

use super::{
    ControlError, EVICT_LEADER_SCHEDULER, SchedulerControl, is_scheduler_missing, query_stores,
    run_ctl, schedule_evict, stores_by_id, unschedule_evict,
};
use evict_core::Store;
use tracing::{debug, warn};

pub struct ControlV3 {
    ctl_address: String,
}

impl ControlV3 {
    pub fn new(ctl_address: impl Into<String>) -> Self {
        Self {
            ctl_address: ctl_address.into(),
        }
    }
}

impl SchedulerControl for ControlV3 {
    async fn list_stores(&self) -> Result<Vec<Store>, ControlError> {
        query_stores(&self.ctl_address).await
    }

    async fn list_evicted_stores(&self) -> Result<Vec<Store>, ControlError> {
        let output = run_ctl(&self.ctl_address, &["scheduler", "show"]).await?;
        debug!(output = %output, "pd-ctl scheduler show");
        if is_scheduler_missing(&output) {
            return Ok(Vec::new());
        }
        let names: Vec<String> =
            serde_json::from_str(&output).map_err(|source| ControlError::Parse {
                source,
                output: output.clone(),
            })?;
        let ids = evicted_store_ids(&names);
        stores_by_id(&self.ctl_address, &ids).await
    }

    async fn add_evict_scheduler(&self, store_id: u64) -> Result<(), ControlError> {
        schedule_evict(&self.ctl_address, store_id).await
    }

    async fn remove_evict_scheduler(&self, store_id: u64) -> Result<(), ControlError> {
        unschedule_evict(&self.ctl_address, store_id).await
    }
}

/// Extract store ids from `evict-leader-scheduler-<id>` entries, skipping
/// other schedulers and anything unparsable.
fn evicted_store_ids(names: &[String]) -> Vec<u64> {
    names
        .iter()
        .filter(|name| name.contains(EVICT_LEADER_SCHEDULER))
        .filter_map(|name| {
            match name
                .rsplit_once('-')
                .and_then(|(_, id)| id.parse::<u64>().ok())
            {
                Some(id) => Some(id),
                None => {
                    warn!(scheduler = %name, "could not parse store id from scheduler name");
                    None
                }
            }
        })
        .collect()
}

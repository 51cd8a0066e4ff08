//! Eviction and recovery decision engine.
//!
//! Both selectors are pure over `(health map, cluster state)` snapshots:
//! they never query or mutate anything themselves. The control loop owns
//! the queries and actuates each selected store independently.

use crate::health::{HealthMap, NodeHealth};
use crate::store::Store;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The eviction cap is already reached. A hard safety valve: no new
    /// evictions are selected at all, never a partial batch.
    #[error("eviction cap reached: {evicted} stores already evicted, cap is {cap}")]
    CapExceeded { evicted: usize, cap: usize },
}

/// Select stores that should be newly evicted.
///
/// A store is a candidate when the host part of its address equals the
/// identity of a node verdicted Unhealthy. Stores already evicted (by id)
/// are excluded, so re-running on the same snapshot selects the same set
/// and never re-issues an applied action. Result order follows store id.
pub fn select_new_evictions(
    health: &HealthMap,
    all_stores: &[Store],
    currently_evicted: &[Store],
    max_evicted: usize,
) -> Result<Vec<Store>, EngineError> {
    if currently_evicted.len() >= max_evicted {
        return Err(EngineError::CapExceeded {
            evicted: currently_evicted.len(),
            cap: max_evicted,
        });
    }

    let evicted_ids: HashSet<u64> = currently_evicted.iter().map(|s| s.id).collect();
    let unhealthy: HashSet<&str> = health
        .iter()
        .filter(|(_, verdict)| **verdict == NodeHealth::Unhealthy)
        .map(|(node, _)| node.as_str())
        .collect();

    let mut selected: BTreeMap<u64, Store> = BTreeMap::new();
    for store in all_stores {
        if unhealthy.contains(store.host()) && !evicted_ids.contains(&store.id) {
            selected.entry(store.id).or_insert_with(|| store.clone());
        }
    }
    Ok(selected.into_values().collect())
}

/// Select evicted stores whose node has proven itself healthy again.
///
/// Recovery demands positive proof: the store's host must map to exactly
/// `Healthy`. A host absent from the map, or carrying any other verdict,
/// stays evicted. Shrinking the evicted set is always safe, so no cap
/// applies here.
pub fn select_new_recoveries(health: &HealthMap, currently_evicted: &[Store]) -> Vec<Store> {
    currently_evicted
        .iter()
        .filter(|store| health.get(store.host()) == Some(&NodeHealth::Healthy))
        .cloned()
        .collect()
}

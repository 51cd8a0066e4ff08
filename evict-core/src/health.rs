//! Per-node health classification from probe-link evaluations.
//!
//! Each link contributes one signal per cycle — bad, good, or
//! indeterminate — attributed to the node that originated the probe. A
//! configurable fuse threshold decides how many simultaneously-bad links it
//! takes before a node's verdict degrades from Unstable to Unhealthy.
//!
//! Verdicts are recomputed from a fresh metrics batch every cycle;
//! hysteresis comes entirely from the sustain windows inside the series
//! evaluation, never from carried state.

use crate::config::EvictorConfig;
use crate::series::{Link, TimeSeries};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Health verdict for one node in one classification cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeHealth {
    Healthy,
    Unstable,
    Unhealthy,
}

impl std::fmt::Display for NodeHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Unstable => write!(f, "unstable"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Node identity → verdict for one cycle. Nodes that originated no probe
/// links this cycle are absent: no signal means no verdict, and no verdict
/// means neither eviction nor recovery will touch the node.
pub type HealthMap = BTreeMap<String, NodeHealth>;

#[derive(Debug, Default)]
struct LinkTally {
    bad: u32,
    good: u32,
    indeterminate: u32,
}

/// Classify every node that originated at least one link in `metrics`.
///
/// A link is *bad* when its latency has stayed above the threshold for
/// `pending_for_evict`, *good* when it has stayed below for
/// `pending_for_recover`, and *indeterminate* otherwise (including series
/// too short to judge). Precedence per node: Unhealthy dominates Unstable
/// dominates Healthy — a healthy link never launders a node that also has
/// a bad or indeterminate one.
pub fn classify_nodes(metrics: &HashMap<Link, TimeSeries>, config: &EvictorConfig) -> HealthMap {
    let mut tallies: BTreeMap<&str, LinkTally> = BTreeMap::new();

    for (link, series) in metrics {
        let tally = tallies.entry(link.from.as_str()).or_default();
        if series.sustained_above(config.threshold, config.pending_for_evict) {
            tally.bad += 1;
        } else if series.sustained_below(config.threshold, config.pending_for_recover) {
            tally.good += 1;
        } else {
            tally.indeterminate += 1;
        }
    }

    let fuse = config.bad_link_fuse.max(1);
    tallies
        .into_iter()
        .map(|(node, tally)| {
            let verdict = if tally.bad >= fuse {
                NodeHealth::Unhealthy
            } else if tally.bad > 0 || tally.indeterminate > 0 {
                NodeHealth::Unstable
            } else {
                debug_assert!(tally.good > 0);
                NodeHealth::Healthy
            };
            (node.to_string(), verdict)
        })
        .collect()
}

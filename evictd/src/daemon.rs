//! The control loop: fetch, classify, decide, actuate, on a fixed timer.
//!
//! Each tick rebuilds its entire picture of the world — metrics batch,
//! member list, evicted set — from the collaborators, so external or
//! manual changes and process restarts are absorbed automatically.
//! Failures are isolated at the boundary that produced them: a metrics
//! failure skips the whole tick, a control-plane listing failure skips
//! only the dependent decision, and a single store's actuation failure
//! never blocks the rest. Nothing here terminates the process.

use crate::control::SchedulerControl;
use crate::metrics::{MetricsClient, MetricsError};
use evict_core::{
    EngineError, EvictorConfig, HealthMap, classify_nodes, select_new_evictions,
    select_new_recoveries,
};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub struct Evictor<C> {
    config: EvictorConfig,
    metrics: MetricsClient,
    control: C,
}

impl<C: SchedulerControl> Evictor<C> {
    pub fn new(config: EvictorConfig, metrics: MetricsClient, control: C) -> Self {
        Self {
            config,
            metrics,
            control,
        }
    }

    /// Run until the shutdown signal flips. Cancellation is observed only
    /// between ticks: an in-flight tick always completes its actuation
    /// sequence so the control plane is never left half-mutated.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; consume it so each cycle
        // below is followed by a full interval.
        ticker.tick().await;
        info!(interval = ?self.config.interval, "evictor loop started");

        loop {
            if let Err(err) = self.run_once().await {
                error!(error = %err, "failed to fetch metrics; no actions taken this tick");
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    info!("evictor exiting");
                    return;
                }
            }
        }
    }

    /// One full cycle. Only a metrics failure aborts it; everything
    /// downstream degrades per decision or per store.
    async fn run_once(&self) -> Result<(), MetricsError> {
        let window = self.config.required_max_time_range();
        let batch = self.metrics.fetch_latency_series(window).await?;
        if batch.is_empty() {
            warn!("metrics backend returned no probe latency series");
        }

        let health = classify_nodes(&batch, &self.config);
        debug!(health = ?health, "node health verdicts");

        self.apply_evictions(&health).await;
        self.apply_recoveries(&health).await;
        Ok(())
    }

    async fn apply_evictions(&self, health: &HealthMap) {
        let all_stores = match self.control.list_stores().await {
            Ok(stores) => stores,
            Err(err) => {
                error!(error = %err, "failed to list stores; skipping eviction decisions this tick");
                return;
            }
        };
        let evicted = match self.control.list_evicted_stores().await {
            Ok(stores) => stores,
            Err(err) => {
                error!(error = %err, "failed to list evicted stores; skipping eviction decisions this tick");
                return;
            }
        };

        let new_evictions = match select_new_evictions(
            health,
            &all_stores,
            &evicted,
            self.config.max_evicted,
        ) {
            Ok(stores) => stores,
            Err(err @ EngineError::CapExceeded { .. }) => {
                warn!(error = %err, already_evicted = ?evicted, "no new evictions this tick");
                return;
            }
        };
        if new_evictions.is_empty() {
            debug!(already_evicted = evicted.len(), "no new stores to evict");
            return;
        }
        info!(already_evicted = ?evicted, new_to_evict = ?new_evictions, "selected stores for eviction");

        for store in new_evictions {
            match self.control.add_evict_scheduler(store.id).await {
                Ok(()) => info!(%store, "store leadership evicted"),
                Err(err) => error!(%store, error = %err, "failed to evict store"),
            }
        }
    }

    async fn apply_recoveries(&self, health: &HealthMap) {
        let evicted = match self.control.list_evicted_stores().await {
            Ok(stores) => stores,
            Err(err) => {
                error!(error = %err, "failed to list evicted stores; skipping recovery decisions this tick");
                return;
            }
        };

        let recoveries = select_new_recoveries(health, &evicted);
        if recoveries.is_empty() {
            debug!(already_evicted = evicted.len(), "no stores to recover");
            return;
        }
        info!(already_evicted = ?evicted, new_to_recover = ?recoveries, "selected stores for recovery");

        for store in recoveries {
            match self.control.remove_evict_scheduler(store.id).await {
                Ok(()) => info!(%store, "store leadership recovered"),
                Err(err) => error!(%store, error = %err, "failed to recover store"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlError;
    use evict_core::{ControlVersion, NodeHealth, Store};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted control plane recording the mutations it receives.
    #[derive(Default)]
    struct MockControl {
        stores: Vec<Store>,
        evicted: Vec<Store>,
        fail_list_stores: bool,
        fail_list_evicted: bool,
        fail_mutations: bool,
        added: Mutex<Vec<u64>>,
        removed: Mutex<Vec<u64>>,
    }

    fn rejected() -> ControlError {
        ControlError::CommandRejected {
            output: "mock failure".to_string(),
        }
    }

    impl SchedulerControl for MockControl {
        async fn list_stores(&self) -> Result<Vec<Store>, ControlError> {
            if self.fail_list_stores {
                return Err(rejected());
            }
            Ok(self.stores.clone())
        }

        async fn list_evicted_stores(&self) -> Result<Vec<Store>, ControlError> {
            if self.fail_list_evicted {
                return Err(rejected());
            }
            Ok(self.evicted.clone())
        }

        async fn add_evict_scheduler(&self, store_id: u64) -> Result<(), ControlError> {
            if self.fail_mutations {
                return Err(rejected());
            }
            self.added.lock().unwrap().push(store_id);
            Ok(())
        }

        async fn remove_evict_scheduler(&self, store_id: u64) -> Result<(), ControlError> {
            if self.fail_mutations {
                return Err(rejected());
            }
            self.removed.lock().unwrap().push(store_id);
            Ok(())
        }
    }

    fn test_config() -> EvictorConfig {
        EvictorConfig {
            metrics_address: "http://localhost:9090".to_string(),
            control_address: "http://localhost:2379".to_string(),
            control_version: ControlVersion::V3,
            max_evicted: 3,
            interval: Duration::from_secs(15),
            threshold: Duration::from_secs(1),
            pending_for_evict: Duration::from_secs(60),
            pending_for_recover: Duration::from_secs(30),
            bad_link_fuse: 1,
        }
    }

    fn evictor(control: MockControl) -> Evictor<MockControl> {
        Evictor::new(
            test_config(),
            MetricsClient::new("http://localhost:9090"),
            control,
        )
    }

    fn health(entries: &[(&str, NodeHealth)]) -> HealthMap {
        entries
            .iter()
            .map(|(node, verdict)| (node.to_string(), *verdict))
            .collect()
    }

    #[tokio::test]
    async fn unhealthy_node_triggers_one_eviction() {
        let evictor = evictor(MockControl {
            stores: vec![
                Store::new(1, "10.0.0.5:20160"),
                Store::new(2, "10.0.0.6:20160"),
            ],
            ..Default::default()
        });
        evictor
            .apply_evictions(&health(&[("10.0.0.5", NodeHealth::Unhealthy)]))
            .await;
        assert_eq!(*evictor.control.added.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn cap_reached_issues_no_mutations() {
        let evictor = evictor(MockControl {
            stores: vec![Store::new(9, "10.0.0.9:20160")],
            evicted: vec![
                Store::new(1, "10.0.1.1:20160"),
                Store::new(2, "10.0.1.2:20160"),
                Store::new(3, "10.0.1.3:20160"),
            ],
            ..Default::default()
        });
        evictor
            .apply_evictions(&health(&[("10.0.0.9", NodeHealth::Unhealthy)]))
            .await;
        assert!(evictor.control.added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_listing_failure_does_not_block_recovery() {
        let evictor = evictor(MockControl {
            evicted: vec![Store::new(4, "10.0.0.4:20160")],
            fail_list_stores: true,
            ..Default::default()
        });
        let map = health(&[("10.0.0.4", NodeHealth::Healthy)]);
        evictor.apply_evictions(&map).await;
        evictor.apply_recoveries(&map).await;
        assert!(evictor.control.added.lock().unwrap().is_empty());
        assert_eq!(*evictor.control.removed.lock().unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn evicted_listing_failure_skips_recovery_only() {
        let evictor = evictor(MockControl {
            stores: vec![Store::new(4, "10.0.0.4:20160")],
            fail_list_evicted: true,
            ..Default::default()
        });
        let map = health(&[("10.0.0.4", NodeHealth::Healthy)]);
        evictor.apply_recoveries(&map).await;
        assert!(evictor.control.removed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn healthy_evicted_store_is_recovered() {
        let evictor = evictor(MockControl {
            evicted: vec![
                Store::new(1, "10.0.0.5:20160"),
                Store::new(2, "10.0.0.6:20160"),
            ],
            ..Default::default()
        });
        evictor
            .apply_recoveries(&health(&[
                ("10.0.0.5", NodeHealth::Healthy),
                ("10.0.0.6", NodeHealth::Unstable),
            ]))
            .await;
        assert_eq!(*evictor.control.removed.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn recovery_needs_positive_proof() {
        let evictor = evictor(MockControl {
            evicted: vec![Store::new(1, "10.0.0.5:20160")],
            ..Default::default()
        });
        // Host absent from the health map entirely.
        evictor.apply_recoveries(&HealthMap::new()).await;
        assert!(evictor.control.removed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn already_evicted_store_is_not_evicted_again() {
        let evictor = evictor(MockControl {
            stores: vec![
                Store::new(1, "10.0.0.5:20160"),
                Store::new(2, "10.0.0.6:20160"),
            ],
            evicted: vec![Store::new(1, "10.0.0.5:20160")],
            ..Default::default()
        });
        evictor
            .apply_evictions(&health(&[
                ("10.0.0.5", NodeHealth::Unhealthy),
                ("10.0.0.6", NodeHealth::Unhealthy),
            ]))
            .await;
        assert_eq!(*evictor.control.added.lock().unwrap(), vec![2]);
    }
}

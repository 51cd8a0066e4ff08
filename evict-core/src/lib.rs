//! Core decision engine for latency-driven leader eviction.
//!
//! Turns per-link latency time series into per-node health verdicts and
//! those verdicts into a bounded, idempotent set of evict/recover actions.
//! Everything here is pure and recomputed from scratch every control-loop
//! tick; no state survives between cycles.

pub mod config;
pub mod engine;
pub mod health;
pub mod series;
pub mod store;

pub use config::{ConfigError, ControlVersion, EvictorConfig};
pub use engine::{EngineError, select_new_evictions, select_new_recoveries};
pub use health::{HealthMap, NodeHealth, classify_nodes};
pub use series::{Link, Sample, TimeSeries};
pub use store::Store;

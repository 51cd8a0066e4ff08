//! Control-plane adapter: leadership eviction through `pd-ctl`.
//!
//! Two protocol variants exist for two control-plane releases; they share
//! the store listing and mutation commands and differ only in how the set
//! of currently-evicted stores is reported. The variant is chosen once at
//! startup, never mid-run.

mod v3;
mod v4;

pub use v3::ControlV3;
pub use v4::ControlV4;

use evict_core::Store;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

const CTL_BINARY: &str = "pd-ctl";
const EVICT_LEADER_SCHEDULER: &str = "evict-leader-scheduler";

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("failed to run {CTL_BINARY}: {0}")]
    Exec(#[from] std::io::Error),
    #[error("{CTL_BINARY} exited with {status}: {output}")]
    CommandFailed {
        status: std::process::ExitStatus,
        output: String,
    },
    /// The command exited zero but its payload did not acknowledge the
    /// mutation. Distinct from transport failure so the loop can tell a
    /// rejected request from an unreachable control plane.
    #[error("{CTL_BINARY} rejected the request: {output}")]
    CommandRejected { output: String },
    #[error("failed to parse {CTL_BINARY} output: {source}; output: {output}")]
    Parse {
        source: serde_json::Error,
        output: String,
    },
}

/// Query and mutation surface of the cluster control plane.
#[allow(async_fn_in_trait)]
pub trait SchedulerControl {
    /// All cluster members.
    async fn list_stores(&self) -> Result<Vec<Store>, ControlError>;
    /// Members currently under leadership eviction. A control plane with
    /// no eviction scheduler configured reports an empty list.
    async fn list_evicted_stores(&self) -> Result<Vec<Store>, ControlError>;
    /// Idempotently request leadership eviction for a member.
    async fn add_evict_scheduler(&self, store_id: u64) -> Result<(), ControlError>;
    /// Idempotently withdraw a leadership eviction.
    async fn remove_evict_scheduler(&self, store_id: u64) -> Result<(), ControlError>;
}

/// Run `pd-ctl -u <addr> <args..>` and return its combined output.
async fn run_ctl(ctl_address: &str, args: &[&str]) -> Result<String, ControlError> {
    let output = Command::new(CTL_BINARY)
        .arg("-u")
        .arg(ctl_address)
        .args(args)
        .output()
        .await?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    if !output.status.success() {
        return Err(ControlError::CommandFailed {
            status: output.status,
            output: text,
        });
    }
    Ok(text)
}

/// Mutations print `Success` on acceptance; anything else is a rejection
/// even on a zero exit status.
fn ensure_mutation_success(output: String) -> Result<(), ControlError> {
    if output.contains("Success") {
        Ok(())
    } else {
        Err(ControlError::CommandRejected { output })
    }
}

/// A control plane without the eviction scheduler configured answers with
/// a not-found page instead of JSON.
fn is_scheduler_missing(output: &str) -> bool {
    output.contains("404")
}

#[derive(Debug, Deserialize)]
struct StoreList {
    #[serde(default)]
    stores: Vec<StoreEntry>,
}

#[derive(Debug, Deserialize)]
struct StoreEntry {
    store: Store,
}

fn parse_stores(output: &str) -> Result<Vec<Store>, ControlError> {
    let list: StoreList = serde_json::from_str(output).map_err(|source| ControlError::Parse {
        source,
        output: output.to_string(),
    })?;
    Ok(list.stores.into_iter().map(|entry| entry.store).collect())
}

async fn query_stores(ctl_address: &str) -> Result<Vec<Store>, ControlError> {
    let output = run_ctl(ctl_address, &["store"]).await?;
    debug!(output = %output, "pd-ctl store");
    parse_stores(&output)
}

/// Resolve evicted store ids to full members via the store listing.
async fn stores_by_id(ctl_address: &str, ids: &[u64]) -> Result<Vec<Store>, ControlError> {
    let stores = query_stores(ctl_address).await?;
    Ok(stores
        .into_iter()
        .filter(|store| ids.contains(&store.id))
        .collect())
}

async fn schedule_evict(ctl_address: &str, store_id: u64) -> Result<(), ControlError> {
    info!(
        command = %format!(
            "{CTL_BINARY} -u {ctl_address} scheduler add {EVICT_LEADER_SCHEDULER} {store_id}"
        ),
        "adding evict-leader scheduler"
    );
    let output = run_ctl(
        ctl_address,
        &["scheduler", "add", EVICT_LEADER_SCHEDULER, &store_id.to_string()],
    )
    .await?;
    debug!(output = %output, "pd-ctl scheduler add");
    ensure_mutation_success(output)
}

async fn unschedule_evict(ctl_address: &str, store_id: u64) -> Result<(), ControlError> {
    let scheduler = format!("{EVICT_LEADER_SCHEDULER}-{store_id}");
    info!(
        command = %format!("{CTL_BINARY} -u {ctl_address} scheduler remove {scheduler}"),
        "removing evict-leader scheduler"
    );
    let output = run_ctl(ctl_address, &["scheduler", "remove", &scheduler]).await?;
    debug!(output = %output, "pd-ctl scheduler remove");
    ensure_mutation_success(output)
}

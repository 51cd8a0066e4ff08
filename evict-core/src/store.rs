//! Cluster member identity.

use serde::{Deserialize, Serialize};

/// A member of the storage cluster, as reported by the control plane.
///
/// Never cached across cycles; the control plane is re-queried every tick
/// so external or manual eviction changes are always observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub id: u64,
    /// Network address, `host` or `host:port`.
    pub address: String,
}

impl Store {
    pub fn new(id: u64, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }

    /// The bare host part of the address.
    ///
    /// Strips a trailing `:port` only when the suffix is all digits, so
    /// addresses without a port pass through unchanged. Matching on the
    /// parsed host (rather than substring containment) prevents one host
    /// identity that happens to be a prefix of another from matching it.
    pub fn host(&self) -> &str {
        match self.address.rsplit_once(':') {
            Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
                host
            }
            _ => &self.address,
        }
    }
}

impl std::fmt::Display for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "store {} ({})", self.id, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_strips_trailing_port() {
        assert_eq!(Store::new(1, "10.0.0.5:20160").host(), "10.0.0.5");
    }

    #[test]
    fn host_without_port_is_unchanged() {
        assert_eq!(Store::new(1, "10.0.0.5").host(), "10.0.0.5");
    }

    #[test]
    fn non_numeric_suffix_is_not_a_port() {
        assert_eq!(Store::new(1, "tikv:node").host(), "tikv:node");
    }

    #[test]
    fn hostname_addresses_work() {
        assert_eq!(Store::new(1, "tikv-2.cluster.local:20160").host(), "tikv-2.cluster.local");
    }
}

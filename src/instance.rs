//! Uniform instance types returned across all providers.
//!
//! [`InstanceState`] is the provider-facing snapshot shape; an
//! [`InstanceRecord`] extends it with the orchestration context attached on
//! the creation path. Records are transient return values: the core never
//! stores them, and callers own persistence and eventual destruction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Snapshot of provider-reported instance state.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct InstanceState {
    /// Provider-assigned identifier; opaque, provider-specific format.
    pub id: String,
    /// Reachable address; empty while unassigned.
    pub address: String,
    /// Provider-specific auxiliary state, carried for diagnostics only and
    /// never interpreted by the core.
    #[serde(default)]
    pub aux: Map<String, Value>,
}

impl InstanceState {
    /// Creates a snapshot with an empty auxiliary map.
    #[must_use]
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            aux: Map::new(),
        }
    }

    /// Returns true when the provider has assigned a reachable address.
    #[must_use]
    pub fn has_address(&self) -> bool {
        !self.address.is_empty()
    }
}

/// Uniform result of a successful creation, combining the provider snapshot
/// with the orchestration context needed for caller-side tracking.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct InstanceRecord {
    /// Name of the provider that satisfied the request.
    pub provider: String,
    /// Logical image type the caller asked for.
    pub image_type: String,
    /// Provider-assigned instance identifier; never empty on the creation
    /// path.
    pub id: String,
    /// Reachable address assigned by the provider.
    pub address: String,
    /// Provider-specific auxiliary state, diagnostics only.
    #[serde(default)]
    pub aux: Map<String, Value>,
    /// Creation timestamp, seconds since the Unix epoch.
    pub created_at: u64,
    /// Effective time-to-live in seconds.
    pub ttl_secs: u64,
    /// SSH public key supplied by the caller at creation.
    pub ssh_public_key: String,
}

impl InstanceRecord {
    /// Builds a record from a provider snapshot and orchestration context.
    #[must_use]
    pub fn from_state(
        state: InstanceState,
        provider: impl Into<String>,
        image_type: impl Into<String>,
        created_at: u64,
        ttl_secs: u64,
        ssh_public_key: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            image_type: image_type.into(),
            id: state.id,
            address: state.address,
            aux: state.aux,
            created_at,
            ttl_secs,
            ssh_public_key: ssh_public_key.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_address_is_false_for_empty_string() {
        let state = InstanceState::new("id-1", "");
        assert!(!state.has_address());
    }

    #[test]
    fn record_carries_snapshot_fields() {
        let mut state = InstanceState::new("id-1", "198.51.100.7");
        state
            .aux
            .insert(String::from("zone"), Value::String(String::from("fr-par-1")));
        let record =
            InstanceRecord::from_state(state, "scaleway", "ubuntu-22-small", 1_000, 3_600, "key");
        assert_eq!(record.id, "id-1");
        assert_eq!(record.address, "198.51.100.7");
        assert_eq!(record.provider, "scaleway");
        assert_eq!(
            record.aux.get("zone"),
            Some(&Value::String(String::from("fr-par-1")))
        );
    }
}

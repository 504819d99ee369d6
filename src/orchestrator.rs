//! Stateless orchestration entry points over the provider registry.
//!
//! The orchestrator owns the two read-only structures built at start: the
//! routing table and the registry of live provider handles. Every call is
//! independent; callers may issue concurrent creations and compose them
//! externally. Nothing about a created instance is retained here — the
//! returned record is the caller's to persist, track, and eventually
//! destroy.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use crate::expiry::unix_now;
use crate::instance::{InstanceRecord, InstanceState};
use crate::provider::{CreateSpec, Provider, ProviderError};
use crate::routing::{CandidateMapping, RoutingTable};
use crate::select::{SelectError, select};

/// Errors surfaced by orchestration entry points.
#[derive(Debug, Error)]
pub enum OrchestrateError {
    /// Raised when no routing entry exists for the requested image type.
    /// Never retried.
    #[error("unknown image type '{image_type}'")]
    UnknownImageType {
        /// Logical image type that has no routing entry.
        image_type: String,
    },
    /// Raised when routing entries exist but none reference a registered
    /// provider. Never retried.
    #[error("no registered provider can satisfy image type '{image_type}'")]
    NoAvailableProvider {
        /// Logical image type being resolved.
        image_type: String,
    },
    /// Raised when a caller references a provider name absent from the
    /// registry.
    #[error("provider '{provider}' is not registered")]
    ProviderUnavailable {
        /// Provider name the caller supplied.
        provider: String,
    },
    /// Raised when the underlying vendor call fails; propagated verbatim
    /// with provider context attached.
    #[error("provider '{provider}' operation failed: {source}")]
    ProviderOperationFailed {
        /// Provider that raised the failure.
        provider: String,
        /// Underlying adapter error.
        #[source]
        source: ProviderError,
    },
    /// Raised when a created instance never reported ready within the poll
    /// budget. The stranded resource is NOT destroyed here; the caller owns
    /// cleanup.
    #[error(
        "instance {instance_id} on provider '{provider}' not ready after {attempts} status checks"
    )]
    ReadinessTimeout {
        /// Provider that created the instance.
        provider: String,
        /// Identifier of the stranded instance.
        instance_id: String,
        /// Number of describe invocations performed.
        attempts: u32,
    },
}

impl From<SelectError> for OrchestrateError {
    fn from(value: SelectError) -> Self {
        match value {
            SelectError::NoAvailableProvider { image_type } => {
                Self::NoAvailableProvider { image_type }
            }
        }
    }
}

/// Builder collecting provider registrations before construction.
#[derive(Default)]
pub struct OrchestratorBuilder {
    routing: RoutingTable,
    registry: BTreeMap<String, Arc<dyn Provider>>,
}

impl OrchestratorBuilder {
    /// Creates a builder with an empty registry and routing table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the routing table.
    #[must_use]
    pub fn routing(mut self, table: RoutingTable) -> Self {
        self.routing = table;
        self
    }

    /// Registers a provider handle under the given name. The last
    /// registration for a name wins.
    #[must_use]
    pub fn register(mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        self.registry.insert(name.into(), provider);
        self
    }

    /// Finalizes the orchestrator. The registry and routing table are
    /// immutable afterwards.
    #[must_use]
    pub fn build(self) -> Orchestrator {
        Orchestrator {
            routing: self.routing,
            registry: self.registry,
        }
    }
}

/// Stateless orchestration layer over registered cloud providers.
pub struct Orchestrator {
    routing: RoutingTable,
    registry: BTreeMap<String, Arc<dyn Provider>>,
}

impl Orchestrator {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Creates an instance for a logical image type.
    ///
    /// Resolves the candidate list, runs selection (honouring
    /// `preferred_provider` when satisfiable), invokes the bound provider's
    /// create primitive, and returns the extended record once the instance
    /// is reachable. The provider adapter performs its own readiness poll;
    /// a timeout there surfaces as [`OrchestrateError::ReadinessTimeout`]
    /// and leaves the resource in place for the caller to clean up.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrateError::UnknownImageType`] when the image type
    /// has no routing entry, [`OrchestrateError::NoAvailableProvider`] when
    /// no candidate's provider is registered, and the remaining taxonomy
    /// for provider-side failures.
    pub async fn create_instance(
        &self,
        image_type: &str,
        ssh_public_key: &str,
        init_script: Option<&str>,
        preferred_provider: Option<&str>,
    ) -> Result<InstanceRecord, OrchestrateError> {
        let candidates = self.routing.candidates(image_type).ok_or_else(|| {
            OrchestrateError::UnknownImageType {
                image_type: image_type.to_owned(),
            }
        })?;

        let registered = self.registered_names();
        let candidate = select(image_type, candidates, &registered, preferred_provider)?;
        tracing::info!(
            image_type,
            provider = %candidate.provider,
            priority = candidate.priority,
            "candidate selected"
        );

        let provider = self.provider_handle(&candidate.provider)?;
        let spec = CreateSpec::builder()
            .image(&candidate.image)
            .size(&candidate.size)
            .ssh_public_key(ssh_public_key)
            .init_script(init_script.map(str::to_owned))
            .build()
            .map_err(|err| Self::map_provider_error(&candidate.provider, err))?;

        let state = provider
            .create(&spec)
            .await
            .map_err(|err| Self::map_provider_error(&candidate.provider, err))?;

        Ok(InstanceRecord::from_state(
            state,
            candidate.provider.clone(),
            image_type,
            unix_now(),
            candidate.effective_ttl(),
            ssh_public_key,
        ))
    }

    /// Destroys an instance on the named provider.
    ///
    /// Adapters treat an already-absent resource as success, so destroying
    /// twice is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrateError::ProviderUnavailable`] when the provider
    /// name is not registered and
    /// [`OrchestrateError::ProviderOperationFailed`] when the vendor call
    /// fails.
    pub async fn destroy_instance(
        &self,
        provider_name: &str,
        instance_id: &str,
    ) -> Result<(), OrchestrateError> {
        let provider = self.provider_handle(provider_name)?;
        tracing::info!(provider = provider_name, instance_id, "destroying instance");
        provider
            .destroy(instance_id)
            .await
            .map_err(|err| Self::map_provider_error(provider_name, err))
    }

    /// Describes an instance on the named provider.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrateError::ProviderUnavailable`] when the provider
    /// name is not registered and
    /// [`OrchestrateError::ProviderOperationFailed`] when the vendor call
    /// fails (including not-found).
    pub async fn get_instance(
        &self,
        provider_name: &str,
        instance_id: &str,
    ) -> Result<InstanceState, OrchestrateError> {
        let provider = self.provider_handle(provider_name)?;
        provider
            .describe(instance_id)
            .await
            .map_err(|err| Self::map_provider_error(provider_name, err))
    }

    /// Lists the known logical image types in sorted order.
    #[must_use]
    pub fn image_types(&self) -> Vec<&str> {
        self.routing.image_types()
    }

    /// Lists the registered provider names in sorted order.
    #[must_use]
    pub fn provider_names(&self) -> Vec<&str> {
        self.registry.keys().map(String::as_str).collect()
    }

    /// Returns the candidate mappings for a logical image type, or `None`
    /// when the type has no routing entry.
    #[must_use]
    pub fn candidates_for(&self, image_type: &str) -> Option<&[CandidateMapping]> {
        self.routing.candidates(image_type)
    }

    fn registered_names(&self) -> BTreeSet<String> {
        self.registry.keys().cloned().collect()
    }

    fn provider_handle(&self, name: &str) -> Result<&Arc<dyn Provider>, OrchestrateError> {
        self.registry
            .get(name)
            .ok_or_else(|| OrchestrateError::ProviderUnavailable {
                provider: name.to_owned(),
            })
    }

    fn map_provider_error(provider: &str, err: ProviderError) -> OrchestrateError {
        match err {
            ProviderError::NotReady {
                instance_id,
                attempts,
            } => OrchestrateError::ReadinessTimeout {
                provider: provider.to_owned(),
                instance_id,
                attempts,
            },
            other => OrchestrateError::ProviderOperationFailed {
                provider: provider.to_owned(),
                source: other,
            },
        }
    }
}

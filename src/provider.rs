//! Provider abstraction for short-lived virtual machine lifecycles.
//!
//! Every cloud vendor is represented by one implementation of [`Provider`]:
//! a flat capability set of create, destroy, and describe. Adapters run
//! their own readiness poll inside `create`, so a successful creation
//! always carries a reachable address.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::instance::InstanceState;

/// Parameters required to create a new instance on a provider.
///
/// The image and size identifiers are provider-native values taken from a
/// resolved [`crate::routing::CandidateMapping`]; the orchestration layer
/// never interprets them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateSpec {
    /// Provider-native image identifier.
    pub image: String,
    /// Provider-native size or commercial type identifier.
    pub size: String,
    /// SSH public key installed on the instance before first boot.
    pub ssh_public_key: String,
    /// Optional initialization payload (typically cloud-init user-data).
    pub init_script: Option<String>,
}

impl CreateSpec {
    /// Starts a builder for a [`CreateSpec`].
    #[must_use]
    pub fn builder() -> CreateSpecBuilder {
        CreateSpecBuilder::new()
    }

    /// Validates the spec, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] when any required string field
    /// is empty.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.image.is_empty() {
            return Err(ProviderError::Validation(String::from("image")));
        }
        if self.size.is_empty() {
            return Err(ProviderError::Validation(String::from("size")));
        }
        if self.ssh_public_key.is_empty() {
            return Err(ProviderError::Validation(String::from("ssh_public_key")));
        }
        Ok(())
    }
}

/// Builder for [`CreateSpec`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CreateSpecBuilder {
    image: String,
    size: String,
    ssh_public_key: String,
    init_script: Option<String>,
}

impl CreateSpecBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the provider-native image identifier.
    #[must_use]
    pub fn image(mut self, value: impl Into<String>) -> Self {
        self.image = value.into();
        self
    }

    /// Sets the provider-native size identifier.
    #[must_use]
    pub fn size(mut self, value: impl Into<String>) -> Self {
        self.size = value.into();
        self
    }

    /// Sets the SSH public key.
    #[must_use]
    pub fn ssh_public_key(mut self, value: impl Into<String>) -> Self {
        self.ssh_public_key = value.into();
        self
    }

    /// Sets the optional initialization payload.
    #[must_use]
    pub fn init_script(mut self, value: Option<String>) -> Self {
        self.init_script = value;
        self
    }

    /// Builds and validates the [`CreateSpec`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] when any required field is
    /// empty.
    pub fn build(self) -> Result<CreateSpec, ProviderError> {
        let spec = CreateSpec {
            image: self.image.trim().to_owned(),
            size: self.size.trim().to_owned(),
            ssh_public_key: self.ssh_public_key.trim().to_owned(),
            init_script: self.init_script,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Errors raised by provider adapters.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ProviderError {
    /// Raised when a create spec is missing a required field.
    #[error("invalid create spec: missing {0}")]
    Validation(String),
    /// Raised when the referenced instance does not exist on the provider.
    #[error("instance {instance_id} not found")]
    NotFound {
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Raised when an instance never reports ready within the poll budget.
    #[error("instance {instance_id} not ready after {attempts} status checks")]
    NotReady {
        /// Provider instance identifier.
        instance_id: String,
        /// Number of describe invocations performed.
        attempts: u32,
    },
    /// Wrapper for vendor control-plane failures (auth, quota, validation,
    /// transport).
    #[error("provider api error: {message}")]
    Api {
        /// Message returned by the vendor API or transport layer.
        message: String,
    },
}

impl ProviderError {
    /// Wraps an arbitrary vendor or transport failure.
    #[must_use]
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }
}

/// Future returned by provider operations.
pub type ProviderFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Minimal interface implemented by cloud provider adapters.
///
/// Implementations must be independently idempotent-ish: `destroy` succeeds
/// when the resource is already gone, and any provider-side setup performed
/// during `create` (for example ensuring an SSH credential object exists)
/// tolerates "already exists" races.
pub trait Provider: Send + Sync {
    /// Creates a new instance and blocks until it is verifiably reachable.
    ///
    /// The returned snapshot always carries a non-empty identifier and a
    /// non-empty address; an instance that never gains an address surfaces
    /// as [`ProviderError::NotReady`].
    fn create<'a>(&'a self, spec: &'a CreateSpec) -> ProviderFuture<'a, InstanceState>;

    /// Destroys the instance. Succeeds as a no-op when the resource no
    /// longer exists.
    fn destroy<'a>(&'a self, instance_id: &'a str) -> ProviderFuture<'a, ()>;

    /// Describes the instance, failing with [`ProviderError::NotFound`] when
    /// it does not exist.
    fn describe<'a>(&'a self, instance_id: &'a str) -> ProviderFuture<'a, InstanceState>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_trims_and_validates() {
        let spec = CreateSpec::builder()
            .image("  ubuntu-noble  ")
            .size("DEV1-S")
            .ssh_public_key("ssh-ed25519 AAAA test")
            .build()
            .unwrap_or_else(|err| panic!("spec should build: {err}"));
        assert_eq!(spec.image, "ubuntu-noble");
        assert_eq!(spec.init_script, None);
    }

    #[test]
    fn builder_rejects_missing_image() {
        let result = CreateSpec::builder()
            .size("DEV1-S")
            .ssh_public_key("ssh-ed25519 AAAA test")
            .build();
        assert_eq!(
            result,
            Err(ProviderError::Validation(String::from("image")))
        );
    }

    #[test]
    fn builder_rejects_whitespace_ssh_key() {
        let result = CreateSpec::builder()
            .image("img")
            .size("s")
            .ssh_public_key("   ")
            .build();
        assert_eq!(
            result,
            Err(ProviderError::Validation(String::from("ssh_public_key")))
        );
    }
}

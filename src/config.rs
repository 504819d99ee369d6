//! Configuration loading via `ortho-config`.
//!
//! [`OrchestratorConfig`] merges defaults, a `stratus.toml` configuration
//! file, `STRATUS_`-prefixed environment variables, and CLI-style overrides
//! in that order of precedence. It carries everything needed to assemble an
//! [`Orchestrator`]: the routing-table path plus per-provider credentials.
//! Providers are registered only when their credentials are present.

use std::sync::Arc;

use camino::Utf8Path;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::orchestrator::Orchestrator;
use crate::providers::digitalocean::DigitalOceanProvider;
use crate::providers::scaleway::ScalewayProvider;
use crate::routing::{RoutingError, RoutingTable};

/// Registry name under which the Scaleway adapter is installed.
pub const SCALEWAY_PROVIDER_NAME: &str = "scaleway";

/// Registry name under which the DigitalOcean adapter is installed.
pub const DIGITALOCEAN_PROVIDER_NAME: &str = "digitalocean";

/// Orchestrator configuration derived from environment variables,
/// configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "STRATUS",
    discovery(
        app_name = "stratus",
        env_var = "STRATUS_CONFIG_PATH",
        config_file_name = "stratus.toml",
        dotfile_name = ".stratus.toml",
        project_file_name = "stratus.toml"
    )
)]
pub struct OrchestratorConfig {
    /// Path to the JSON routing table mapping logical image types to
    /// provider candidates. Loading failure is fatal to construction.
    #[ortho_config(default = "routing.json".to_owned())]
    pub routing_table_path: String,
    /// Scaleway API secret key. The Scaleway adapter registers only when
    /// both the secret key and project id are present.
    pub scaleway_secret_key: Option<String>,
    /// Scaleway project identifier used for billing and resource scoping.
    pub scaleway_project_id: Option<String>,
    /// Availability zone for Scaleway instances. Defaults to `fr-par-1`.
    #[ortho_config(default = "fr-par-1".to_owned())]
    pub scaleway_zone: String,
    /// DigitalOcean API token. The DigitalOcean adapter registers only when
    /// the token is present.
    pub digitalocean_token: Option<String>,
    /// Region slug for DigitalOcean droplets. Defaults to `fra1`.
    #[ortho_config(default = "fra1".to_owned())]
    pub digitalocean_region: String,
}

/// Metadata for a configuration field, used to generate actionable error
/// messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl OrchestratorConfig {
    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags
    /// in that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge
    /// sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments.
    /// Values still merge defaults, configuration files, and environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("stratus")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Provider credentials are optional as a
    /// pair: supplying half of a provider's credentials is rejected with an
    /// actionable message.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// or a credential pair is incomplete.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.routing_table_path,
            &FieldMetadata::new(
                "routing table path",
                "STRATUS_ROUTING_TABLE_PATH",
                "routing_table_path",
            ),
        )?;
        let has_secret = Self::is_present(self.scaleway_secret_key.as_deref());
        let has_project = Self::is_present(self.scaleway_project_id.as_deref());
        if has_secret != has_project {
            let metadata = if has_secret {
                FieldMetadata::new(
                    "Scaleway project ID",
                    "STRATUS_SCALEWAY_PROJECT_ID",
                    "scaleway_project_id",
                )
            } else {
                FieldMetadata::new(
                    "Scaleway API secret key",
                    "STRATUS_SCALEWAY_SECRET_KEY",
                    "scaleway_secret_key",
                )
            };
            return Err(Self::missing(&metadata));
        }
        Ok(())
    }

    /// True when the configuration carries usable Scaleway credentials.
    #[must_use]
    pub fn has_scaleway(&self) -> bool {
        Self::is_present(self.scaleway_secret_key.as_deref())
            && Self::is_present(self.scaleway_project_id.as_deref())
    }

    /// True when the configuration carries a usable DigitalOcean token.
    #[must_use]
    pub fn has_digitalocean(&self) -> bool {
        Self::is_present(self.digitalocean_token.as_deref())
    }

    /// Assembles an [`Orchestrator`]: loads the routing table and registers
    /// every adapter whose credentials are present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when validation fails and
    /// [`ConfigError::Routing`] when the routing table cannot be loaded.
    pub fn build_orchestrator(&self) -> Result<Orchestrator, ConfigError> {
        self.validate()?;
        let routing = RoutingTable::load(Utf8Path::new(&self.routing_table_path))?;
        let mut builder = Orchestrator::builder().routing(routing);

        if let (Some(secret_key), Some(project_id)) = (
            self.scaleway_secret_key
                .as_deref()
                .filter(|value| !value.trim().is_empty()),
            self.scaleway_project_id
                .as_deref()
                .filter(|value| !value.trim().is_empty()),
        ) {
            builder = builder.register(
                SCALEWAY_PROVIDER_NAME,
                Arc::new(ScalewayProvider::new(
                    secret_key,
                    project_id,
                    &self.scaleway_zone,
                )),
            );
        }

        if let Some(token) = self
            .digitalocean_token
            .as_deref()
            .filter(|value| !value.trim().is_empty())
        {
            builder = builder.register(
                DIGITALOCEAN_PROVIDER_NAME,
                Arc::new(DigitalOceanProvider::new(token, &self.digitalocean_region)),
            );
        }

        Ok(builder.build())
    }

    fn is_present(value: Option<&str>) -> bool {
        value.is_some_and(|inner| !inner.trim().is_empty())
    }

    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(Self::missing(metadata));
        }
        Ok(())
    }

    fn missing(metadata: &FieldMetadata) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to stratus.toml",
            metadata.description, metadata.env_var, metadata.toml_key
        ))
    }
}

/// Errors raised during configuration loading, validation, and assembly.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Surfaces routing-table loading failures; fatal to construction.
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

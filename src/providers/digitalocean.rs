//! DigitalOcean adapter for the provider capability set.
//!
//! Speaks the v2 REST API directly. SSH credentials are account-level
//! objects: creation of a duplicate key is rejected with an unprocessable
//! status, which the adapter reconciles through a list-and-match lookup
//! rather than surfacing an error. Readiness means droplet status `active`
//! plus a public v4 address.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::credential::{KeyCreate, ensure_credential};
use crate::instance::InstanceState;
use crate::poll::{PollError, PollPolicy, await_ready};
use crate::provider::{CreateSpec, Provider, ProviderError, ProviderFuture};

const API_BASE: &str = "https://api.digitalocean.com/v2";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Name under which the orchestrator's SSH credential object is ensured.
const SSH_KEY_NAME: &str = "stratus-orchestrator";

/// Droplet status DigitalOcean reports once an instance is booted.
const READY_STATUS: &str = "active";

/// Default readiness budget: 24 checks at 5-second intervals.
pub const DEFAULT_POLL_POLICY: PollPolicy = PollPolicy::new(24, Duration::from_secs(5));

#[derive(Serialize)]
struct CreateDropletRequest {
    name: String,
    region: String,
    size: String,
    image: Value,
    ssh_keys: Vec<u64>,
    tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<String>,
}

#[derive(Deserialize)]
struct DropletResponse {
    droplet: Droplet,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
struct Droplet {
    id: u64,
    status: String,
    #[serde(default)]
    networks: Networks,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
struct Networks {
    #[serde(default)]
    v4: Vec<NetworkV4>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
struct NetworkV4 {
    ip_address: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Serialize)]
struct CreateSshKeyRequest {
    name: String,
    public_key: String,
}

#[derive(Deserialize)]
struct SshKeyResponse {
    ssh_key: SshKey,
}

#[derive(Deserialize)]
struct SshKeyListResponse {
    ssh_keys: Vec<SshKey>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
struct SshKey {
    id: u64,
    public_key: String,
}

/// Adapter provisioning droplets through the DigitalOcean v2 API.
#[derive(Clone)]
pub struct DigitalOceanProvider {
    http: reqwest::Client,
    token: String,
    region: String,
    poll: PollPolicy,
}

impl DigitalOceanProvider {
    /// Constructs an adapter for one account token and region.
    #[must_use]
    pub fn new(token: &str, region: &str) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            token: token.to_owned(),
            region: region.to_owned(),
            poll: DEFAULT_POLL_POLICY,
        }
    }

    /// Overrides the readiness poll policy.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll = policy;
        self
    }

    async fn read_body(response: reqwest::Response) -> Result<(reqwest::StatusCode, Vec<u8>), ProviderError> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ProviderError::api(err.to_string()))?;
        Ok((status, body.to_vec()))
    }

    async fn ensure_ssh_key(&self, public_key: &str) -> Result<u64, ProviderError> {
        let found = ensure_credential(
            || self.create_ssh_key(public_key),
            || self.lookup_ssh_key(public_key),
        )
        .await?;
        found.ok_or_else(|| {
            ProviderError::api("ssh key conflict reported but no matching key found")
        })
    }

    async fn create_ssh_key(&self, public_key: &str) -> Result<KeyCreate<u64>, ProviderError> {
        let url = format!("{API_BASE}/account/keys");
        let payload = CreateSshKeyRequest {
            name: String::from(SSH_KEY_NAME),
            public_key: public_key.to_owned(),
        };
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ProviderError::api(err.to_string()))?;
        let (status, body) = Self::read_body(response).await?;
        if status.is_success() {
            let parsed: SshKeyResponse = serde_json::from_slice(&body)
                .map_err(|err| ProviderError::api(err.to_string()))?;
            return Ok(KeyCreate::Created(parsed.ssh_key.id));
        }
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            return Ok(KeyCreate::AlreadyExists);
        }
        Err(ProviderError::api(String::from_utf8_lossy(&body).into_owned()))
    }

    async fn lookup_ssh_key(&self, public_key: &str) -> Result<Option<u64>, ProviderError> {
        let url = format!("{API_BASE}/account/keys?per_page=200");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| ProviderError::api(err.to_string()))?;
        let (status, body) = Self::read_body(response).await?;
        if !status.is_success() {
            return Err(ProviderError::api(String::from_utf8_lossy(&body).into_owned()));
        }
        let parsed: SshKeyListResponse = serde_json::from_slice(&body)
            .map_err(|err| ProviderError::api(err.to_string()))?;
        Ok(match_existing_key(&parsed.ssh_keys, public_key))
    }

    async fn create_droplet(
        &self,
        spec: &CreateSpec,
        ssh_key_id: u64,
    ) -> Result<Droplet, ProviderError> {
        let url = format!("{API_BASE}/droplets");
        let payload = CreateDropletRequest {
            name: format!("stratus-{}", Uuid::new_v4().simple()),
            region: self.region.clone(),
            size: spec.size.clone(),
            image: image_reference(&spec.image),
            ssh_keys: vec![ssh_key_id],
            tags: vec![String::from("stratus"), String::from("ephemeral")],
            user_data: spec.init_script.clone(),
        };
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ProviderError::api(err.to_string()))?;
        let (status, body) = Self::read_body(response).await?;
        if !status.is_success() {
            return Err(ProviderError::api(String::from_utf8_lossy(&body).into_owned()));
        }
        let parsed: DropletResponse = serde_json::from_slice(&body)
            .map_err(|err| ProviderError::api(err.to_string()))?;
        Ok(parsed.droplet)
    }

    async fn describe_droplet(&self, instance_id: &str) -> Result<Droplet, ProviderError> {
        let url = format!("{API_BASE}/droplets/{instance_id}");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| ProviderError::api(err.to_string()))?;
        let (status, body) = Self::read_body(response).await?;
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound {
                instance_id: instance_id.to_owned(),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::api(String::from_utf8_lossy(&body).into_owned()));
        }
        let parsed: DropletResponse = serde_json::from_slice(&body)
            .map_err(|err| ProviderError::api(err.to_string()))?;
        Ok(parsed.droplet)
    }

    fn snapshot_from_droplet(&self, droplet: &Droplet) -> InstanceState {
        let address = public_v4_address(droplet).unwrap_or_default().to_owned();
        let mut snapshot = InstanceState::new(droplet.id.to_string(), address);
        snapshot.aux.insert(
            String::from("status"),
            Value::String(droplet.status.clone()),
        );
        snapshot
            .aux
            .insert(String::from("region"), Value::String(self.region.clone()));
        snapshot
    }

    async fn wait_for_ready(&self, instance_id: &str) -> Result<InstanceState, ProviderError> {
        let polled = await_ready(self.poll, || self.describe_droplet(instance_id), is_ready).await;
        match polled {
            Ok(droplet) => Ok(self.snapshot_from_droplet(&droplet)),
            Err(PollError::Describe(err)) => Err(err),
            Err(PollError::Timeout { attempts }) => {
                tracing::warn!(instance_id, attempts, "droplet never became active");
                Err(ProviderError::NotReady {
                    instance_id: instance_id.to_owned(),
                    attempts,
                })
            }
        }
    }
}

impl Provider for DigitalOceanProvider {
    fn create<'a>(&'a self, spec: &'a CreateSpec) -> ProviderFuture<'a, InstanceState> {
        Box::pin(async move {
            spec.validate()?;
            let ssh_key_id = self.ensure_ssh_key(&spec.ssh_public_key).await?;
            let droplet = self.create_droplet(spec, ssh_key_id).await?;
            let instance_id = droplet.id.to_string();
            tracing::info!(
                instance_id = %instance_id,
                region = %self.region,
                "droplet created"
            );
            self.wait_for_ready(&instance_id).await
        })
    }

    fn destroy<'a>(&'a self, instance_id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let url = format!("{API_BASE}/droplets/{instance_id}");
            let response = self
                .http
                .delete(&url)
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(|err| ProviderError::api(err.to_string()))?;
            let status = response.status();
            // An absent droplet is a successful destroy.
            if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
                tracing::info!(instance_id, region = %self.region, "droplet destroyed");
                return Ok(());
            }
            let body = response
                .bytes()
                .await
                .map_err(|err| ProviderError::api(err.to_string()))?;
            Err(ProviderError::api(String::from_utf8_lossy(&body).into_owned()))
        })
    }

    fn describe<'a>(&'a self, instance_id: &'a str) -> ProviderFuture<'a, InstanceState> {
        Box::pin(async move {
            let droplet = self.describe_droplet(instance_id).await?;
            Ok(self.snapshot_from_droplet(&droplet))
        })
    }
}

/// Droplet images are referenced either by numeric id or by slug; the
/// create endpoint distinguishes the two by JSON type.
fn image_reference(image: &str) -> Value {
    image
        .parse::<u64>()
        .map_or_else(|_| Value::String(image.to_owned()), Value::from)
}

fn is_ready(droplet: &Droplet) -> bool {
    droplet.status == READY_STATUS && public_v4_address(droplet).is_some()
}

fn public_v4_address(droplet: &Droplet) -> Option<&str> {
    droplet
        .networks
        .v4
        .iter()
        .find(|network| network.kind == "public")
        .map(|network| network.ip_address.as_str())
}

fn match_existing_key(keys: &[SshKey], public_key: &str) -> Option<u64> {
    keys.iter()
        .find(|key| key.public_key.trim() == public_key.trim())
        .map(|key| key.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn droplet_json(status: &str, networks: &str) -> String {
        format!(
            r#"{{"droplet": {{"id": 3164444, "status": "{status}", "networks": {networks}}}}}"#
        )
    }

    #[test]
    fn parses_droplet_with_public_address() {
        let body = droplet_json(
            "active",
            r#"{"v4": [
                {"ip_address": "10.0.0.5", "type": "private"},
                {"ip_address": "203.0.113.9", "type": "public"}
            ]}"#,
        );
        let parsed: DropletResponse = serde_json::from_str(&body)
            .unwrap_or_else(|err| panic!("droplet should parse: {err}"));
        assert_eq!(parsed.droplet.id, 3_164_444);
        assert_eq!(public_v4_address(&parsed.droplet), Some("203.0.113.9"));
        assert!(is_ready(&parsed.droplet));
    }

    #[test]
    fn droplet_without_networks_field_is_not_ready() {
        let parsed: DropletResponse =
            serde_json::from_str(r#"{"droplet": {"id": 1, "status": "active"}}"#)
                .unwrap_or_else(|err| panic!("droplet should parse: {err}"));
        assert_eq!(public_v4_address(&parsed.droplet), None);
        assert!(!is_ready(&parsed.droplet));
    }

    #[test]
    fn new_droplet_with_only_private_address_is_not_ready() {
        let body = droplet_json(
            "new",
            r#"{"v4": [{"ip_address": "10.0.0.5", "type": "private"}]}"#,
        );
        let parsed: DropletResponse = serde_json::from_str(&body)
            .unwrap_or_else(|err| panic!("droplet should parse: {err}"));
        assert!(!is_ready(&parsed.droplet));
    }

    #[test]
    fn image_reference_distinguishes_slug_from_id() {
        assert_eq!(
            image_reference("ubuntu-22-04-x64"),
            Value::String(String::from("ubuntu-22-04-x64"))
        );
        assert_eq!(image_reference("112929454"), Value::from(112_929_454_u64));
    }

    #[test]
    fn key_matching_compares_trimmed_material() {
        let keys = vec![
            SshKey {
                id: 512_189,
                public_key: String::from("ssh-ed25519 AAAA deploy\n"),
            },
            SshKey {
                id: 512_190,
                public_key: String::from("ssh-rsa BBBB other"),
            },
        ];
        assert_eq!(match_existing_key(&keys, "ssh-ed25519 AAAA deploy"), Some(512_189));
        assert_eq!(match_existing_key(&keys, "ssh-rsa CCCC absent"), None);
    }

    #[test]
    fn snapshot_carries_status_in_aux() {
        let provider = DigitalOceanProvider::new("token", "fra1");
        let body = droplet_json(
            "active",
            r#"{"v4": [{"ip_address": "203.0.113.9", "type": "public"}]}"#,
        );
        let parsed: DropletResponse = serde_json::from_str(&body)
            .unwrap_or_else(|err| panic!("droplet should parse: {err}"));
        let snapshot = provider.snapshot_from_droplet(&parsed.droplet);
        assert_eq!(snapshot.id, "3164444");
        assert_eq!(snapshot.address, "203.0.113.9");
        assert_eq!(
            snapshot.aux.get("status"),
            Some(&Value::String(String::from("active")))
        );
    }
}

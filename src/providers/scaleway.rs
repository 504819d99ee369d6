//! Scaleway adapter for the provider capability set.
//!
//! Creation posts the server in a stopped state so cloud-init user-data is
//! present on the first boot, then powers it on when the provider allows
//! the `poweron` action. Server lookup, power actions, and deletion go
//! through the `scaleway-rs` SDK; creation and IAM SSH-key reconciliation
//! speak the documented REST endpoints directly because the SDK does not
//! cover them.

use std::sync::LazyLock;
use std::time::Duration;

use scaleway_rs::ScalewayApi;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::credential::{KeyCreate, ensure_credential};
use crate::instance::InstanceState;
use crate::poll::{PollError, PollPolicy, await_ready};
use crate::provider::{CreateSpec, Provider, ProviderError, ProviderFuture};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const SCALEWAY_INSTANCE_API_BASE: &str = "https://api.scaleway.com/instance/v1";
const SCALEWAY_IAM_API_BASE: &str = "https://api.scaleway.com/iam/v1alpha1";

/// Name under which the orchestrator's SSH credential object is ensured.
const SSH_KEY_NAME: &str = "stratus-orchestrator";

/// Server state Scaleway reports once an instance is booted.
const READY_STATE: &str = "running";

/// Default readiness budget: 30 checks at 4-second intervals.
pub const DEFAULT_POLL_POLICY: PollPolicy = PollPolicy::new(30, Duration::from_secs(4));

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

#[derive(Serialize)]
struct CreateServerRequest {
    name: String,
    commercial_type: String,
    image: String,
    project: String,
    routed_ip_enabled: bool,
    dynamic_ip_required: bool,
    tags: Vec<String>,
    stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    cloud_init: Option<String>,
}

#[derive(Deserialize)]
struct CreateServerResponse {
    server: scaleway_rs::ScalewayInstance,
}

#[derive(Serialize)]
struct CreateSshKeyRequest {
    name: String,
    public_key: String,
    project_id: String,
}

#[derive(Deserialize)]
struct ListSshKeysResponse {
    ssh_keys: Vec<SshKey>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
struct SshKey {
    id: String,
    public_key: String,
}

/// Provider-internal view of a server, pairing the vendor state string with
/// the uniform snapshot.
struct ServerSnapshot {
    state: String,
    allowed_actions: Vec<String>,
    snapshot: InstanceState,
}

impl ServerSnapshot {
    fn is_ready(&self) -> bool {
        self.state == READY_STATE && self.snapshot.has_address()
    }
}

/// Adapter provisioning instances through the Scaleway Instance API.
#[derive(Clone)]
pub struct ScalewayProvider {
    api: ScalewayApi,
    secret_key: String,
    project_id: String,
    zone: String,
    poll: PollPolicy,
}

impl ScalewayProvider {
    /// Constructs an adapter for one project and zone.
    #[must_use]
    pub fn new(secret_key: &str, project_id: &str, zone: &str) -> Self {
        Self {
            api: ScalewayApi::new(secret_key),
            secret_key: secret_key.to_owned(),
            project_id: project_id.to_owned(),
            zone: zone.to_owned(),
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

    fn snapshot_from_server(&self, server: scaleway_rs::ScalewayInstance) -> ServerSnapshot {
        let address = server
            .public_ip
            .map(|ip| ip.address)
            .unwrap_or_default();
        let mut snapshot = InstanceState::new(server.id, address);
        snapshot.aux.insert(
            String::from("state"),
            serde_json::Value::String(server.state.clone()),
        );
        snapshot.aux.insert(
            String::from("zone"),
            serde_json::Value::String(self.zone.clone()),
        );
        ServerSnapshot {
            state: server.state,
            allowed_actions: server.allowed_actions,
            snapshot,
        }
    }

    async fn fetch_server(
        &self,
        instance_id: &str,
    ) -> Result<Option<ServerSnapshot>, ProviderError> {
        let mut servers = self
            .api
            .list_instances(&self.zone)
            .servers(instance_id)
            .per_page(1)
            .run_async()
            .await
            .map_err(|err| ProviderError::api(err.to_string()))?;
        Ok(servers.pop().map(|server| self.snapshot_from_server(server)))
    }

    async fn describe_server(&self, instance_id: &str) -> Result<ServerSnapshot, ProviderError> {
        self.fetch_server(instance_id)
            .await?
            .ok_or_else(|| ProviderError::NotFound {
                instance_id: instance_id.to_owned(),
            })
    }

    /// Ensures the orchestrator's SSH credential object exists in the
    /// project, reconciling a conflict through a list-and-match lookup.
    async fn ensure_ssh_key(&self, public_key: &str) -> Result<(), ProviderError> {
        let found = ensure_credential(
            || self.create_ssh_key(public_key),
            || self.lookup_ssh_key(public_key),
        )
        .await?;
        match found {
            Some(_) => Ok(()),
            None => Err(ProviderError::api(
                "ssh key conflict reported but no matching key found",
            )),
        }
    }

    async fn create_ssh_key(&self, public_key: &str) -> Result<KeyCreate<String>, ProviderError> {
        let url = format!("{SCALEWAY_IAM_API_BASE}/ssh-keys");
        let payload = CreateSshKeyRequest {
            name: String::from(SSH_KEY_NAME),
            public_key: public_key.to_owned(),
            project_id: self.project_id.clone(),
        };
        let response = HTTP_CLIENT
            .post(&url)
            .header("X-Auth-Token", &self.secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ProviderError::api(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT {
            return Ok(KeyCreate::AlreadyExists);
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| ProviderError::api(err.to_string()))?;
        if status.is_success() {
            let parsed: SshKey = serde_json::from_slice(&body)
                .map_err(|err| ProviderError::api(err.to_string()))?;
            return Ok(KeyCreate::Created(parsed.id));
        }
        // Some API revisions report the duplicate through a 400 with an
        // `already_exists` type rather than a 409.
        if String::from_utf8_lossy(&body).contains("already exists") {
            return Ok(KeyCreate::AlreadyExists);
        }
        Err(ProviderError::api(String::from_utf8_lossy(&body).into_owned()))
    }

    async fn lookup_ssh_key(&self, public_key: &str) -> Result<Option<String>, ProviderError> {
        let url = format!(
            "{SCALEWAY_IAM_API_BASE}/ssh-keys?project_id={}&page_size=100",
            self.project_id
        );
        let response = HTTP_CLIENT
            .get(&url)
            .header("X-Auth-Token", &self.secret_key)
            .send()
            .await
            .map_err(|err| ProviderError::api(err.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ProviderError::api(err.to_string()))?;
        if !status.is_success() {
            return Err(ProviderError::api(String::from_utf8_lossy(&body).into_owned()));
        }
        let parsed: ListSshKeysResponse = serde_json::from_slice(&body)
            .map_err(|err| ProviderError::api(err.to_string()))?;
        Ok(match_existing_key(&parsed.ssh_keys, public_key))
    }

    /// Creates a Scaleway server in a stopped state.
    ///
    /// The server is created with `stopped: true` so that optional
    /// cloud-init user-data can be supplied in the creation request and
    /// consumed on the first boot after the server is powered on.
    async fn create_server_stopped(
        &self,
        spec: &CreateSpec,
    ) -> Result<scaleway_rs::ScalewayInstance, ProviderError> {
        let url = format!("{SCALEWAY_INSTANCE_API_BASE}/zones/{}/servers", self.zone);
        let name = format!("stratus-{}", Uuid::new_v4().simple());
        let payload = CreateServerRequest {
            name,
            commercial_type: spec.size.clone(),
            image: spec.image.clone(),
            project: self.project_id.clone(),
            routed_ip_enabled: true,
            dynamic_ip_required: true,
            tags: vec![String::from("stratus"), String::from("ephemeral")],
            stopped: true,
            cloud_init: Some(cloud_init_payload(spec)),
        };

        let response = HTTP_CLIENT
            .post(&url)
            .header("X-Auth-Token", &self.secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ProviderError::api(err.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ProviderError::api(err.to_string()))?;

        if status.is_success() {
            let parsed: CreateServerResponse = serde_json::from_slice(&body)
                .map_err(|err| ProviderError::api(err.to_string()))?;
            return Ok(parsed.server);
        }

        Err(ProviderError::api(String::from_utf8_lossy(&body).into_owned()))
    }

    async fn power_on_if_needed(&self, created: &ServerSnapshot) -> Result<(), ProviderError> {
        if created.state == READY_STATE {
            return Ok(());
        }
        if created
            .allowed_actions
            .iter()
            .any(|action| action == "poweron")
        {
            self.api
                .perform_instance_action_async(&self.zone, &created.snapshot.id, "poweron")
                .await
                .map_err(|err| ProviderError::api(err.to_string()))?;
            return Ok(());
        }
        Err(ProviderError::api(format!(
            "instance {} in state {} cannot be powered on",
            created.snapshot.id, created.state
        )))
    }

    async fn wait_for_ready(&self, instance_id: &str) -> Result<InstanceState, ProviderError> {
        let polled = await_ready(
            self.poll,
            || self.describe_server(instance_id),
            ServerSnapshot::is_ready,
        )
        .await;
        match polled {
            Ok(server) => Ok(server.snapshot),
            Err(PollError::Describe(err)) => Err(err),
            Err(PollError::Timeout { attempts }) => {
                tracing::warn!(instance_id, attempts, "scaleway instance never became ready");
                Err(ProviderError::NotReady {
                    instance_id: instance_id.to_owned(),
                    attempts,
                })
            }
        }
    }
}

impl Provider for ScalewayProvider {
    fn create<'a>(&'a self, spec: &'a CreateSpec) -> ProviderFuture<'a, InstanceState> {
        Box::pin(async move {
            spec.validate()?;
            self.ensure_ssh_key(&spec.ssh_public_key).await?;

            let server = self.create_server_stopped(spec).await?;
            let created = self.snapshot_from_server(server);
            tracing::info!(
                instance_id = %created.snapshot.id,
                zone = %self.zone,
                "scaleway server created"
            );

            self.power_on_if_needed(&created).await?;
            self.wait_for_ready(&created.snapshot.id).await
        })
    }

    fn destroy<'a>(&'a self, instance_id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let deleted = self
                .api
                .delete_instance_async(&self.zone, instance_id)
                .await;
            if let Err(err) = deleted {
                // Deletion of an absent server is a success; anything still
                // visible is a real failure.
                if self.fetch_server(instance_id).await?.is_some() {
                    return Err(ProviderError::api(err.to_string()));
                }
            }
            tracing::info!(instance_id, zone = %self.zone, "scaleway server destroyed");
            Ok(())
        })
    }

    fn describe<'a>(&'a self, instance_id: &'a str) -> ProviderFuture<'a, InstanceState> {
        Box::pin(async move {
            self.describe_server(instance_id)
                .await
                .map(|server| server.snapshot)
        })
    }
}

/// Builds the cloud-init payload installing the caller's SSH key, appending
/// any caller-supplied user-data untouched.
fn cloud_init_payload(spec: &CreateSpec) -> String {
    match spec.init_script.as_deref() {
        // Caller-provided user-data is authoritative; the key is installed
        // through the project credential instead.
        Some(script) => script.to_owned(),
        None => format!(
            "#cloud-config\nssh_authorized_keys:\n  - {}\n",
            spec.ssh_public_key
        ),
    }
}

fn match_existing_key(keys: &[SshKey], public_key: &str) -> Option<String> {
    keys.iter()
        .find(|key| key.public_key.trim() == public_key.trim())
        .map(|key| key.id.clone())
}

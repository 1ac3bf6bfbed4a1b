//! Remote Jupyter servers: provider handles, connection info and validation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use jupyter_remote::{ContentsApi, RemoteServer};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::contents::ContentsManager;
use crate::error::ConnectionError;

/// Identifies a server contributed by a server provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerProviderHandle {
    /// The extension that contributed the provider.
    pub extension_id: String,
    /// Provider id, unique within the extension.
    pub id: String,
    /// Server handle, unique within the provider.
    pub handle: String,
}

impl ServerProviderHandle {
    pub fn new(
        extension_id: impl Into<String>,
        id: impl Into<String>,
        handle: impl Into<String>,
    ) -> Self {
        Self {
            extension_id: extension_id.into(),
            id: id.into(),
            handle: handle.into(),
        }
    }

    /// The provider URI this handle stands for.
    pub fn to_uri(&self) -> String {
        format!(
            "https://remote/?id={}&uriHandle={}&extensionId={}",
            urlencoding::encode(&self.id),
            urlencoding::encode(&self.handle),
            urlencoding::encode(&self.extension_id)
        )
    }
}

impl fmt::Display for ServerProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.extension_id, self.id, self.handle)
    }
}

/// Stable server identifier derived from the provider URI.
pub fn generate_id_from_remote_provider(provider: &ServerProviderHandle) -> String {
    hex::encode(Sha256::digest(provider.to_uri().as_bytes()))
}

/// Resolved address of a remote server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConnectionInfo {
    pub server: RemoteServer,
    pub display_name: Option<String>,
}

/// Host capability resolving provider handles to a server's URL.
#[async_trait]
pub trait ServerUriProvider: Send + Sync {
    /// A URL like `http://host:8888/?token=...`.
    async fn server_url(&self, provider: &ServerProviderHandle) -> anyhow::Result<String>;

    /// Human readable name of the server, if the provider has one.
    async fn display_name(&self, _provider: &ServerProviderHandle) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

/// Connects to remote servers.
#[async_trait]
pub trait JupyterConnection: Send + Sync {
    async fn connection_info(
        &self,
        provider: &ServerProviderHandle,
    ) -> anyhow::Result<RemoteConnectionInfo>;

    /// A contents manager for the server. Dropping it releases the handle.
    fn contents_manager(&self, info: &RemoteConnectionInfo) -> Arc<dyn ContentsManager>;
}

/// Checks that a server is reachable and accepts our credentials.
#[async_trait]
pub trait ServerValidator: Send + Sync {
    async fn validate_remote_uri(
        &self,
        provider: &ServerProviderHandle,
    ) -> Result<(), ConnectionError>;
}

/// Persisted setting that allows connecting to servers with untrusted
/// certificates.
pub trait RemoteConnectionSettings: Send + Sync {
    fn allow_unauthorized_remote_connection(&self) -> bool;
    fn set_allow_unauthorized_remote_connection(&self, allow: bool);
}

/// In-memory settings, for hosts without a settings store.
#[derive(Debug, Default)]
pub struct MemorySettings {
    allow_unauthorized: AtomicBool,
}

impl RemoteConnectionSettings for MemorySettings {
    fn allow_unauthorized_remote_connection(&self) -> bool {
        self.allow_unauthorized.load(Ordering::SeqCst)
    }

    fn set_allow_unauthorized_remote_connection(&self, allow: bool) {
        self.allow_unauthorized.store(allow, Ordering::SeqCst);
    }
}

/// [`JupyterConnection`] and [`ServerValidator`] over HTTP.
pub struct RemoteJupyterConnection {
    uris: Arc<dyn ServerUriProvider>,
    settings: Arc<dyn RemoteConnectionSettings>,
}

impl RemoteJupyterConnection {
    pub fn new(
        uris: Arc<dyn ServerUriProvider>,
        settings: Arc<dyn RemoteConnectionSettings>,
    ) -> Self {
        Self { uris, settings }
    }

    fn http_client(&self) -> anyhow::Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(self.settings.allow_unauthorized_remote_connection())
            .build()?;
        Ok(client)
    }
}

#[async_trait]
impl JupyterConnection for RemoteJupyterConnection {
    async fn connection_info(
        &self,
        provider: &ServerProviderHandle,
    ) -> anyhow::Result<RemoteConnectionInfo> {
        let url = self.uris.server_url(provider).await?;
        let server = RemoteServer::from_url(&url)?;
        let display_name = self.uris.display_name(provider).await.unwrap_or(None);
        Ok(RemoteConnectionInfo {
            server,
            display_name,
        })
    }

    fn contents_manager(&self, info: &RemoteConnectionInfo) -> Arc<dyn ContentsManager> {
        let http = self.http_client().unwrap_or_else(|e| {
            log::warn!("Falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        });
        Arc::new(ContentsApi::new(info.server.clone(), http))
    }
}

#[async_trait]
impl ServerValidator for RemoteJupyterConnection {
    async fn validate_remote_uri(
        &self,
        provider: &ServerProviderHandle,
    ) -> Result<(), ConnectionError> {
        let info = self.connection_info(provider).await?;
        let http = self.http_client()?;
        info.server
            .check_connection(&http)
            .await
            .map_err(classify_connection_error)
    }
}

/// Sort a failed connection attempt into the categories the registration
/// flow reacts to.
pub fn classify_connection_error(error: anyhow::Error) -> ConnectionError {
    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            if let Some(status) = e.status() {
                if status == reqwest::StatusCode::UNAUTHORIZED
                    || status == reqwest::StatusCode::FORBIDDEN
                {
                    return ConnectionError::InvalidPassword;
                }
            }
        }
    }

    let description = error
        .chain()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(": ");
    let lowered = description.to_lowercase();
    let is_certificate_error = lowered.contains("certificate")
        || lowered.contains("unknownissuer")
        || lowered.contains("self signed")
        || lowered.contains("self-signed");

    if is_certificate_error && lowered.contains("expired") {
        ConnectionError::ExpiredSelfSignedCertificate(description)
    } else if is_certificate_error {
        ConnectionError::SelfSignedCertificate(description)
    } else {
        ConnectionError::Other(error)
    }
}

use anyhow::{Context, Result};
use async_tungstenite::{
    tokio::connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::websocket::KernelSocket;

/// Address and credentials of a remote Jupyter server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteServer {
    pub base_url: String,
    /// May be empty for servers that authenticate some other way.
    #[serde(default)]
    pub token: String,
}

/// A running kernel as reported by `/api/kernels`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kernel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub last_activity: Option<String>,
    #[serde(default)]
    pub execution_state: Option<String>,
    #[serde(default)]
    pub connections: u64,
}

fn api_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/api/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl RemoteServer {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    /// Parse a server URL as copied from `jupyter server list`, e.g.
    /// `http://127.0.0.1:8888/lab?token=abc`.
    ///
    /// A missing `token` query parameter yields an empty token.
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed_url = Url::parse(url).context("Failed to parse Jupyter URL")?;
        let host = parsed_url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("Jupyter URL has no host: {url}"))?;

        let path = parsed_url.path();
        let path = path
            .trim_end_matches('/')
            .trim_end_matches("/tree")
            .trim_end_matches("/lab");

        let base_url = format!(
            "{}://{}{}{}",
            parsed_url.scheme(),
            host,
            parsed_url
                .port()
                .map(|p| format!(":{}", p))
                .unwrap_or_default(),
            path
        );

        let token = parsed_url
            .query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();

        Ok(Self { base_url, token })
    }

    pub fn api_url(&self, path: &str) -> String {
        api_url(&self.base_url, path)
    }

    /// Attach the token to a request, if there is one.
    pub(crate) fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            request
        } else {
            request.query(&[("token", self.token.as_str())])
        }
    }

    /// Check that the server is reachable and accepts our credentials.
    ///
    /// Hits `/api/status`, falling back to `/api/kernelspecs` for servers that
    /// don't expose the status endpoint. The returned error keeps the
    /// underlying `reqwest::Error` in its chain so callers can classify
    /// certificate and authentication failures.
    pub async fn check_connection(&self, http: &reqwest::Client) -> Result<()> {
        let response = self
            .authorize(http.get(self.api_url("status")))
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", self.base_url))?;

        let response = if response.status() == reqwest::StatusCode::NOT_FOUND {
            self.authorize(http.get(self.api_url("kernelspecs")))
                .send()
                .await
                .with_context(|| format!("Failed to connect to {}", self.base_url))?
        } else {
            response
        };

        response
            .error_for_status()
            .with_context(|| format!("Jupyter server at {} rejected the request", self.base_url))?;
        Ok(())
    }

    /// List the kernels running on the server.
    pub async fn list_kernels(&self, http: &reqwest::Client) -> Result<Vec<Kernel>> {
        let kernels = self
            .authorize(http.get(self.api_url("kernels")))
            .send()
            .await
            .context("Failed to list kernels")?
            .error_for_status()?
            .json()
            .await
            .context("Failed to parse kernel list")?;
        Ok(kernels)
    }

    /// Open the kernel's channels websocket.
    ///
    /// The session id ties this connection to a Jupyter session so that
    /// servers tracking connections per session don't cull the kernel when
    /// we disconnect.
    pub async fn connect_to_kernel(
        &self,
        kernel_id: &str,
        session_id: Option<&str>,
    ) -> Result<KernelSocket> {
        let mut ws_url = api_url(&self.base_url, &format!("kernels/{}/channels", kernel_id))
            .replacen("http", "ws", 1);

        let mut query = Vec::new();
        if !self.token.is_empty() {
            query.push(format!("token={}", self.token));
        }
        if let Some(sid) = session_id {
            query.push(format!("session_id={}", sid));
        }
        if !query.is_empty() {
            ws_url.push('?');
            ws_url.push_str(&query.join("&"));
        }

        let mut req = ws_url
            .into_client_request()
            .context("Failed to build kernel websocket request")?;
        req.headers_mut().insert(
            "User-Agent",
            HeaderValue::from_static("notebook-export/jupyter-remote"),
        );

        let (inner, _response) = connect_async(req)
            .await
            .with_context(|| format!("Failed to connect to kernel {}", kernel_id))?;

        log::debug!("Connected to kernel {} on {}", kernel_id, self.base_url);
        Ok(KernelSocket::new(inner))
    }
}

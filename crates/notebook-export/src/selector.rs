//! Registering remote Jupyter servers.
//!
//! A server is only stored once it has been validated. The legacy flow walks
//! the user through certificate problems; the new flow leaves that to the
//! provider and just logs.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::connection::{
    generate_id_from_remote_provider, RemoteConnectionSettings, ServerProviderHandle,
    ServerValidator,
};
use crate::error::{ConnectionError, RemoteServerConnectionError};

pub const SELF_SIGNED_CERT_DECLINED: &str =
    "The remote server uses a self-signed certificate that was not trusted.";
pub const EXPIRED_CERT_DECLINED: &str =
    "The remote server's self-signed certificate has expired and was not trusted.";
pub const INVALID_PASSWORD: &str =
    "Failed to connect to password protected server. Check that password is correct.";

/// Where registered servers are persisted.
#[async_trait]
pub trait ServerUriStore: Send + Sync {
    async fn add(&self, provider: &ServerProviderHandle) -> anyhow::Result<()>;
}

/// Questions put to the user about certificates. `true` means go ahead.
#[async_trait]
pub trait CertificatePrompts: Send + Sync {
    async fn confirm_self_signed(&self, message: &str) -> bool;
    async fn confirm_expired(&self, message: &str) -> bool;
}

pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: RemoteServerConnectionError);
}

/// Reporter that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorReporter;

impl ErrorReporter for LogErrorReporter {
    fn report(&self, error: RemoteServerConnectionError) {
        log::error!("{}", error);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorConfig {
    /// Validate and store without prompting.
    #[serde(default)]
    pub use_new_registration_flow: bool,
    /// Start out trusting servers with self-signed certificates.
    #[serde(default)]
    pub allow_unauthorized_remote_connection: bool,
}

impl SelectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_new_registration_flow(mut self, enabled: bool) -> Self {
        self.use_new_registration_flow = enabled;
        self
    }

    pub fn with_allow_unauthorized_remote_connection(mut self, allow: bool) -> Self {
        self.allow_unauthorized_remote_connection = allow;
        self
    }
}

/// What to do after a certificate error.
enum CertificateDecision {
    Trusted,
    Declined(&'static str),
}

pub struct JupyterServerSelector {
    config: SelectorConfig,
    validator: Arc<dyn ServerValidator>,
    store: Arc<dyn ServerUriStore>,
    prompts: Arc<dyn CertificatePrompts>,
    settings: Arc<dyn RemoteConnectionSettings>,
    reporter: Arc<dyn ErrorReporter>,
}

impl JupyterServerSelector {
    pub fn new(
        config: SelectorConfig,
        validator: Arc<dyn ServerValidator>,
        store: Arc<dyn ServerUriStore>,
        prompts: Arc<dyn CertificatePrompts>,
        settings: Arc<dyn RemoteConnectionSettings>,
    ) -> Self {
        if config.allow_unauthorized_remote_connection {
            settings.set_allow_unauthorized_remote_connection(true);
        }
        Self {
            config,
            validator,
            store,
            prompts,
            settings,
            reporter: Arc::new(LogErrorReporter),
        }
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Validate `provider` and store it if it checks out.
    pub async fn add_jupyter_server(&self, provider: &ServerProviderHandle) -> anyhow::Result<()> {
        if self.config.use_new_registration_flow {
            self.add_jupyter_server_new(provider).await
        } else {
            self.add_jupyter_server_old(provider).await
        }
    }

    pub async fn add_jupyter_server_old(
        &self,
        provider: &ServerProviderHandle,
    ) -> anyhow::Result<()> {
        match self.validator.validate_remote_uri(provider).await {
            Ok(()) => {}
            Err(ConnectionError::InvalidPassword) => {
                log::debug!("Invalid password for {}, not adding it", provider);
                return Ok(());
            }
            Err(
                e @ (ConnectionError::SelfSignedCertificate(_)
                | ConnectionError::ExpiredSelfSignedCertificate(_)),
            ) => {
                if let CertificateDecision::Declined(_) = self.handle_certificate_error(&e).await {
                    log::info!("Certificate for {} was not trusted, not adding it", provider);
                    return Ok(());
                }
            }
            Err(source) => {
                self.reporter.report(RemoteServerConnectionError {
                    id: generate_id_from_remote_provider(provider),
                    provider: provider.clone(),
                    source,
                });
                return Ok(());
            }
        }

        self.store.add(provider).await
    }

    pub async fn add_jupyter_server_new(
        &self,
        provider: &ServerProviderHandle,
    ) -> anyhow::Result<()> {
        if let Err(e) = self.validator.validate_remote_uri(provider).await {
            log::error!("Failed to validate Jupyter server {}: {:#}", provider, e);
            return Ok(());
        }
        self.store.add(provider).await
    }

    /// Check `provider` without registering it.
    ///
    /// Returns a message to show the user, or `None` if the server is usable.
    /// Trusting a certificate when prompted updates the settings and checks
    /// again.
    pub async fn validate_select_jupyter_uri(
        &self,
        provider: &ServerProviderHandle,
    ) -> Option<String> {
        let mut error = match self.validator.validate_remote_uri(provider).await {
            Ok(()) => return None,
            Err(e) => e,
        };

        if matches!(
            error,
            ConnectionError::SelfSignedCertificate(_)
                | ConnectionError::ExpiredSelfSignedCertificate(_)
        ) {
            match self.handle_certificate_error(&error).await {
                CertificateDecision::Declined(message) => return Some(message.to_string()),
                CertificateDecision::Trusted => {
                    error = match self.validator.validate_remote_uri(provider).await {
                        Ok(()) => return None,
                        Err(e) => e,
                    };
                }
            }
        }

        match error {
            ConnectionError::InvalidPassword => Some(INVALID_PASSWORD.to_string()),
            other => Some(linkify_urls(&format!(
                "Failed to connect to the remote Jupyter server. {:#}",
                other
            ))),
        }
    }

    async fn handle_certificate_error(&self, error: &ConnectionError) -> CertificateDecision {
        let message = error.to_string();
        let (trusted, declined) = match error {
            ConnectionError::ExpiredSelfSignedCertificate(_) => {
                (self.prompts.confirm_expired(&message).await, EXPIRED_CERT_DECLINED)
            }
            _ => (
                self.prompts.confirm_self_signed(&message).await,
                SELF_SIGNED_CERT_DECLINED,
            ),
        };
        if !trusted {
            return CertificateDecision::Declined(declined);
        }
        self.settings.set_allow_unauthorized_remote_connection(true);
        CertificateDecision::Trusted
    }
}

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s)'"]+"#).expect("URL pattern is valid"));

/// Render every `http://` or `https://` URL in `text` as a markdown link.
///
/// Closing parentheses, quotes and trailing sentence punctuation are left
/// outside the link.
pub fn linkify_urls(text: &str) -> String {
    URL.replace_all(text, |caps: &Captures| {
        let matched = &caps[0];
        let url = matched.trim_end_matches(['.', ',', ';', ':']);
        format!("[{url}]({url}){}", &matched[url.len()..])
    })
    .into_owned()
}

use thiserror::Error;

use crate::connection::ServerProviderHandle;

#[derive(Error, Debug)]
pub enum ExportError {
    /// nbconvert reported a failure; carries the text it printed.
    #[error("{0}")]
    ConversionFailed(String),

    #[error("Export was cancelled")]
    Cancelled,

    #[error("Failed to write exported file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid notebook: {0}")]
    Notebook(#[from] nbformat::NotebookError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to decode exported file: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Remote server error: {0:#}")]
    Remote(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ExportError>;

/// Why a remote server could not be validated.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("The server's certificate is not issued by a trusted authority: {0}")]
    SelfSignedCertificate(String),

    #[error("The server's self-signed certificate has expired: {0}")]
    ExpiredSelfSignedCertificate(String),

    #[error("Invalid password or token")]
    InvalidPassword,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A failed connection attempt while registering a server, as handed to the
/// host's error reporter.
#[derive(Error, Debug)]
#[error("Failed to connect to remote Jupyter server {id}: {source}")]
pub struct RemoteServerConnectionError {
    /// Identifier generated from the provider handle.
    pub id: String,
    pub provider: ServerProviderHandle,
    #[source]
    pub source: ConnectionError,
}

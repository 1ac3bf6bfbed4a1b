//! Kernel connections and the kernel capabilities the exporter relies on.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use jupyter_remote::{KernelOutput, RemoteKernelSession};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::connection::ServerProviderHandle;

/// How a Python environment was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvironmentType {
    Conda,
    Pipenv,
    Poetry,
    Pyenv,
    Venv,
    VirtualEnv,
    VirtualEnvWrapper,
    Global,
    Unknown,
}

/// A Python interpreter known to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PythonEnvironment {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub env_type: EnvironmentType,
    #[serde(default)]
    pub env_name: Option<String>,
    /// Path to the python binary. Conda environments created without python
    /// have none until the host resolves them.
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default)]
    pub version: Option<String>,
}

impl PythonEnvironment {
    /// A Conda environment whose python binary we don't know yet.
    pub fn is_unresolved_conda(&self) -> bool {
        self.env_type == EnvironmentType::Conda && self.executable.is_none()
    }
}

/// A kernel spec as found on disk or reported by a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KernelSpecInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub argv: Vec<String>,
    /// Location of `kernel.json`, for specs read from disk.
    #[serde(default)]
    pub spec_file: Option<PathBuf>,
}

impl KernelSpecInfo {
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

/// Everything needed to start or reach a kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum KernelConnectionMetadata {
    /// A kernel spec installed on this machine.
    #[serde(rename_all = "camelCase")]
    LocalKernelSpec {
        id: String,
        kernel_spec: KernelSpecInfo,
    },
    /// A kernel started from a local Python interpreter.
    #[serde(rename_all = "camelCase")]
    PythonEnvironment {
        id: String,
        interpreter: PythonEnvironment,
    },
    /// A kernel spec on a remote server, started on demand.
    #[serde(rename_all = "camelCase")]
    RemoteKernelSpec {
        id: String,
        base_url: String,
        server: ServerProviderHandle,
        kernel_spec: KernelSpecInfo,
    },
    /// A kernel already running on a remote server.
    #[serde(rename_all = "camelCase")]
    LiveRemoteKernel {
        id: String,
        base_url: String,
        server: ServerProviderHandle,
        kernel: jupyter_remote::Kernel,
        #[serde(default)]
        display_name: Option<String>,
    },
}

impl KernelConnectionMetadata {
    pub fn id(&self) -> &str {
        match self {
            KernelConnectionMetadata::LocalKernelSpec { id, .. }
            | KernelConnectionMetadata::PythonEnvironment { id, .. }
            | KernelConnectionMetadata::RemoteKernelSpec { id, .. }
            | KernelConnectionMetadata::LiveRemoteKernel { id, .. } => id,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.server().is_some()
    }

    /// The server a remote connection lives on.
    pub fn server(&self) -> Option<&ServerProviderHandle> {
        match self {
            KernelConnectionMetadata::RemoteKernelSpec { server, .. }
            | KernelConnectionMetadata::LiveRemoteKernel { server, .. } => Some(server),
            _ => None,
        }
    }

    pub fn base_url(&self) -> Option<&str> {
        match self {
            KernelConnectionMetadata::RemoteKernelSpec { base_url, .. }
            | KernelConnectionMetadata::LiveRemoteKernel { base_url, .. } => Some(base_url),
            _ => None,
        }
    }

    pub fn interpreter(&self) -> Option<&PythonEnvironment> {
        match self {
            KernelConnectionMetadata::PythonEnvironment { interpreter, .. } => Some(interpreter),
            _ => None,
        }
    }
}

/// A session on a started kernel that can run code.
#[async_trait]
pub trait KernelSession: Send + Sync {
    /// Run code without recording it in history and return its outputs.
    async fn execute_silently(&self, code: &str) -> anyhow::Result<Vec<KernelOutput>>;
}

#[async_trait]
impl KernelSession for RemoteKernelSession {
    async fn execute_silently(&self, code: &str) -> anyhow::Result<Vec<KernelOutput>> {
        RemoteKernelSession::execute_silently(self, code).await
    }
}

/// A kernel attached to a notebook.
pub trait Kernel: Send + Sync {
    fn connection(&self) -> &KernelConnectionMetadata;

    /// The live session, or `None` if the kernel hasn't been started.
    fn session(&self) -> Option<Arc<dyn KernelSession>>;
}

/// Looks up the kernel associated with a notebook.
pub trait KernelProvider: Send + Sync {
    fn get(&self, notebook: &Url) -> Option<Arc<dyn Kernel>>;
}

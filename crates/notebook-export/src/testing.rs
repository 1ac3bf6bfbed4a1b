//! In-memory stand-ins for the host and server capabilities, used by the
//! unit tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jupyter_protocol::media::{Media, MediaType};
use jupyter_remote::{
    ContentFormat, ContentType, ContentsModel, GetOptions, KernelOutput, NewUntitledRequest,
    RemoteServer, SaveRequest,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::connection::{JupyterConnection, RemoteConnectionInfo, ServerProviderHandle};
use crate::contents::ContentsManager;
use crate::fs::FileSystem;
use crate::kernel::{
    Kernel, KernelConnectionMetadata, KernelProvider, KernelSession, KernelSpecInfo,
};

pub fn notebook_uri() -> Url {
    Url::parse("untitled:Untitled-1.ipynb").unwrap()
}

pub fn sample_notebook() -> serde_json::Value {
    json!({
        "cells": [{
            "cell_type": "code",
            "execution_count": 1,
            "id": "a1",
            "metadata": {},
            "outputs": [],
            "source": ["print('hello')"]
        }],
        "metadata": {},
        "nbformat": 4,
        "nbformat_minor": 5
    })
}

pub fn server_handle() -> ServerProviderHandle {
    ServerProviderHandle::new("ms-toolsai.jupyter", "remote", "server-1")
}

pub fn live_remote_connection() -> KernelConnectionMetadata {
    KernelConnectionMetadata::LiveRemoteKernel {
        id: "live-k1".to_string(),
        base_url: "http://localhost:8888".to_string(),
        server: server_handle(),
        kernel: jupyter_remote::Kernel {
            id: "k1".to_string(),
            name: "python3".to_string(),
            last_activity: None,
            execution_state: Some("idle".to_string()),
            connections: 1,
        },
        display_name: Some("Python 3 (ipykernel)".to_string()),
    }
}

pub fn local_connection() -> KernelConnectionMetadata {
    KernelConnectionMetadata::LocalKernelSpec {
        id: "local-python3".to_string(),
        kernel_spec: KernelSpecInfo {
            name: "python3".to_string(),
            display_name: "Python 3".to_string(),
            language: Some("python".to_string()),
            argv: vec!["/usr/bin/python3".to_string()],
            spec_file: Some(PathBuf::from(
                "/usr/share/jupyter/kernels/python3/kernel.json",
            )),
        },
    }
}

#[derive(Default)]
struct ContentsState {
    files: BTreeMap<String, serde_json::Value>,
    saved: Vec<(String, serde_json::Value)>,
    deleted: Vec<String>,
    untitled_files: usize,
    untitled_notebooks: usize,
    base64_reads: usize,
}

/// A contents manager over a map of path to content.
#[derive(Default)]
pub struct FakeContents {
    state: Mutex<ContentsState>,
    calls: AtomicUsize,
    fail_saves: AtomicBool,
}

impl FakeContents {
    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }

    /// Put a file in place the way a kernel process would.
    pub fn put(&self, path: &str, content: serde_json::Value) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), content);
    }

    pub fn paths(&self) -> Vec<String> {
        self.state.lock().unwrap().files.keys().cloned().collect()
    }

    pub fn saved(&self) -> Vec<(String, serde_json::Value)> {
        self.state.lock().unwrap().saved.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn base64_reads(&self) -> usize {
        self.state.lock().unwrap().base64_reads
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn model(path: &str, content_type: ContentType, content: Option<serde_json::Value>) -> ContentsModel {
        ContentsModel {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            content_type,
            format: None,
            content,
            mimetype: None,
            writable: true,
            created: None,
            last_modified: None,
        }
    }
}

#[async_trait]
impl ContentsManager for FakeContents {
    async fn get(&self, path: &str, options: GetOptions) -> anyhow::Result<ContentsModel> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if options.format == ContentFormat::Base64 {
            state.base64_reads += 1;
        }
        let content = state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No such file: {}", path))?;
        let mut model = Self::model(path, options.content_type, Some(content));
        model.format = Some(options.format);
        Ok(model)
    }

    async fn save(&self, path: &str, request: SaveRequest) -> anyhow::Result<ContentsModel> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            anyhow::bail!("Disk quota exceeded");
        }
        let mut state = self.state.lock().unwrap();
        state.files.insert(path.to_string(), request.content.clone());
        state.saved.push((path.to_string(), request.content.clone()));
        Ok(Self::model(path, request.content_type, None))
    }

    async fn new_untitled(
        &self,
        dir: &str,
        request: NewUntitledRequest,
    ) -> anyhow::Result<ContentsModel> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let name = match request.content_type {
            ContentType::Notebook => {
                state.untitled_notebooks += 1;
                format!("Untitled{}.ipynb", state.untitled_notebooks)
            }
            _ => {
                state.untitled_files += 1;
                format!(
                    "untitled{}{}",
                    state.untitled_files,
                    request.ext.as_deref().unwrap_or(".txt")
                )
            }
        };
        let path = if dir.is_empty() {
            name
        } else {
            format!("{}/{}", dir, name)
        };
        state.files.insert(path.clone(), json!(""));
        Ok(Self::model(&path, request.content_type, None))
    }

    async fn rename(&self, from: &str, to: &str) -> anyhow::Result<ContentsModel> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let content = state
            .files
            .remove(from)
            .ok_or_else(|| anyhow::anyhow!("No such file: {}", from))?;
        state.files.insert(to.to_string(), content);
        Ok(Self::model(to, ContentType::Notebook, None))
    }

    async fn delete(&self, path: &str) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.deleted.push(path.to_string());
        state
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| anyhow::anyhow!("No such file: {}", path))
    }
}

/// A kernel session with scripted answers to the cwd probe and nbconvert.
pub struct FakeKernelSession {
    contents: Arc<FakeContents>,
    cwd: Option<String>,
    conversion_outputs: Vec<KernelOutput>,
    converted: serde_json::Value,
    cancel: Option<CancellationToken>,
    executed: Mutex<Vec<String>>,
}

impl FakeKernelSession {
    pub fn new() -> Self {
        Self {
            contents: Arc::new(FakeContents::default()),
            cwd: None,
            conversion_outputs: Vec::new(),
            converted: serde_json::Value::Null,
            cancel: None,
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_cwd(mut self, cwd: &str) -> Self {
        self.cwd = Some(cwd.to_string());
        self
    }

    /// Outputs printed by nbconvert, and the file content it produces
    /// (`null` for none).
    pub fn with_conversion(mut self, outputs: Vec<KernelOutput>, converted: serde_json::Value) -> Self {
        self.conversion_outputs = outputs;
        self.converted = converted;
        self
    }

    /// Request cancellation as soon as any code runs.
    pub fn cancel_on_execute(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// The server filesystem this kernel writes to.
    pub fn contents(&self) -> Arc<FakeContents> {
        self.contents.clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl KernelSession for FakeKernelSession {
    async fn execute_silently(&self, code: &str) -> anyhow::Result<Vec<KernelOutput>> {
        self.executed.lock().unwrap().push(code.to_string());
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }

        if code == "import os; os.getcwd()" {
            return Ok(self
                .cwd
                .iter()
                .map(|cwd| KernelOutput::ExecuteResult {
                    data: Media::new(vec![MediaType::Plain(format!("'{}'", cwd))]),
                })
                .collect());
        }

        if code.starts_with("!jupyter nbconvert") {
            if !self.converted.is_null() {
                let output = code
                    .split_whitespace()
                    .skip_while(|part| *part != "--output")
                    .nth(1)
                    .ok_or_else(|| anyhow::anyhow!("nbconvert without --output"))?;
                self.contents.put(output, self.converted.clone());
            }
            return Ok(self.conversion_outputs.clone());
        }

        Ok(Vec::new())
    }
}

pub struct FakeKernel {
    connection: KernelConnectionMetadata,
    session: Option<Arc<FakeKernelSession>>,
}

impl FakeKernel {
    pub fn new(connection: KernelConnectionMetadata, session: Option<Arc<FakeKernelSession>>) -> Self {
        Self {
            connection,
            session,
        }
    }
}

impl Kernel for FakeKernel {
    fn connection(&self) -> &KernelConnectionMetadata {
        &self.connection
    }

    fn session(&self) -> Option<Arc<dyn KernelSession>> {
        self.session
            .clone()
            .map(|session| session as Arc<dyn KernelSession>)
    }
}

pub struct FakeKernelProvider {
    kernel: Option<Arc<FakeKernel>>,
}

impl FakeKernelProvider {
    pub fn empty() -> Self {
        Self { kernel: None }
    }

    pub fn with_kernel(kernel: FakeKernel) -> Self {
        Self {
            kernel: Some(Arc::new(kernel)),
        }
    }
}

impl KernelProvider for FakeKernelProvider {
    fn get(&self, _notebook: &Url) -> Option<Arc<dyn Kernel>> {
        self.kernel.clone().map(|kernel| kernel as Arc<dyn Kernel>)
    }
}

pub struct FakeConnection {
    contents: Arc<FakeContents>,
}

impl FakeConnection {
    pub fn new(contents: Arc<FakeContents>) -> Self {
        Self { contents }
    }
}

#[async_trait]
impl JupyterConnection for FakeConnection {
    async fn connection_info(
        &self,
        _provider: &ServerProviderHandle,
    ) -> anyhow::Result<RemoteConnectionInfo> {
        Ok(RemoteConnectionInfo {
            server: RemoteServer::new("http://localhost:8888", "token"),
            display_name: Some("Local Server".to_string()),
        })
    }

    fn contents_manager(&self, _info: &RemoteConnectionInfo) -> Arc<dyn ContentsManager> {
        self.contents.clone()
    }
}

/// Records writes instead of touching the disk.
pub struct FakeFileSystem {
    writes: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    fail: bool,
}

impl FakeFileSystem {
    pub fn new() -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn written(&self, path: &Path) -> Option<Vec<u8>> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, bytes)| bytes.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.writes.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl FileSystem for FakeFileSystem {
    async fn write_file(&self, path: &Path, contents: &[u8]) -> std::io::Result<()> {
        if self.fail {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only file system",
            ));
        }
        self.writes
            .lock()
            .unwrap()
            .push((path.to_path_buf(), contents.to_vec()));
        Ok(())
    }
}

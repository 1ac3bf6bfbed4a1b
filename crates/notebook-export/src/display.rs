//! Display metadata for kernel connections.
//!
//! Kernel pickers show a label, description, detail and category for every
//! connection. Some of that is known up front; the server's display name and
//! the final category may need a lookup, and Conda environments created
//! without Python only get a proper label once the host resolves them. The
//! provider hands out one shared entry per connection straight away and
//! updates it in place as better data arrives.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio::task::AbortHandle;

use crate::connection::{JupyterConnection, RemoteJupyterConnection, ServerProviderHandle};
use crate::kernel::{EnvironmentType, KernelConnectionMetadata, PythonEnvironment};

pub const CATEGORY_JUPYTER_SESSION: &str = "Jupyter Session";
pub const CATEGORY_JUPYTER_KERNEL: &str = "Jupyter Kernel";

/// Source of interpreter change notifications.
pub trait InterpreterService: Send + Sync {
    /// Every interpreter the host discovers or refreshes is sent here.
    fn subscribe(&self) -> broadcast::Receiver<PythonEnvironment>;
}

#[async_trait]
pub trait ServerDisplayNames: Send + Sync {
    async fn display_name(&self, server: &ServerProviderHandle) -> anyhow::Result<String>;
}

#[async_trait]
pub trait KernelCategories: Send + Sync {
    async fn category(&self, connection: &KernelConnectionMetadata) -> anyhow::Result<String>;
}

/// Categories computed from the connection alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCategories;

#[async_trait]
impl KernelCategories for LocalCategories {
    async fn category(&self, connection: &KernelConnectionMetadata) -> anyhow::Result<String> {
        Ok(connection_category(connection))
    }
}

#[async_trait]
impl ServerDisplayNames for RemoteJupyterConnection {
    async fn display_name(&self, server: &ServerProviderHandle) -> anyhow::Result<String> {
        let info = self.connection_info(server).await?;
        Ok(info.display_name.unwrap_or(info.server.base_url))
    }
}

/// The displayed values for one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayFields {
    pub label: String,
    pub description: String,
    pub detail: String,
    pub category: String,
    pub server_display_name: Option<String>,
}

/// Shared, updatable display data for one connection.
#[derive(Debug)]
pub struct ConnectionDisplayData {
    connection_id: String,
    fields: watch::Sender<DisplayFields>,
}

impl ConnectionDisplayData {
    fn new(connection_id: String, fields: DisplayFields) -> Self {
        let (fields, _) = watch::channel(fields);
        Self {
            connection_id,
            fields,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn fields(&self) -> DisplayFields {
        self.fields.borrow().clone()
    }

    pub fn label(&self) -> String {
        self.fields.borrow().label.clone()
    }

    pub fn description(&self) -> String {
        self.fields.borrow().description.clone()
    }

    pub fn detail(&self) -> String {
        self.fields.borrow().detail.clone()
    }

    pub fn category(&self) -> String {
        self.fields.borrow().category.clone()
    }

    pub fn server_display_name(&self) -> Option<String> {
        self.fields.borrow().server_display_name.clone()
    }

    /// Changes are delivered here; the receiver always sees the latest values.
    pub fn subscribe(&self) -> watch::Receiver<DisplayFields> {
        self.fields.subscribe()
    }

    /// Apply `modify`; subscribers are notified only if it reports a change.
    fn update(&self, modify: impl FnOnce(&mut DisplayFields) -> bool) -> bool {
        self.fields.send_if_modified(modify)
    }
}

/// Category of a Python environment.
pub fn python_environment_category(env_type: EnvironmentType) -> &'static str {
    match env_type {
        EnvironmentType::Conda => "Conda Env",
        EnvironmentType::Pipenv => "Pipenv Env",
        EnvironmentType::Poetry => "Poetry Env",
        EnvironmentType::Pyenv => "PyEnv Env",
        EnvironmentType::Venv | EnvironmentType::VirtualEnv | EnvironmentType::VirtualEnvWrapper => {
            "Virtual Env"
        }
        EnvironmentType::Global | EnvironmentType::Unknown => "Global Env",
    }
}

pub fn connection_category(connection: &KernelConnectionMetadata) -> String {
    match connection {
        KernelConnectionMetadata::LiveRemoteKernel { .. } => CATEGORY_JUPYTER_SESSION.to_string(),
        KernelConnectionMetadata::LocalKernelSpec { .. }
        | KernelConnectionMetadata::RemoteKernelSpec { .. } => CATEGORY_JUPYTER_KERNEL.to_string(),
        KernelConnectionMetadata::PythonEnvironment { interpreter, .. } => {
            python_environment_category(interpreter.env_type).to_string()
        }
    }
}

fn python_label(interpreter: &PythonEnvironment) -> String {
    interpreter
        .display_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .or_else(|| interpreter.env_name.clone())
        .unwrap_or_else(|| "Python".to_string())
}

fn python_description(interpreter: &PythonEnvironment) -> String {
    match &interpreter.executable {
        Some(path) => path.display().to_string(),
        None => interpreter.env_name.clone().unwrap_or_default(),
    }
}

/// Everything that can be worked out without asking anyone.
pub fn display_fields(connection: &KernelConnectionMetadata) -> DisplayFields {
    let category = connection_category(connection);
    match connection {
        KernelConnectionMetadata::LocalKernelSpec { kernel_spec, .. } => DisplayFields {
            label: kernel_spec.label().to_string(),
            description: kernel_spec.argv.first().cloned().unwrap_or_default(),
            detail: kernel_spec
                .spec_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            category,
            server_display_name: None,
        },
        KernelConnectionMetadata::PythonEnvironment { interpreter, .. } => DisplayFields {
            label: python_label(interpreter),
            description: python_description(interpreter),
            detail: String::new(),
            category,
            server_display_name: None,
        },
        KernelConnectionMetadata::RemoteKernelSpec {
            base_url,
            kernel_spec,
            ..
        } => DisplayFields {
            label: kernel_spec.label().to_string(),
            description: base_url.clone(),
            detail: String::new(),
            category,
            server_display_name: None,
        },
        KernelConnectionMetadata::LiveRemoteKernel {
            base_url,
            kernel,
            display_name,
            ..
        } => DisplayFields {
            label: display_name.clone().unwrap_or_else(|| kernel.name.clone()),
            description: base_url.clone(),
            detail: format!("(Kernel id {})", kernel.id),
            category,
            server_display_name: None,
        },
    }
}

/// Process-wide cache of [`ConnectionDisplayData`], keyed by connection id.
pub struct ConnectionDisplayDataProvider {
    entries: Mutex<HashMap<String, Arc<ConnectionDisplayData>>>,
    interpreters: Arc<dyn InterpreterService>,
    server_names: Arc<dyn ServerDisplayNames>,
    categories: Arc<dyn KernelCategories>,
    /// Long-lived watchers, aborted when the provider goes away.
    watchers: Mutex<Vec<AbortHandle>>,
}

impl ConnectionDisplayDataProvider {
    pub fn new(
        interpreters: Arc<dyn InterpreterService>,
        server_names: Arc<dyn ServerDisplayNames>,
        categories: Arc<dyn KernelCategories>,
    ) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            interpreters,
            server_names,
            categories,
            watchers: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Display data for `connection`, possibly stale.
    ///
    /// Subscribe to the returned entry to see the values that background
    /// refreshes fill in. Refreshing needs a Tokio runtime; without one the
    /// synchronously computed values are all you get.
    pub fn get_display_data(
        &self,
        connection: &KernelConnectionMetadata,
    ) -> Arc<ConnectionDisplayData> {
        let (entry, created) = {
            let mut entries = self
                .entries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match entries.get(connection.id()) {
                Some(entry) => (entry.clone(), false),
                None => {
                    let entry = Arc::new(ConnectionDisplayData::new(
                        connection.id().to_string(),
                        display_fields(connection),
                    ));
                    entries.insert(connection.id().to_string(), entry.clone());
                    (entry, true)
                }
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::debug!(
                "No async runtime, not refreshing display data for {}",
                connection.id()
            );
            return entry;
        };

        if created {
            if let Some(interpreter) = connection.interpreter() {
                if interpreter.is_unresolved_conda() {
                    self.watch_interpreter(&runtime, &entry, interpreter.clone());
                }
            }
        }

        if let Some(server) = connection.server() {
            let entry = entry.clone();
            let server = server.clone();
            let server_names = self.server_names.clone();
            runtime.spawn(async move {
                match server_names.display_name(&server).await {
                    Ok(name) => {
                        entry.update(|fields| {
                            if fields.server_display_name.as_deref() == Some(name.as_str()) {
                                false
                            } else {
                                fields.server_display_name = Some(name);
                                true
                            }
                        });
                    }
                    Err(e) => log::debug!("Failed to get server display name for {}: {:#}", server, e),
                }
            });
        }

        {
            let entry = entry.clone();
            let connection = connection.clone();
            let categories = self.categories.clone();
            runtime.spawn(async move {
                match categories.category(&connection).await {
                    Ok(category) => {
                        entry.update(|fields| {
                            if fields.category == category {
                                false
                            } else {
                                fields.category = category;
                                true
                            }
                        });
                    }
                    Err(e) => log::debug!("Failed to get category for {}: {:#}", connection.id(), e),
                }
            });
        }

        entry
    }

    /// Wait for the host to resolve `interpreter`, then refresh the entry.
    fn watch_interpreter(
        &self,
        runtime: &tokio::runtime::Handle,
        entry: &Arc<ConnectionDisplayData>,
        interpreter: PythonEnvironment,
    ) {
        let mut changes = self.interpreters.subscribe();
        let entry = entry.clone();
        let task = runtime.spawn(async move {
            loop {
                let resolved = match changes.recv().await {
                    Ok(env) => env,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::debug!("Missed {} interpreter changes", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                };
                if resolved.id != interpreter.id || resolved.is_unresolved_conda() {
                    continue;
                }

                let label = python_label(&resolved);
                let description = python_description(&resolved);
                let category = python_environment_category(resolved.env_type).to_string();
                entry.update(|fields| {
                    let changed = fields.label != label
                        || fields.description != description
                        || fields.category != category;
                    fields.label = label;
                    fields.description = description;
                    fields.category = category;
                    changed
                });
                return;
            }
        });

        let mut watchers = self
            .watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        watchers.retain(|w| !w.is_finished());
        watchers.push(task.abort_handle());
    }
}

impl Drop for ConnectionDisplayDataProvider {
    fn drop(&mut self) {
        if let Ok(watchers) = self.watchers.get_mut() {
            for watcher in watchers.drain(..) {
                watcher.abort();
            }
        }
    }
}

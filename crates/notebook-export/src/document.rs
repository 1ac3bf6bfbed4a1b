//! Notebook documents as the host hands them to us.

use std::path::{Path, PathBuf};

use nbformat::{v4, Notebook, NotebookError};
use url::Url;

use crate::error::{ExportError, Result};

/// An open notebook in the host.
pub trait NotebookDocument: Send + Sync {
    /// Host identity of the document, e.g. `untitled:Untitled-1.ipynb`.
    fn uri(&self) -> &Url;

    /// Local file backing the document, if it has been saved to disk.
    fn associated_resource(&self) -> Option<&Path>;

    /// The notebook in nbformat JSON form, cells and outputs included.
    fn notebook_json(&self) -> serde_json::Value;
}

/// A notebook held entirely in memory.
#[derive(Debug, Clone)]
pub struct InMemoryNotebook {
    uri: Url,
    resource: Option<PathBuf>,
    notebook: serde_json::Value,
}

impl InMemoryNotebook {
    pub fn new(uri: Url, notebook: serde_json::Value) -> Self {
        Self {
            uri,
            resource: None,
            notebook,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<PathBuf>) -> Self {
        self.resource = Some(resource.into());
        self
    }
}

impl NotebookDocument for InMemoryNotebook {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn associated_resource(&self) -> Option<&Path> {
        self.resource.as_deref()
    }

    fn notebook_json(&self) -> serde_json::Value {
        self.notebook.clone()
    }
}

/// Parse notebook JSON, upgrading nbformat 4.0-4.4 and 3.x notebooks to 4.5.
pub fn parse_v4_notebook(json: &str) -> Result<v4::Notebook> {
    let notebook = match nbformat::parse_notebook(json)? {
        Notebook::V4(notebook) => notebook,
        Notebook::Legacy(legacy) => {
            nbformat::upgrade_legacy_notebook(legacy).map_err(upgrade_failed)?
        }
        Notebook::V3(v3) => nbformat::upgrade_v3_notebook(v3).map_err(upgrade_failed)?,
    };
    Ok(notebook)
}

fn upgrade_failed(e: anyhow::Error) -> ExportError {
    ExportError::Notebook(NotebookError::ValidationError(format!("{:#}", e)))
}

/// Serialize the host's notebook JSON the way nbformat writes it to disk.
pub fn serialize_notebook(notebook: &serde_json::Value) -> Result<String> {
    let notebook = parse_v4_notebook(&serde_json::to_string(notebook)?)?;
    Ok(nbformat::serialize_notebook(&Notebook::V4(notebook))?)
}

/// File name of the document without its extension, e.g. `Untitled-1`.
pub fn document_stem(uri: &Url) -> String {
    let last = uri
        .path()
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or_default();
    let last = urlencoding::decode(last)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| last.to_string());
    let stem = match last.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => last,
    };
    if stem.is_empty() {
        "Untitled".to_string()
    } else {
        stem
    }
}

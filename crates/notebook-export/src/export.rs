//! Exporting notebooks through a remote kernel.
//!
//! The notebook is staged on the kernel's server as a backing file, the kernel
//! runs `jupyter nbconvert` on it, and the converted file is read back through
//! the contents API and written to the local destination. Everything created
//! on the server is deleted again, whether or not the conversion worked.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as _;
use jupyter_remote::{ContentType, GetOptions, KernelOutput, NewUntitledRequest};
use tokio_util::sync::CancellationToken;

use crate::backing_file::{invoke_with_file_synced, BackingFile};
use crate::connection::JupyterConnection;
use crate::contents::ContentsManager;
use crate::document::{document_stem, serialize_notebook, NotebookDocument};
use crate::error::{ExportError, Result};
use crate::format::ExportFormat;
use crate::fs::FileSystem;
use crate::kernel::{KernelProvider, KernelSession, PythonEnvironment};

/// Printed by Python when an uncaught exception escapes.
const TRACEBACK_MARKER: &str = "Traceback (most recent call last)";

const GENERIC_EXPORT_FAILURE: &str = "Failed to export notebook";

const CWD_PROBE: &str = "import os; os.getcwd()";

/// The shell command run inside the kernel to convert `path`.
pub fn nbconvert_command(path: &str, format: ExportFormat, output: &str) -> String {
    format!(
        "!jupyter nbconvert {} --to {} --output {}",
        path,
        format.nbconvert_target(),
        basename(output)
    )
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Text nbconvert printed: the leading stream outputs joined together.
///
/// `None` when the first output is not a stream.
pub fn parse_stream_output(outputs: &[KernelOutput]) -> Option<String> {
    let text: Vec<&str> = outputs
        .iter()
        .take_while(|output| output.is_stream())
        .filter_map(|output| match output {
            KernelOutput::Stream { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text.concat().trim().to_string())
    }
}

/// No output at all, or a Python traceback, means nbconvert failed.
pub fn is_export_failed(text: Option<&str>) -> bool {
    match text {
        None => true,
        Some(text) => text.is_empty() || text.contains(TRACEBACK_MARKER),
    }
}

/// Turn the repr of a Python string (`'/home/jovyan'`) back into the string.
fn unquote_python_str(repr: &str) -> Option<String> {
    let repr = repr.trim();
    let inner = repr
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| repr.strip_prefix('"').and_then(|s| s.strip_suffix('"')))?;
    Some(inner.replace("\\\\", "\\"))
}

/// Decode a base64 payload from the contents API, which wraps lines.
pub fn decode_base64_content(content: &str) -> Result<Vec<u8>> {
    let compact: String = content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}

/// Ask the kernel for its working directory.
pub async fn working_directory(session: &dyn KernelSession) -> Option<String> {
    let outputs = match session.execute_silently(CWD_PROBE).await {
        Ok(outputs) => outputs,
        Err(e) => {
            log::debug!("Failed to get kernel working directory: {:#}", e);
            return None;
        }
    };
    match outputs.first() {
        Some(output @ KernelOutput::ExecuteResult { .. }) => {
            output.plain_text().and_then(unquote_python_str)
        }
        _ => None,
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(ExportError::Cancelled)
    } else {
        Ok(())
    }
}

/// Exports notebooks attached to remote kernels.
pub struct NotebookExporter {
    kernels: Arc<dyn KernelProvider>,
    connection: Arc<dyn JupyterConnection>,
    fs: Arc<dyn FileSystem>,
}

impl NotebookExporter {
    pub fn new(
        kernels: Arc<dyn KernelProvider>,
        connection: Arc<dyn JupyterConnection>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            kernels,
            connection,
            fs,
        }
    }

    /// Serialize the notebook the way it would be saved to disk.
    pub fn get_contents(&self, document: &dyn NotebookDocument) -> Result<String> {
        serialize_notebook(&document.notebook_json())
    }

    /// Export into `target_dir`, naming the file after `default_file_name` or
    /// the document.
    ///
    /// Returns the path written, or `None` if nothing was exported.
    pub async fn execute_command(
        &self,
        document: &dyn NotebookDocument,
        default_file_name: Option<&str>,
        format: ExportFormat,
        target_dir: &Path,
        interpreter: Option<&PythonEnvironment>,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>> {
        let name = match default_file_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.trim_end_matches(".ipynb").to_string(),
            None => document_stem(document.uri()),
        };
        let destination = target_dir.join(format!("{}{}", name, format.extension()));

        if self
            .export_to(document, &destination, format, interpreter, cancel)
            .await?
        {
            Ok(Some(destination))
        } else {
            Ok(None)
        }
    }

    /// Convert `document` to `format` and write it to `destination`.
    ///
    /// Does nothing when the document has no started remote kernel or is
    /// saved to a local file.
    pub async fn export(
        &self,
        document: &dyn NotebookDocument,
        destination: &Path,
        format: ExportFormat,
        interpreter: Option<&PythonEnvironment>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.export_to(document, destination, format, interpreter, cancel)
            .await
            .map(|_| ())
    }

    async fn export_to(
        &self,
        document: &dyn NotebookDocument,
        destination: &Path,
        format: ExportFormat,
        interpreter: Option<&PythonEnvironment>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let uri = document.uri();
        if cancel.is_cancelled() {
            log::debug!("Export of {} cancelled before it started", uri);
            return Ok(false);
        }
        let Some(kernel) = self.kernels.get(uri) else {
            log::debug!("No kernel for {}, skipping export", uri);
            return Ok(false);
        };
        let Some(session) = kernel.session() else {
            log::debug!("Kernel for {} has no session, skipping export", uri);
            return Ok(false);
        };
        let connection = kernel.connection();
        let Some(server) = connection.server() else {
            log::debug!("Kernel for {} is not remote, skipping export", uri);
            return Ok(false);
        };
        if let Some(resource) = document.associated_resource() {
            log::debug!(
                "{} is saved to {}, skipping remote export",
                uri,
                resource.display()
            );
            return Ok(false);
        }
        if let Some(interpreter) = interpreter {
            log::debug!(
                "Ignoring interpreter {} for remote export of {}",
                interpreter.id,
                uri
            );
        }

        let info = self.connection.connection_info(server).await?;
        let contents_manager = self.connection.contents_manager(&info);
        let contents = self.get_contents(document)?;

        let exported = invoke_with_file_synced(
            uri,
            &contents,
            connection,
            &info,
            contents_manager.clone(),
            |file| {
                self.convert(
                    file,
                    session.as_ref(),
                    contents_manager.as_ref(),
                    destination,
                    format,
                    cancel,
                )
            },
        )
        .await?;

        drop(contents_manager);
        if exported.is_some() {
            log::info!("Exported {} to {}", uri, destination.display());
        }
        Ok(exported.is_some())
    }

    async fn convert(
        &self,
        file: Arc<BackingFile>,
        session: &dyn KernelSession,
        contents: &dyn ContentsManager,
        destination: &Path,
        format: ExportFormat,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_cancelled(cancel)?;

        // TODO: stage the backing file next to the kernel's cwd instead of
        // joining the cwd with a server-root relative path.
        let remote_path = match working_directory(session).await {
            Some(cwd) => format!("{}/{}", cwd.trim_end_matches('/'), file.path()),
            None => {
                log::warn!(
                    "Kernel working directory unknown, passing {} to nbconvert as is",
                    file.path()
                );
                file.path().to_string()
            }
        };

        check_cancelled(cancel)?;
        let temp_target = contents
            .new_untitled(
                "",
                NewUntitledRequest {
                    content_type: ContentType::File,
                    ext: Some(format.extension().to_string()),
                },
            )
            .await?;

        let result = self
            .convert_into(
                session,
                contents,
                &remote_path,
                &temp_target.path,
                destination,
                format,
                cancel,
            )
            .await;

        if let Err(e) = contents.delete(&temp_target.path).await {
            log::warn!("Failed to delete {}: {:#}", temp_target.path, e);
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn convert_into(
        &self,
        session: &dyn KernelSession,
        contents: &dyn ContentsManager,
        remote_path: &str,
        temp_target: &str,
        destination: &Path,
        format: ExportFormat,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_cancelled(cancel)?;
        let command = nbconvert_command(remote_path, format, temp_target);
        log::debug!("Running {}", command);
        let outputs = session.execute_silently(&command).await?;

        let text = parse_stream_output(&outputs);
        if is_export_failed(text.as_deref()) {
            let message = text
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| GENERIC_EXPORT_FAILURE.to_string());
            return Err(ExportError::ConversionFailed(message));
        }
        if let Some(text) = &text {
            log::debug!("nbconvert: {}", text);
        }

        check_cancelled(cancel)?;
        if format.is_binary() {
            let model = contents.get(temp_target, GetOptions::base64_file()).await?;
            let bytes = decode_base64_content(model.text().unwrap_or_default())?;
            self.fs.write_file(destination, &bytes).await?;
        } else {
            let model = contents.get(temp_target, GetOptions::text_file()).await?;
            self.fs
                .write_file(destination, model.text().unwrap_or_default().as_bytes())
                .await?;
        }
        Ok(())
    }
}

//! Temporary copies of a notebook on a remote server.
//!
//! A notebook that only exists in the editor has to be written to the
//! server's filesystem before a kernel there can read it. The copy is
//! called the backing file and never outlives the operation that made it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jupyter_remote::{ContentType, NewUntitledRequest, SaveRequest};
use url::Url;

use crate::connection::RemoteConnectionInfo;
use crate::contents::ContentsManager;
use crate::document::{document_stem, parse_v4_notebook};
use crate::error::Result;
use crate::kernel::KernelConnectionMetadata;

/// Marker placed in backing file names so they are recognizable on the server.
const BACKING_FILE_MARKER: &str = "-jvsc-";

/// A notebook file on the remote server that is deleted on disposal.
pub struct BackingFile {
    path: String,
    contents: Arc<dyn ContentsManager>,
    disposed: AtomicBool,
}

impl BackingFile {
    /// Create an empty backing file for `resource` in the server root.
    ///
    /// Returns `None` if the server would not create the file.
    pub async fn create(resource: &Url, contents: Arc<dyn ContentsManager>) -> Option<Self> {
        let untitled = match contents
            .new_untitled(
                "",
                NewUntitledRequest {
                    content_type: ContentType::Notebook,
                    ext: None,
                },
            )
            .await
        {
            Ok(model) => model,
            Err(e) => {
                log::warn!("Failed to create backing file for {}: {:#}", resource, e);
                return None;
            }
        };

        let name = backing_file_name(resource);
        let dir = untitled
            .path
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .unwrap_or_default();
        let target = if dir.is_empty() {
            name
        } else {
            format!("{}/{}", dir, name)
        };

        let path = match contents.rename(&untitled.path, &target).await {
            Ok(model) => model.path,
            Err(e) => {
                log::debug!("Keeping untitled backing file {}: {:#}", untitled.path, e);
                untitled.path
            }
        };

        Some(Self {
            path,
            contents,
            disposed: AtomicBool::new(false),
        })
    }

    /// Path of the file relative to the server root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Delete the file. Only the first call does anything; failures are
    /// logged and otherwise ignored.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.contents.delete(&self.path).await {
            log::warn!("Failed to delete backing file {}: {:#}", self.path, e);
        }
    }
}

/// `<stem>-jvsc-<uuid>.ipynb`
pub fn backing_file_name(resource: &Url) -> String {
    format!(
        "{}{}{}.ipynb",
        document_stem(resource),
        BACKING_FILE_MARKER,
        uuid::Uuid::new_v4()
    )
}

/// Stage `contents` as a backing file, run `handler` against it, then dispose
/// of the file whatever the handler returned.
///
/// Returns `Ok(None)` without calling the handler when the connection is not
/// remote or no backing file could be created. Failing to write the notebook
/// into the backing file is not fatal.
pub async fn invoke_with_file_synced<T, F, Fut>(
    resource: &Url,
    contents: &str,
    connection: &KernelConnectionMetadata,
    info: &RemoteConnectionInfo,
    contents_manager: Arc<dyn ContentsManager>,
    handler: F,
) -> Result<Option<T>>
where
    F: FnOnce(Arc<BackingFile>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if !connection.is_remote() {
        log::debug!(
            "Not staging {}: connection {} is not remote",
            resource,
            connection.id()
        );
        return Ok(None);
    }

    let notebook = serde_json::to_value(parse_v4_notebook(contents)?)?;

    let Some(file) = BackingFile::create(resource, contents_manager.clone()).await else {
        return Ok(None);
    };
    let file = Arc::new(file);
    log::debug!(
        "Staged {} as {} on {}",
        resource,
        file.path(),
        info.server.base_url
    );

    if let Err(e) = contents_manager
        .save(file.path(), SaveRequest::notebook(notebook))
        .await
    {
        log::warn!("Failed to write backing file {}: {:#}", file.path(), e);
    }

    let result = handler(file.clone()).await;
    file.dispose().await;
    result.map(Some)
}

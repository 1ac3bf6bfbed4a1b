//! # notebook-export
//!
//! Host-side pieces for working with notebooks whose kernels run on a remote
//! Jupyter server.
//!
//! ## What it does
//!
//! - **Export**: [`NotebookExporter`] converts a notebook to HTML, PDF or a
//!   Python script by running `jupyter nbconvert` inside the notebook's remote
//!   kernel, then writes the result locally. Files staged on the server are
//!   always cleaned up.
//! - **Display data**: [`ConnectionDisplayDataProvider`] hands out one shared,
//!   observable [`ConnectionDisplayData`] per kernel connection and fills in
//!   server names and categories in the background.
//! - **Server registration**: [`JupyterServerSelector`] validates a remote
//!   server before storing it, prompting about untrusted certificates on the
//!   legacy flow.
//!
//! Everything the host provides (kernels, settings, prompts, storage) comes in
//! through the traits in [`kernel`], [`connection`], [`display`] and
//! [`selector`]. HTTP backed implementations live alongside them.
//!
//! ```rust,ignore
//! let exporter = NotebookExporter::new(kernels, connection, Arc::new(LocalFileSystem));
//! exporter
//!     .export(&document, Path::new("report.html"), ExportFormat::Html, None, &cancel)
//!     .await?;
//! ```

pub mod backing_file;
pub mod connection;
pub mod contents;
pub mod display;
pub mod document;
pub mod error;
pub mod export;
pub mod format;
pub mod fs;
pub mod kernel;
pub mod selector;

#[cfg(test)]
mod testing;

pub use backing_file::{invoke_with_file_synced, BackingFile};
pub use connection::{
    generate_id_from_remote_provider, JupyterConnection, MemorySettings, RemoteConnectionInfo,
    RemoteConnectionSettings, RemoteJupyterConnection, ServerProviderHandle, ServerUriProvider,
    ServerValidator,
};
pub use contents::ContentsManager;
pub use display::{
    ConnectionDisplayData, ConnectionDisplayDataProvider, DisplayFields, InterpreterService,
    KernelCategories, LocalCategories, ServerDisplayNames,
};
pub use document::{InMemoryNotebook, NotebookDocument};
pub use error::{ConnectionError, ExportError, RemoteServerConnectionError, Result};
pub use export::NotebookExporter;
pub use format::ExportFormat;
pub use fs::{FileSystem, LocalFileSystem};
pub use kernel::{
    EnvironmentType, Kernel, KernelConnectionMetadata, KernelProvider, KernelSession,
    KernelSpecInfo, PythonEnvironment,
};
pub use selector::{
    CertificatePrompts, ErrorReporter, JupyterServerSelector, LogErrorReporter, SelectorConfig,
    ServerUriStore,
};

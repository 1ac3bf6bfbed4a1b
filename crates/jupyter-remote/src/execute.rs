//! Silent code execution on a remote kernel.
//!
//! "Silent" here means the code runs without being recorded in the kernel's
//! history; outputs are still published on iopub and collected for the caller.

use anyhow::{Context, Result};
use jupyter_protocol::{
    media::{Media, MediaType},
    ExecuteRequest, ExecutionState, JupyterMessage, JupyterMessageContent, Stdio,
};
use tokio::sync::Mutex;

use crate::client::RemoteServer;
use crate::websocket::KernelSocket;

/// An output produced by a kernel while running a request.
#[derive(Debug, Clone)]
pub enum KernelOutput {
    Stream { name: String, text: String },
    ExecuteResult { data: Media },
    DisplayData { data: Media },
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

impl KernelOutput {
    pub fn is_stream(&self) -> bool {
        matches!(self, KernelOutput::Stream { .. })
    }

    /// The `text/plain` representation of a rich output.
    pub fn plain_text(&self) -> Option<&str> {
        let data = match self {
            KernelOutput::ExecuteResult { data } | KernelOutput::DisplayData { data } => data,
            _ => return None,
        };
        data.content.iter().find_map(|media| match media {
            MediaType::Plain(text) => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Convert an iopub message into an output, if it is one.
pub fn message_to_output(content: &JupyterMessageContent) -> Option<KernelOutput> {
    match content {
        JupyterMessageContent::StreamContent(stream) => Some(KernelOutput::Stream {
            name: match stream.name {
                Stdio::Stdout => "stdout".to_string(),
                Stdio::Stderr => "stderr".to_string(),
            },
            text: stream.text.clone(),
        }),
        JupyterMessageContent::ExecuteResult(result) => Some(KernelOutput::ExecuteResult {
            data: result.data.clone(),
        }),
        JupyterMessageContent::DisplayData(display) => Some(KernelOutput::DisplayData {
            data: display.data.clone(),
        }),
        JupyterMessageContent::ErrorOutput(error) => Some(KernelOutput::Error {
            ename: error.ename.clone(),
            evalue: error.evalue.clone(),
            traceback: error.traceback.clone(),
        }),
        _ => None,
    }
}

/// Gathers the outputs belonging to a single execute request.
///
/// Execution is complete once the kernel reports idle after having reported
/// busy for our request.
#[derive(Debug)]
pub struct ExecutionCollector {
    msg_id: String,
    saw_busy: bool,
    complete: bool,
    outputs: Vec<KernelOutput>,
}

impl ExecutionCollector {
    pub fn new(msg_id: impl Into<String>) -> Self {
        Self {
            msg_id: msg_id.into(),
            saw_busy: false,
            complete: false,
            outputs: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Feed a kernel message. Returns true once execution has finished.
    pub fn handle(&mut self, msg: &JupyterMessage) -> bool {
        let ours = msg
            .parent_header
            .as_ref()
            .map(|h| h.msg_id == self.msg_id)
            .unwrap_or(false);
        if !ours || self.complete {
            return self.complete;
        }

        match &msg.content {
            JupyterMessageContent::Status(status) => match status.execution_state {
                ExecutionState::Busy => self.saw_busy = true,
                ExecutionState::Idle if self.saw_busy => self.complete = true,
                _ => {}
            },
            JupyterMessageContent::ClearOutput(_) => self.outputs.clear(),
            content => {
                if let Some(output) = message_to_output(content) {
                    self.push(output);
                }
            }
        }
        self.complete
    }

    /// Consecutive writes to the same stream become one output, as they do
    /// in a notebook.
    fn push(&mut self, output: KernelOutput) {
        if let (
            Some(KernelOutput::Stream { name, text }),
            KernelOutput::Stream {
                name: next_name,
                text: next_text,
            },
        ) = (self.outputs.last_mut(), &output)
        {
            if name == next_name {
                text.push_str(next_text);
                return;
            }
        }
        self.outputs.push(output);
    }

    pub fn into_outputs(self) -> Vec<KernelOutput> {
        self.outputs
    }
}

/// Build the execute request used for silent execution.
///
/// The protocol's `silent` flag stays off so that outputs still reach iopub;
/// only history is skipped.
pub fn silent_execute_request(code: &str) -> ExecuteRequest {
    ExecuteRequest {
        code: code.to_string(),
        silent: false,
        store_history: false,
        user_expressions: Default::default(),
        allow_stdin: false,
        stop_on_error: false,
    }
}

/// A connection to one kernel on a remote server.
///
/// The websocket is opened on first use and reused afterwards. A failed
/// execution drops the socket so the next call reconnects.
#[derive(Debug)]
pub struct RemoteKernelSession {
    server: RemoteServer,
    kernel_id: String,
    session_id: Option<String>,
    socket: Mutex<Option<KernelSocket>>,
}

impl RemoteKernelSession {
    pub fn new(server: RemoteServer, kernel_id: impl Into<String>) -> Self {
        Self {
            server,
            kernel_id: kernel_id.into(),
            session_id: None,
            socket: Mutex::new(None),
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn kernel_id(&self) -> &str {
        &self.kernel_id
    }

    pub fn server(&self) -> &RemoteServer {
        &self.server
    }

    /// Run `code` and return every output it produced.
    pub async fn execute_silently(&self, code: &str) -> Result<Vec<KernelOutput>> {
        let mut guard = self.socket.lock().await;
        if guard.is_none() {
            let socket = self
                .server
                .connect_to_kernel(&self.kernel_id, self.session_id.as_deref())
                .await?;
            *guard = Some(socket);
        }
        let socket = guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Kernel socket unavailable"))?;

        let result = run_on_socket(socket, code).await;
        if result.is_err() {
            if let Some(socket) = guard.take() {
                let _ = socket.close().await;
            }
        }
        result
    }

    /// Close the websocket, if one is open.
    pub async fn close(&self) -> Result<()> {
        if let Some(socket) = self.socket.lock().await.take() {
            socket.close().await?;
        }
        Ok(())
    }
}

async fn run_on_socket(socket: &mut KernelSocket, code: &str) -> Result<Vec<KernelOutput>> {
    let msg = JupyterMessage::new(silent_execute_request(code), None);
    let mut collector = ExecutionCollector::new(msg.header.msg_id.clone());
    socket
        .send(msg)
        .await
        .context("Failed to send execute request")?;

    while let Some(msg) = socket.next_message().await? {
        if collector.handle(&msg) {
            return Ok(collector.into_outputs());
        }
    }
    anyhow::bail!("Kernel connection closed before execution finished")
}

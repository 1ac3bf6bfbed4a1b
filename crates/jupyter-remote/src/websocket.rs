use anyhow::{Context, Result};
use async_tungstenite::{tokio::ConnectStream, tungstenite::Message, WebSocketStream};
use futures::{SinkExt as _, StreamExt as _};
use jupyter_protocol::{Channel, JupyterMessage};

/// A kernel channels websocket speaking the JSON message protocol.
#[derive(Debug)]
pub struct KernelSocket {
    inner: WebSocketStream<ConnectStream>,
}

impl KernelSocket {
    pub(crate) fn new(inner: WebSocketStream<ConnectStream>) -> Self {
        Self { inner }
    }

    /// Send a message. Messages without a channel go to `shell`.
    pub async fn send(&mut self, mut message: JupyterMessage) -> Result<()> {
        if message.channel.is_none() {
            message.channel = Some(Channel::Shell);
        }
        let text = serde_json::to_string(&message).context("Failed to serialize JupyterMessage")?;
        self.inner
            .send(Message::Text(text.into()))
            .await
            .context("Failed to send kernel message")
    }

    /// Receive the next kernel message, or `None` once the socket closes.
    pub async fn next_message(&mut self) -> Result<Option<JupyterMessage>> {
        while let Some(frame) = self.inner.next().await {
            match frame.context("Kernel websocket error")? {
                Message::Text(text) => {
                    let value: serde_json::Value =
                        serde_json::from_str(&text).context("Failed to parse JSON")?;
                    let message = JupyterMessage::from_value(value)
                        .context("Failed to create JupyterMessage")?;
                    return Ok(Some(message));
                }
                Message::Close(_) => return Ok(None),
                // We never negotiate the binary subprotocol, so binary frames
                // are not messages we can decode.
                Message::Binary(_) | Message::Frame(_) => {
                    log::debug!("jupyter-remote: skipping non-text kernel frame");
                }
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
        Ok(None)
    }

    pub async fn close(mut self) -> Result<()> {
        self.inner
            .close(None)
            .await
            .context("Failed to close kernel websocket")
    }
}

//! Client for the Jupyter Contents API (`/api/contents`).
//!
//! The contents API exposes the server's filesystem as a tree of models keyed
//! by `/`-separated paths relative to the server root.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::client::RemoteServer;

/// The kind of entry a contents model describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    File,
    Notebook,
    Directory,
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            ContentType::File => "file",
            ContentType::Notebook => "notebook",
            ContentType::Directory => "directory",
        }
    }
}

/// How the `content` field of a model is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Text,
    Base64,
    Json,
}

impl ContentFormat {
    fn as_str(&self) -> &'static str {
        match self {
            ContentFormat::Text => "text",
            ContentFormat::Base64 => "base64",
            ContentFormat::Json => "json",
        }
    }
}

/// A contents model as returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentsModel {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    #[serde(default)]
    pub format: Option<ContentFormat>,
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub writable: bool,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

impl ContentsModel {
    /// The `content` field as a string, for `text` and `base64` models.
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(|c| c.as_str())
    }
}

/// Options for fetching a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetOptions {
    pub content_type: ContentType,
    pub format: ContentFormat,
    pub content: bool,
}

impl GetOptions {
    pub fn text_file() -> Self {
        Self {
            content_type: ContentType::File,
            format: ContentFormat::Text,
            content: true,
        }
    }

    pub fn base64_file() -> Self {
        Self {
            content_type: ContentType::File,
            format: ContentFormat::Base64,
            content: true,
        }
    }
}

/// Body for `PUT /api/contents/{path}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRequest {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ContentFormat>,
    pub content: serde_json::Value,
}

impl SaveRequest {
    /// Save a notebook from its parsed JSON.
    pub fn notebook(content: serde_json::Value) -> Self {
        Self {
            content_type: ContentType::Notebook,
            format: Some(ContentFormat::Json),
            content,
        }
    }
}

/// Body for `POST /api/contents/{dir}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUntitledRequest {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
}

#[derive(Serialize)]
struct RenameRequest<'a> {
    path: &'a str,
}

/// Percent-encode each segment of a contents path, keeping the separators.
pub fn encode_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// REST client for one server's contents API.
#[derive(Debug, Clone)]
pub struct ContentsApi {
    server: RemoteServer,
    http: reqwest::Client,
}

impl ContentsApi {
    pub fn new(server: RemoteServer, http: reqwest::Client) -> Self {
        Self { server, http }
    }

    pub fn server(&self) -> &RemoteServer {
        &self.server
    }

    fn url(&self, path: &str) -> String {
        let encoded = encode_path(path);
        if encoded.is_empty() {
            self.server.api_url("contents")
        } else {
            self.server.api_url(&format!("contents/{}", encoded))
        }
    }

    pub async fn get(&self, path: &str, options: GetOptions) -> Result<ContentsModel> {
        let request = self.http.get(self.url(path)).query(&[
            ("type", options.content_type.as_str()),
            ("format", options.format.as_str()),
            ("content", if options.content { "1" } else { "0" }),
        ]);
        let model = self
            .server
            .authorize(request)
            .send()
            .await
            .with_context(|| format!("Failed to get {}", path))?
            .error_for_status()
            .with_context(|| format!("Server refused to read {}", path))?
            .json()
            .await
            .with_context(|| format!("Failed to parse contents model for {}", path))?;
        Ok(model)
    }

    pub async fn save(&self, path: &str, request: &SaveRequest) -> Result<ContentsModel> {
        let model = self
            .server
            .authorize(self.http.put(self.url(path)).json(request))
            .send()
            .await
            .with_context(|| format!("Failed to save {}", path))?
            .error_for_status()
            .with_context(|| format!("Server refused to save {}", path))?
            .json()
            .await
            .with_context(|| format!("Failed to parse contents model for {}", path))?;
        Ok(model)
    }

    /// Create a new untitled file or notebook inside `dir`.
    pub async fn new_untitled(
        &self,
        dir: &str,
        request: &NewUntitledRequest,
    ) -> Result<ContentsModel> {
        let model = self
            .server
            .authorize(self.http.post(self.url(dir)).json(request))
            .send()
            .await
            .context("Failed to create untitled file")?
            .error_for_status()
            .context("Server refused to create untitled file")?
            .json()
            .await
            .context("Failed to parse contents model for untitled file")?;
        Ok(model)
    }

    pub async fn rename(&self, from: &str, to: &str) -> Result<ContentsModel> {
        let model = self
            .server
            .authorize(
                self.http
                    .patch(self.url(from))
                    .json(&RenameRequest { path: to }),
            )
            .send()
            .await
            .with_context(|| format!("Failed to rename {} to {}", from, to))?
            .error_for_status()
            .with_context(|| format!("Server refused to rename {}", from))?
            .json()
            .await
            .context("Failed to parse renamed contents model")?;
        Ok(model)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.server
            .authorize(self.http.delete(self.url(path)))
            .send()
            .await
            .with_context(|| format!("Failed to delete {}", path))?
            .error_for_status()
            .with_context(|| format!("Server refused to delete {}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_path_escapes_segments() {
        assert_eq!(encode_path("/my dir/Untitled 1.ipynb"), "my%20dir/Untitled%201.ipynb");
        assert_eq!(encode_path(""), "");
    }

    #[test]
    fn contents_url_for_root_and_nested() {
        let api = ContentsApi::new(
            RemoteServer::new("http://localhost:8888", "t"),
            reqwest::Client::new(),
        );
        assert_eq!(api.url(""), "http://localhost:8888/api/contents");
        assert_eq!(api.url("a/b.py"), "http://localhost:8888/api/contents/a/b.py");
    }

    #[test]
    fn parses_text_model() {
        let model: ContentsModel = serde_json::from_value(serde_json::json!({
            "name": "untitled.html",
            "path": "work/untitled.html",
            "type": "file",
            "format": "text",
            "content": "<html></html>",
            "mimetype": "text/html",
            "writable": true,
            "created": "2024-01-01T00:00:00Z",
            "last_modified": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(model.content_type, ContentType::File);
        assert_eq!(model.format, Some(ContentFormat::Text));
        assert_eq!(model.text(), Some("<html></html>"));
    }

    #[test]
    fn model_without_content_has_no_text() {
        let model: ContentsModel = serde_json::from_value(serde_json::json!({
            "name": "x.ipynb",
            "path": "x.ipynb",
            "type": "notebook",
            "content": null
        }))
        .unwrap();
        assert_eq!(model.text(), None);
        assert!(!model.writable);
    }

    #[test]
    fn save_request_serializes_type_and_format() {
        let body = serde_json::to_value(SaveRequest::notebook(serde_json::json!({"cells": []})))
            .unwrap();
        assert_eq!(body["type"], "notebook");
        assert_eq!(body["format"], "json");
        assert_eq!(body["content"]["cells"], serde_json::json!([]));
    }

    #[test]
    fn new_untitled_request_omits_missing_ext() {
        let body = serde_json::to_value(NewUntitledRequest {
            content_type: ContentType::Notebook,
            ext: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"type": "notebook"}));
    }
}

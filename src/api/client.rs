use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};

use super::error::ApiError;
use crate::chat::Conversation;
use crate::config::Config;
use crate::graph::workflow::WorkflowDocument;

/// Body chunks of a streamed response, as they come off the socket.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ApiError>>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatSummary {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
}

#[derive(Deserialize)]
struct IdResponse {
    #[serde(deserialize_with = "lenient_string")]
    id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(deserialize_with = "lenient_string")]
    status: String,
}

#[async_trait]
pub trait ArchivistApi: Send + Sync {
    async fn list_agents(&self) -> Result<Vec<String>, ApiError>;
    async fn load_agent_workflow(&self, name: &str) -> Result<WorkflowDocument, ApiError>;
    async fn save_workflow(&self, workflow: &WorkflowDocument) -> Result<(), ApiError>;
    /// Raw node-type table, ready for `WorkflowNodeRegistry::load`.
    async fn node_schema(&self) -> Result<Value, ApiError>;
    async fn new_workflow(&self, name: &str) -> Result<String, ApiError>;
    async fn add_workflow_to_events(&self, name: &str, id: &str) -> Result<String, ApiError>;
    async fn stream_message(&self, text: &str) -> Result<ByteStream, ApiError>;
    async fn stream_edit(&self, text: &str, address: &str) -> Result<ByteStream, ApiError>;
    async fn list_chats(&self) -> Result<Vec<ChatSummary>, ApiError>;
    async fn load_chat(&self, id: &str) -> Result<Conversation, ApiError>;
    async fn new_chat(&self) -> Result<String, ApiError>;
}

pub struct HttpArchivistClient {
    client: Client,
    base_url: String,
}

impl HttpArchivistClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Client with the configured connect timeout. No overall request
    /// timeout is set since chat responses stream for as long as the model
    /// keeps generating.
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self::new(client, &config.server_url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, path: &str, request: RequestBuilder) -> Result<Response, ApiError> {
        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, path, "Archivist request failed");
            return Err(ApiError::Status {
                status,
                path: path.to_string(),
                body,
            });
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self.send(path, self.client.get(self.url(path))).await?;
        decode_json(path, resp).await
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, ApiError> {
        let resp = self
            .send(path, self.client.post(self.url(path)).json(body))
            .await?;
        decode_json(path, resp).await
    }

    async fn post_stream(&self, path: &str, body: Value) -> Result<ByteStream, ApiError> {
        let resp = self
            .send(path, self.client.post(self.url(path)).json(&body))
            .await?;
        tracing::debug!(path, "Streaming response opened");
        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ApiError::from))
            .boxed())
    }
}

#[async_trait]
impl ArchivistApi for HttpArchivistClient {
    async fn list_agents(&self) -> Result<Vec<String>, ApiError> {
        self.get_json("/agent/get_agent_list").await
    }

    async fn load_agent_workflow(&self, name: &str) -> Result<WorkflowDocument, ApiError> {
        let path = format!(
            "/agent/load_agent_workflow/{}",
            utf8_percent_encode(name, NON_ALPHANUMERIC)
        );
        self.get_json(&path).await
    }

    async fn save_workflow(&self, workflow: &WorkflowDocument) -> Result<(), ApiError> {
        let path = "/agent/save_workflow";
        let body = serde_json::to_value(workflow).map_err(|e| ApiError::decode(path, e))?;
        self.send(path, self.client.post(self.url(path)).json(&body))
            .await?;
        Ok(())
    }

    async fn node_schema(&self) -> Result<Value, ApiError> {
        self.get_json("/agent/get_node_list").await
    }

    async fn new_workflow(&self, name: &str) -> Result<String, ApiError> {
        let resp: IdResponse = self
            .post_json("/agent/new_workflow", &json!({ "name": name }))
            .await?;
        Ok(resp.id)
    }

    async fn add_workflow_to_events(&self, name: &str, id: &str) -> Result<String, ApiError> {
        let resp: StatusResponse = self
            .post_json("/agent/add_workflow_to_events", &json!({ "name": name, "id": id }))
            .await?;
        Ok(resp.status)
    }

    async fn stream_message(&self, text: &str) -> Result<ByteStream, ApiError> {
        self.post_stream("/stream", json!({ "text": text })).await
    }

    async fn stream_edit(&self, text: &str, address: &str) -> Result<ByteStream, ApiError> {
        self.post_stream("/save_edit_stream", json!({ "text": text, "address": address }))
            .await
    }

    async fn list_chats(&self) -> Result<Vec<ChatSummary>, ApiError> {
        self.get_json("/get_chat_list").await
    }

    async fn load_chat(&self, id: &str) -> Result<Conversation, ApiError> {
        let path = format!("/load_chat/{}", utf8_percent_encode(id, NON_ALPHANUMERIC));
        self.get_json(&path).await
    }

    async fn new_chat(&self) -> Result<String, ApiError> {
        let resp: IdResponse = self.get_json("/new_chat").await?;
        Ok(resp.id)
    }
}

async fn decode_json<T: DeserializeOwned>(path: &str, resp: Response) -> Result<T, ApiError> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::decode(path, e))
}

/// Ids and statuses come back as strings from some endpoints and numbers
/// from others.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}

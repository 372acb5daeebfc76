//! Native HTTP/WebSocket client implementation using reqwest and
//! tokio-tungstenite.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use session_sync::{ChangeStream, ChangeStreamConnector, PersistenceTransport};
use shared::api::endpoints;
use shared::{
    ApiClientConfig, ApiError, ModelOverview, ModelSettings, PresetOverview, Response, Session,
    SessionId, SessionOverview, TemplateOverview, WorkbenchApi,
};

/// Native API client using reqwest
pub struct NativeApiClient {
    client: Client,
    config: ApiClientConfig,
}

impl NativeApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .cookie_store(true)
                .build()
                .expect("Failed to create HTTP client"),
            config: ApiClientConfig::new(base_url),
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(response.url().path().to_string()));
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .get(self.config.url(endpoint))
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        self.decode(response).await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, ApiError> {
        let mut request = self.client.post(self.config.url(endpoint));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        self.decode(response).await
    }

    async fn post_unit(
        &self,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<(), ApiError> {
        let mut request = self.client.post(self.config.url(endpoint));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::check_status(response).await.map(|_| ())
    }

    async fn put_unit(&self, endpoint: &str, body: &serde_json::Value) -> Result<(), ApiError> {
        let response = self
            .client
            .put(self.config.url(endpoint))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::check_status(response).await.map(|_| ())
    }

    async fn delete_unit(&self, endpoint: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.config.url(endpoint))
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::check_status(response).await.map(|_| ())
    }
}

#[async_trait]
impl WorkbenchApi for NativeApiClient {
    async fn ping(&self) -> Result<(), ApiError> {
        let response = self
            .client
            .get(self.config.url(endpoints::PING))
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::check_status(response).await.map(|_| ())
    }

    async fn session_overview(&self) -> Result<SessionOverview, ApiError> {
        self.get_json(endpoints::SESSIONS).await
    }

    async fn create_session(&self, defaults: Option<ModelSettings>) -> Result<Session, ApiError> {
        let body = defaults
            .map(|d| serde_json::to_value(d).map_err(|e| ApiError::Parse(e.to_string())))
            .transpose()?;
        self.post_json(endpoints::SESSIONS, body.as_ref()).await
    }

    async fn get_session(&self, id: &SessionId) -> Result<Session, ApiError> {
        self.get_json(&endpoints::session(id)).await
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), ApiError> {
        self.delete_unit(&endpoints::session(id)).await
    }

    async fn put_model_settings(
        &self,
        id: &SessionId,
        settings: &ModelSettings,
    ) -> Result<(), ApiError> {
        let body = serde_json::to_value(settings).map_err(|e| ApiError::Parse(e.to_string()))?;
        self.put_unit(&endpoints::session_field(id, "modelSettings"), &body)
            .await
    }

    async fn create_response(&self, id: &SessionId) -> Result<Response, ApiError> {
        self.post_json(&endpoints::responses(id), None).await
    }

    async fn delete_response(&self, id: &SessionId, response_id: &str) -> Result<(), ApiError> {
        self.delete_unit(&endpoints::response(id, response_id)).await
    }

    async fn abort_response(&self, id: &SessionId, response_id: &str) -> Result<(), ApiError> {
        self.post_unit(&endpoints::response_abort(id, response_id), None)
            .await
    }

    async fn create_message(
        &self,
        id: &SessionId,
        response_id: &str,
        text: &str,
    ) -> Result<(), ApiError> {
        let body = serde_json::json!({ "value": text });
        self.post_unit(&endpoints::response_messages(id, response_id), Some(&body))
            .await
    }

    async fn continue_response(&self, id: &SessionId, response_id: &str) -> Result<(), ApiError> {
        self.post_unit(&endpoints::response_continue(id, response_id), None)
            .await
    }

    async fn delete_message(
        &self,
        id: &SessionId,
        response_id: &str,
        message_id: &str,
    ) -> Result<(), ApiError> {
        self.delete_unit(&endpoints::message(id, response_id, message_id))
            .await
    }

    async fn delete_attached_file(&self, id: &SessionId, filename: &str) -> Result<(), ApiError> {
        self.delete_unit(&endpoints::attached_file(id, filename)).await
    }

    async fn model_overview(&self) -> Result<ModelOverview, ApiError> {
        self.get_json(endpoints::MODELS).await
    }

    async fn scan_models(&self) -> Result<ModelOverview, ApiError> {
        self.post_json(endpoints::MODEL_SCAN, None).await
    }

    async fn template_overview(&self) -> Result<TemplateOverview, ApiError> {
        self.get_json(endpoints::TEMPLATES).await
    }

    async fn preset_overview(&self) -> Result<PresetOverview, ApiError> {
        self.get_json(endpoints::PRESETS).await
    }
}

#[async_trait]
impl PersistenceTransport for NativeApiClient {
    async fn write_field(
        &self,
        session_id: &SessionId,
        field: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        let body = serde_json::json!({ "value": value });
        self.put_unit(&endpoints::session_field(session_id, field), &body)
            .await
    }
}

/// Change stream over a WebSocket connection. Text frames are change
/// payloads; everything else is transport housekeeping.
pub struct WsChangeStream {
    inner: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

#[async_trait]
impl ChangeStream for WsChangeStream {
    async fn next(&mut self) -> Option<Result<String, ApiError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                // Pings are answered by tungstenite itself.
                Ok(_) => continue,
                Err(e) => return Some(Err(ApiError::Network(e.to_string()))),
            }
        }
    }
}

/// Opens per-session change streams against the server's WebSocket
/// endpoint.
#[derive(Clone)]
pub struct WsChangeConnector {
    config: ApiClientConfig,
}

impl WsChangeConnector {
    pub fn new(base_url: &str) -> Self {
        Self {
            config: ApiClientConfig::new(base_url),
        }
    }
}

#[async_trait]
impl ChangeStreamConnector for WsChangeConnector {
    type Stream = WsChangeStream;

    async fn connect(&self, session_id: &SessionId) -> Result<WsChangeStream, ApiError> {
        let url = self.config.ws_url(&endpoints::session_changes(session_id));
        let (inner, _response) = connect_async(&url)
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(WsChangeStream { inner })
    }
}

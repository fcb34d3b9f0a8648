//! HTTP+JSON implementation of the game service

use super::models::{
    ApiEnvelope, CreateSessionRequest, Move, PlayRequest, PlayResponse, SessionResponse, SessionSnapshot,
};
use super::GameService;
use crate::errors::ProtocolError;
use crate::games::GameConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use url::Url;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Immutable client settings; a new token means a new value
#[derive(Debug, Clone, PartialEq)]
pub struct ApiClientConfig {
    base_url: Url,
    token: Option<String>,
    timeout: Duration,
}

impl ApiClientConfig {
    pub fn new(base_url: &str) -> Result<Self, ProtocolError> {
        let base_url = Url::parse(base_url)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ProtocolError::UnsupportedBaseUrl {
                url: base_url.to_string(),
                reason: format!("scheme '{}' is not http or https", base_url.scheme()),
            });
        }
        Ok(Self {
            base_url,
            token: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..self.clone()
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Game service client over HTTP
#[derive(Debug, Clone)]
pub struct HttpGameService {
    client: reqwest::Client,
    config: ApiClientConfig,
}

impl HttpGameService {
    pub fn new(config: ApiClientConfig) -> Result<Self, ProtocolError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Same connection pool, different bearer token
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            config: self.config.with_token(token),
        }
    }

    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProtocolError> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProtocolError::UnsupportedBaseUrl {
                url: self.config.base_url.to_string(),
                reason: "URL cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send and unwrap the envelope. For session-addressed calls, a missing
    /// or closed session on the server surfaces as `InvalidSession`.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        session_id: Option<&str>,
    ) -> Result<ApiEnvelope<T>, ProtocolError> {
        let request = match self.config.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiEnvelope<Value>>(&body)
                .map(|envelope| envelope.failure_message())
                .unwrap_or(body);
            tracing::debug!("Backend returned {}: {}", status, message);

            if let Some(id) = session_id {
                if matches!(status, StatusCode::NOT_FOUND | StatusCode::CONFLICT | StatusCode::GONE) {
                    return Err(ProtocolError::InvalidSession(format!("{}: {}", id, message)));
                }
            }
            return Err(ProtocolError::Status { status, body: message });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl GameService for HttpGameService {
    async fn supported_games(&self) -> Result<Vec<GameConfig>, ProtocolError> {
        let url = self.endpoint(&["games", "supported"])?;
        self.send(self.client.get(url), None).await?.into_result()
    }

    async fn create_session(&self, request: &CreateSessionRequest) -> Result<SessionResponse, ProtocolError> {
        let url = self.endpoint(&["games", "create"])?;
        tracing::debug!(
            "Creating {} session for bet {} with proof {}",
            request.game_type,
            request.bet_amount,
            request.deposit_proof
        );
        self.send(self.client.post(url).json(request), None)
            .await?
            .into_result()
    }

    async fn submit_move(
        &self,
        session_id: &str,
        player_move: Option<Move>,
    ) -> Result<PlayResponse, ProtocolError> {
        let url = self.endpoint(&["games", "play"])?;
        let body = PlayRequest {
            session_id: session_id.to_string(),
            player_move,
        };
        self.send(self.client.post(url).json(&body), Some(session_id))
            .await?
            .into_result()
    }

    async fn fetch_session(&self, session_id: &str) -> Result<SessionSnapshot, ProtocolError> {
        let url = self.endpoint(&["games", "session", session_id])?;
        self.send(self.client.get(url), Some(session_id))
            .await?
            .into_result()
    }

    async fn cancel_session(&self, session_id: &str) -> Result<(), ProtocolError> {
        let url = self.endpoint(&["games", "cancel", session_id])?;
        self.send::<Value>(self.client.post(url), Some(session_id))
            .await?
            .into_ack()
    }
}

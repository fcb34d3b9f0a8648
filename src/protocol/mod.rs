//! Backend game service contract
//!
//! `GameService` is the typed request/response surface the orchestrator
//! drives; `HttpGameService` speaks it over HTTP+JSON with bearer auth.

pub mod http;
pub mod models;

use crate::errors::ProtocolError;
use crate::games::GameConfig;
use async_trait::async_trait;

pub use http::{ApiClientConfig, HttpGameService};
pub use models::{
    ApiEnvelope, CreateSessionRequest, Move, PlayRequest, PlayResponse, SessionResponse, SessionSnapshot,
};

#[async_trait]
pub trait GameService: Send + Sync {
    /// Games the backend currently offers, with their bet limits
    async fn supported_games(&self) -> Result<Vec<GameConfig>, ProtocolError>;

    async fn create_session(&self, request: &CreateSessionRequest) -> Result<SessionResponse, ProtocolError>;

    /// Submit one move, or request auto-play when `player_move` is `None`
    async fn submit_move(
        &self,
        session_id: &str,
        player_move: Option<Move>,
    ) -> Result<PlayResponse, ProtocolError>;

    /// Idempotent read used for reconciliation
    async fn fetch_session(&self, session_id: &str) -> Result<SessionSnapshot, ProtocolError>;

    async fn cancel_session(&self, session_id: &str) -> Result<(), ProtocolError>;
}

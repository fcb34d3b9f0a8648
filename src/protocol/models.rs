//! Wire models for the backend game service

use crate::errors::ProtocolError;
use crate::games::{GameKind, SessionResult, SessionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope wrapping every backend response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error.into()),
        }
    }

    /// Human-readable failure text, preferring `error` over `message`
    pub fn failure_message(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "request failed".to_string())
    }

    /// Unwrap the payload; `success = false` is a failure even on HTTP 200
    pub fn into_result(self) -> Result<T, ProtocolError> {
        if !self.success {
            return Err(ProtocolError::Application(self.failure_message()));
        }
        self.data.ok_or(ProtocolError::MissingData)
    }

    /// Check the success flag only, for endpoints with no payload
    pub fn into_ack(self) -> Result<(), ProtocolError> {
        if self.success {
            Ok(())
        } else {
            Err(ProtocolError::Application(self.failure_message()))
        }
    }
}

/// Body of `POST /games/create`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub game_type: GameKind,
    pub bet_amount: f64,
    /// Transaction reference of the confirmed deposit
    pub deposit_proof: String,
    pub client_seed: String,
    pub device_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
    pub game_type: GameKind,
    pub status: SessionStatus,
    #[serde(default)]
    pub game_state: Value,
    #[serde(default)]
    pub result: Option<SessionResult>,
}

/// One player decision; `operation_id` is fresh for every submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Move {
    pub action: String,
    #[serde(default)]
    pub data: Value,
    pub operation_id: String,
}

/// Body of `POST /games/play`; an absent move requests auto-play
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRequest {
    pub session_id: String,
    #[serde(flatten)]
    pub player_move: Option<Move>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayResponse {
    pub status: SessionStatus,
    #[serde(default)]
    pub game_state: Value,
    #[serde(default)]
    pub result: Option<SessionResult>,
}

/// Authoritative server record returned by `GET /games/session/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub game_type: GameKind,
    pub status: SessionStatus,
    #[serde(default)]
    pub game_state: Value,
    #[serde(default)]
    pub result: Option<SessionResult>,
    #[serde(default)]
    pub bet_amount: Option<f64>,
    #[serde(default)]
    pub deposit_proof: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_envelope_on_success_status() {
        let envelope: ApiEnvelope<SessionResponse> =
            serde_json::from_value(json!({"success": false, "error": "Insufficient deposit"})).unwrap();
        let err = envelope.into_result().unwrap_err();
        assert!(matches!(err, ProtocolError::Application(ref m) if m == "Insufficient deposit"));

        let envelope: ApiEnvelope<SessionResponse> =
            serde_json::from_value(json!({"success": false, "message": "Maintenance"})).unwrap();
        assert_eq!(envelope.failure_message(), "Maintenance");
    }

    #[test]
    fn test_missing_data() {
        let envelope: ApiEnvelope<PlayResponse> = serde_json::from_value(json!({"success": true})).unwrap();
        assert!(matches!(envelope.into_result(), Err(ProtocolError::MissingData)));

        let envelope: ApiEnvelope<Value> = serde_json::from_value(json!({"success": true})).unwrap();
        assert!(envelope.into_ack().is_ok());
    }

    #[test]
    fn test_play_request_wire_shape() {
        let auto = PlayRequest {
            session_id: "s1".into(),
            player_move: None,
        };
        assert_eq!(serde_json::to_value(&auto).unwrap(), json!({"sessionId": "s1"}));

        let hit = PlayRequest {
            session_id: "s1".into(),
            player_move: Some(Move {
                action: "hit".into(),
                data: Value::Null,
                operation_id: "op_1".into(),
            }),
        };
        assert_eq!(
            serde_json::to_value(&hit).unwrap(),
            json!({"sessionId": "s1", "action": "hit", "data": null, "operationId": "op_1"})
        );
    }

    #[test]
    fn test_session_response_parsing() {
        let response: SessionResponse = serde_json::from_value(json!({
            "sessionId": "s1",
            "gameType": "dice",
            "status": "completed",
            "gameState": {"roll": 71},
            "result": {"isWin": true, "multiplier": 1.98, "payout": 9.9}
        }))
        .unwrap();
        assert_eq!(response.game_type, GameKind::Dice);
        assert!(response.status.is_terminal());
        assert!(response.result.unwrap().is_win);
    }
}

//! Error types for the stakeflow session client
//!
//! Each layer (configuration, wallet, ledger, backend protocol) has its own
//! error enum. `StakeflowError` wraps them for callers that cross layers, and
//! `ErrorRecord` is the flattened form the orchestrator exposes in its view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Root error type for all stakeflow operations
#[derive(Debug, thiserror::Error)]
pub enum StakeflowError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Wallet / signing collaborator errors
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    /// Ledger submission and query errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Backend game service errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Configuration and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("Missing required field: {0}")]
    MissingRequired(String),
    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Errors raised by the wallet/signing collaborator
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// No signing capability is present
    #[error("Wallet not connected")]
    NotConnected,
    /// The ledger refused the signed transaction
    #[error("Transaction rejected: {0}")]
    Rejected(String),
    /// Signing or broadcasting failed
    #[error("Signing or submission failed: {0}")]
    Submission(String),
}

/// Ledger submission and query errors
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Wallet not connected")]
    NotConnected,
    #[error("Invalid transfer amount: {0}")]
    InvalidAmount(String),
    #[error("Transfer rejected: {0}")]
    TransferRejected(String),
    #[error("Submission failed: {0}")]
    SubmissionFailed(String),
    #[error("Ledger query failed: {0}")]
    QueryFailed(String),
    #[error("Unexpected ledger response: {0}")]
    UnexpectedResponse(String),
}

impl From<WalletError> for LedgerError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::NotConnected => LedgerError::NotConnected,
            WalletError::Rejected(msg) => LedgerError::TransferRejected(msg),
            WalletError::Submission(msg) => LedgerError::SubmissionFailed(msg),
        }
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(e: reqwest::Error) -> Self {
        LedgerError::QueryFailed(e.to_string())
    }
}

/// Backend game service errors
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Request failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    /// `success = false` in the response envelope, even on HTTP 200
    #[error("{0}")]
    Application(String),
    #[error("Invalid session: {0}")]
    InvalidSession(String),
    #[error("Response envelope missing data")]
    MissingData,
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Unsupported base URL {url}: {reason}")]
    UnsupportedBaseUrl { url: String, reason: String },
}

/// Convenience type alias for Results
pub type StakeflowResult<T> = Result<T, StakeflowError>;

/// Classification of failures surfaced through the session view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bet out of bounds or malformed input, rejected before any I/O
    Validation,
    /// No wallet signing capability
    NotConnected,
    TransferRejected,
    SubmissionFailed,
    ConfirmationTimeout,
    /// Deposit landed on the ledger with an execution error
    DepositReverted,
    SessionCreateFailed,
    InvalidSession,
    MoveRejected,
    ReconcileFailed,
    /// Another operation is still outstanding
    Busy,
    /// Operation not legal in the current phase
    InvalidState,
}

impl ErrorKind {
    /// Validation-class errors never reach the network
    pub fn is_validation(&self) -> bool {
        matches!(self, ErrorKind::Validation | ErrorKind::NotConnected)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::NotConnected => "NotConnected",
            ErrorKind::TransferRejected => "TransferRejected",
            ErrorKind::SubmissionFailed => "SubmissionFailed",
            ErrorKind::ConfirmationTimeout => "ConfirmationTimeout",
            ErrorKind::DepositReverted => "DepositReverted",
            ErrorKind::SessionCreateFailed => "SessionCreateFailed",
            ErrorKind::InvalidSession => "InvalidSession",
            ErrorKind::MoveRejected => "MoveRejected",
            ErrorKind::ReconcileFailed => "ReconcileFailed",
            ErrorKind::Busy => "Busy",
            ErrorKind::InvalidState => "InvalidState",
        };
        f.write_str(name)
    }
}

/// Error as recorded in `SessionView::last_error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    /// Pass-through message from the failing layer
    pub message: String,
    pub at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            at: Utc::now(),
        }
    }

    /// Map a transfer-stage failure onto the view taxonomy
    pub fn from_transfer(e: &LedgerError) -> Self {
        let kind = match e {
            LedgerError::NotConnected => ErrorKind::NotConnected,
            LedgerError::InvalidAmount(_) => ErrorKind::Validation,
            LedgerError::TransferRejected(_) => ErrorKind::TransferRejected,
            LedgerError::SubmissionFailed(_)
            | LedgerError::QueryFailed(_)
            | LedgerError::UnexpectedResponse(_) => ErrorKind::SubmissionFailed,
        };
        Self::new(kind, e.to_string())
    }

    /// Map a play-stage failure; unknown or finished sessions become `InvalidSession`
    pub fn from_move(e: &ProtocolError) -> Self {
        let kind = match e {
            ProtocolError::InvalidSession(_) => ErrorKind::InvalidSession,
            _ => ErrorKind::MoveRejected,
        };
        Self::new(kind, e.to_string())
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ErrorRecord {}

impl From<std::io::Error> for ConfigurationError {
    fn from(e: std::io::Error) -> Self {
        ConfigurationError::LoadFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let config_error = ConfigurationError::ValidationFailed("test".to_string());
        let root: StakeflowError = config_error.into();

        assert!(root.to_string().contains("Configuration error"));
        assert!(root.to_string().contains("test"));
        assert!(root.source().is_some());
    }

    #[test]
    fn test_wallet_error_maps_to_ledger_error() {
        assert!(matches!(
            LedgerError::from(WalletError::NotConnected),
            LedgerError::NotConnected
        ));
        assert!(matches!(
            LedgerError::from(WalletError::Rejected("no funds".into())),
            LedgerError::TransferRejected(_)
        ));
        assert!(matches!(
            LedgerError::from(WalletError::Submission("timeout".into())),
            LedgerError::SubmissionFailed(_)
        ));
    }

    #[test]
    fn test_transfer_record_kinds() {
        let record = ErrorRecord::from_transfer(&LedgerError::TransferRejected("empty".into()));
        assert_eq!(record.kind, ErrorKind::TransferRejected);
        assert!(record.message.contains("empty"));

        let record = ErrorRecord::from_transfer(&LedgerError::InvalidAmount("0".into()));
        assert!(record.kind.is_validation());
    }

    #[test]
    fn test_move_record_kinds() {
        let record = ErrorRecord::from_move(&ProtocolError::InvalidSession("s9".into()));
        assert_eq!(record.kind, ErrorKind::InvalidSession);

        let record = ErrorRecord::from_move(&ProtocolError::Application("illegal move".into()));
        assert_eq!(record.kind, ErrorKind::MoveRejected);
        assert_eq!(record.message, "illegal move");
    }

    #[test]
    fn test_kind_display_names() {
        assert_eq!(ErrorKind::Validation.to_string(), "ValidationError");
        assert_eq!(ErrorKind::ConfirmationTimeout.to_string(), "ConfirmationTimeout");
    }
}

//! Session view exposed to callers

use crate::errors::ErrorRecord;
use crate::games::{GameKind, SessionResult, Token};
use crate::ledger::TransactionRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Idle,
    DepositPending,
    DepositConfirming,
    SessionCreating,
    Playing,
    Completed,
    /// Recoverable: retry the deposit, or the move when a session is retained
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Deposit in flight or awaiting verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRecord {
    pub transaction_ref: TransactionRef,
    pub amount: f64,
    pub token: Token,
    /// Polling stops at or before this instant
    pub confirmation_deadline: DateTime<Utc>,
    /// Observed final on the ledger; the stake is spent once a session binds it
    #[serde(default)]
    pub confirmed: bool,
}

/// Snapshot of everything the orchestrator knows about its session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: Option<String>,
    pub game_kind: Option<GameKind>,
    pub phase: Phase,
    /// Last payload from the backend, replaced wholesale
    pub server_state: Value,
    pub result: Option<SessionResult>,
    pub last_error: Option<ErrorRecord>,
    pub deposit: Option<DepositRecord>,
    pub client_seed: Option<String>,
    pub is_loading: bool,
}

impl SessionView {
    /// A server session exists that can still take moves or a cancel
    pub fn is_addressable(&self) -> bool {
        self.session_id.is_some() && matches!(self.phase, Phase::Playing | Phase::Failed)
    }

    /// `start_game` is legal from here. A confirmed deposit that no session
    /// has claimed blocks a fresh transfer until it is reused or reset.
    pub fn can_start(&self) -> bool {
        match self.phase {
            Phase::Idle => true,
            Phase::Failed => self.session_id.is_none() && self.unclaimed_deposit().is_none(),
            _ => false,
        }
    }

    /// Confirmed deposit not yet bound to a server session
    pub fn unclaimed_deposit(&self) -> Option<&DepositRecord> {
        match (&self.session_id, &self.deposit) {
            (None, Some(deposit)) if deposit.confirmed => Some(deposit),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == Phase::Completed
    }
}

//! Scripted collaborator doubles shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use stakeflow::errors::{LedgerError, ProtocolError, WalletError};
use stakeflow::games::{GameConfig, SessionResult, SessionStatus, Token};
use stakeflow::ledger::{LedgerQuery, TokenAccount, TransactionRef, TransactionStatus, TransferInstruction, WalletSigner};
use stakeflow::orchestrator::{OrchestratorSettings, SessionOrchestrator};
use stakeflow::protocol::{CreateSessionRequest, GameService, Move, PlayResponse, SessionResponse, SessionSnapshot};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const HOUSE: &str = "house";
pub const PLAYER: &str = "player";

/// Wallet that hands out pre-arranged transaction references
pub struct ScriptedWallet {
    address: Option<String>,
    refs: Mutex<VecDeque<String>>,
    pub submissions: Mutex<Vec<TransferInstruction>>,
}

impl ScriptedWallet {
    pub fn with_refs(refs: &[&str]) -> Self {
        Self {
            address: Some(PLAYER.to_string()),
            refs: Mutex::new(refs.iter().map(|r| r.to_string()).collect()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            address: None,
            ..Self::with_refs(&[])
        }
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

#[async_trait]
impl WalletSigner for ScriptedWallet {
    fn public_address(&self) -> Option<String> {
        self.address.clone()
    }

    async fn sign_and_submit(&self, instruction: &TransferInstruction) -> Result<TransactionRef, WalletError> {
        self.submissions.lock().unwrap().push(instruction.clone());
        self.refs
            .lock()
            .unwrap()
            .pop_front()
            .map(TransactionRef::new)
            .ok_or_else(|| WalletError::Submission("no scripted reference left".into()))
    }
}

/// Ledger whose transactions become final after a scripted number of polls
pub struct ScriptedLedger {
    source_balance: Option<u64>,
    confirm_at: Mutex<HashMap<String, u64>>,
    revert: Mutex<HashMap<String, String>>,
    polls: Mutex<HashMap<String, u64>>,
    pub account_queries: AtomicU64,
}

impl ScriptedLedger {
    pub fn funded(balance: u64) -> Self {
        Self {
            source_balance: Some(balance),
            confirm_at: Mutex::new(HashMap::new()),
            revert: Mutex::new(HashMap::new()),
            polls: Mutex::new(HashMap::new()),
            account_queries: AtomicU64::new(0),
        }
    }

    pub fn unfunded() -> Self {
        Self {
            source_balance: None,
            ..Self::funded(0)
        }
    }

    /// Report `tx` as included from poll `poll` onwards
    pub fn confirm_after(&self, tx: &str, poll: u64) {
        self.confirm_at.lock().unwrap().insert(tx.to_string(), poll);
    }

    pub fn confirm_now(&self, tx: &str) {
        self.confirm_after(tx, 0);
    }

    pub fn revert(&self, tx: &str, reason: &str) {
        self.revert.lock().unwrap().insert(tx.to_string(), reason.to_string());
    }

    pub fn polls_for(&self, tx: &str) -> u64 {
        self.polls.lock().unwrap().get(tx).copied().unwrap_or(0)
    }

    pub fn total_queries(&self) -> u64 {
        self.polls.lock().unwrap().values().sum::<u64>() + self.account_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerQuery for ScriptedLedger {
    async fn transaction_status(&self, tx: &TransactionRef) -> Result<TransactionStatus, LedgerError> {
        let poll = {
            let mut polls = self.polls.lock().unwrap();
            let count = polls.entry(tx.as_str().to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if let Some(reason) = self.revert.lock().unwrap().get(tx.as_str()) {
            return Ok(TransactionStatus {
                included: true,
                execution_error: Some(Value::String(reason.clone())),
            });
        }
        match self.confirm_at.lock().unwrap().get(tx.as_str()) {
            Some(&at) if poll >= at => Ok(TransactionStatus::confirmed()),
            _ => Ok(TransactionStatus::unknown()),
        }
    }

    async fn token_account(&self, owner: &str, _token: &Token) -> Result<Option<TokenAccount>, LedgerError> {
        self.account_queries.fetch_add(1, Ordering::SeqCst);
        if owner == HOUSE {
            return Ok(Some(TokenAccount {
                address: format!("{}-ata", owner),
                owner: owner.to_string(),
                balance: 0,
            }));
        }
        Ok(self.source_balance.map(|balance| TokenAccount {
            address: format!("{}-ata", owner),
            owner: owner.to_string(),
            balance,
        }))
    }
}

/// Backend double that records every request
#[derive(Default)]
pub struct RecordingService {
    pub creates: Mutex<Vec<CreateSessionRequest>>,
    pub moves: Mutex<Vec<(String, Option<Move>)>>,
    pub cancels: Mutex<Vec<String>>,
    pub create_status: Mutex<Option<SessionStatus>>,
    pub create_error: Mutex<Option<String>>,
    /// Responses handed out in order; an empty queue keeps the session playing
    pub play_responses: Mutex<VecDeque<Result<PlayResponse, String>>>,
    pub snapshot: Mutex<Option<SessionSnapshot>>,
    pub play_delay: Mutex<Duration>,
}

impl RecordingService {
    pub fn push_play(&self, response: Result<PlayResponse, String>) {
        self.play_responses.lock().unwrap().push_back(response);
    }

    pub fn create_count(&self) -> usize {
        self.creates.lock().unwrap().len()
    }

    pub fn move_count(&self) -> usize {
        self.moves.lock().unwrap().len()
    }
}

#[async_trait]
impl GameService for RecordingService {
    async fn supported_games(&self) -> Result<Vec<GameConfig>, ProtocolError> {
        Ok(Vec::new())
    }

    async fn create_session(&self, request: &CreateSessionRequest) -> Result<SessionResponse, ProtocolError> {
        self.creates.lock().unwrap().push(request.clone());
        if let Some(error) = self.create_error.lock().unwrap().clone() {
            return Err(ProtocolError::Application(error));
        }
        Ok(SessionResponse {
            session_id: "s1".to_string(),
            game_type: request.game_type,
            status: self.create_status.lock().unwrap().unwrap_or(SessionStatus::Playing),
            game_state: json!({"hand": ["K", "7"], "dealer": ["9"]}),
            result: None,
        })
    }

    async fn submit_move(&self, session_id: &str, player_move: Option<Move>) -> Result<PlayResponse, ProtocolError> {
        self.moves
            .lock()
            .unwrap()
            .push((session_id.to_string(), player_move));
        let delay = *self.play_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let next = self.play_responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(ProtocolError::Application(message)),
            None => Ok(playing(json!({"moves": self.move_count()}))),
        }
    }

    async fn fetch_session(&self, session_id: &str) -> Result<SessionSnapshot, ProtocolError> {
        self.snapshot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProtocolError::InvalidSession(session_id.to_string()))
    }

    async fn cancel_session(&self, session_id: &str) -> Result<(), ProtocolError> {
        self.cancels.lock().unwrap().push(session_id.to_string());
        Ok(())
    }
}

pub fn playing(game_state: Value) -> PlayResponse {
    PlayResponse {
        status: SessionStatus::Playing,
        game_state,
        result: None,
    }
}

pub fn completed(is_win: bool, multiplier: f64, payout: f64) -> PlayResponse {
    PlayResponse {
        status: SessionStatus::Completed,
        game_state: json!({"finished": true}),
        result: Some(SessionResult {
            is_win,
            multiplier,
            payout,
        }),
    }
}

pub struct Harness {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub wallet: Arc<ScriptedWallet>,
    pub ledger: Arc<ScriptedLedger>,
    pub service: Arc<RecordingService>,
}

pub fn harness(game: GameConfig, wallet: ScriptedWallet, ledger: ScriptedLedger) -> Harness {
    let wallet = Arc::new(wallet);
    let ledger = Arc::new(ledger);
    let service = Arc::new(RecordingService::default());

    let mut settings = OrchestratorSettings::new(HOUSE, Token::usdc());
    settings.device_fingerprint = "device-hash".to_string();

    let orchestrator = Arc::new(SessionOrchestrator::new(
        game,
        settings,
        wallet.clone(),
        ledger.clone(),
        service.clone(),
    ));
    Harness {
        orchestrator,
        wallet,
        ledger,
        service,
    }
}

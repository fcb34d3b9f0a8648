//! Session orchestrator
//!
//! Drives one game session through deposit, confirmation, session creation
//! and play. The orchestrator owns the only writable `SessionView`; callers
//! read snapshots through `view()` or a subscription.
//!
//! At most one operation is outstanding at a time. A second call while one
//! is in flight is rejected with `ErrorKind::Busy` and leaves the view
//! untouched.

pub mod observers;
pub mod state;

use crate::config::StakeflowConfig;
use crate::errors::{ErrorKind, ErrorRecord};
use crate::games::{GameConfig, Token};
use crate::idempotency::IdempotencyKeys;
use crate::ledger::confirmation::DEFAULT_POLL_INTERVAL;
use crate::ledger::{
    ConfirmationWaiter, Finality, LedgerQuery, LedgerTransferClient, TransactionRef, TransferRequest,
    WalletSigner,
};
use crate::protocol::{CreateSessionRequest, GameService, Move, PlayResponse, SessionResponse};
use chrono::Utc;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub use observers::{Listener, ObserverRegistry, Subscription};
pub use state::{DepositRecord, Phase, SessionView};

/// Per-orchestrator policy
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// House address receiving deposits
    pub recipient: String,
    pub token: Token,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
    /// Cancel an addressable session on the server during `reset`
    pub cancel_on_reset: bool,
    /// Hashed device identifier sent with every session
    pub device_fingerprint: String,
}

impl OrchestratorSettings {
    pub fn new(recipient: impl Into<String>, token: Token) -> Self {
        Self {
            recipient: recipient.into(),
            token,
            confirmation_timeout: Duration::from_millis(30_000),
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel_on_reset: true,
            device_fingerprint: IdempotencyKeys.device_fingerprint("unknown-device"),
        }
    }

    pub fn from_config(config: &StakeflowConfig, raw_device_id: &str) -> Self {
        Self {
            recipient: config.ledger.house_address.clone(),
            token: config.ledger.token.clone(),
            confirmation_timeout: config.confirmation_timeout(),
            poll_interval: config.poll_interval(),
            cancel_on_reset: config.session.cancel_on_reset,
            device_fingerprint: IdempotencyKeys.device_fingerprint(raw_device_id),
        }
    }
}

/// Clears the in-flight flag, and a stale loading indicator, when an
/// operation ends or its future is dropped
struct InFlight<'a> {
    orchestrator: &'a SessionOrchestrator,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let still_loading = self.orchestrator.lock_view().is_loading;
        if still_loading {
            self.orchestrator.update(|view| view.is_loading = false);
        }
        self.orchestrator.in_flight.store(false, Ordering::Release);
    }
}

/// Sequences deposit → confirm → create → play for one game
pub struct SessionOrchestrator {
    game: GameConfig,
    settings: OrchestratorSettings,
    wallet: Arc<dyn WalletSigner>,
    transfers: LedgerTransferClient,
    waiter: ConfirmationWaiter,
    service: Arc<dyn GameService>,
    keys: IdempotencyKeys,
    view: Mutex<SessionView>,
    in_flight: AtomicBool,
    observers: ObserverRegistry,
}

impl SessionOrchestrator {
    pub fn new(
        game: GameConfig,
        settings: OrchestratorSettings,
        wallet: Arc<dyn WalletSigner>,
        ledger: Arc<dyn LedgerQuery>,
        service: Arc<dyn GameService>,
    ) -> Self {
        let waiter = ConfirmationWaiter::with_poll_interval(ledger.clone(), settings.poll_interval);
        Self {
            game,
            settings,
            wallet,
            transfers: LedgerTransferClient::new(ledger),
            waiter,
            service,
            keys: IdempotencyKeys,
            view: Mutex::new(SessionView::default()),
            in_flight: AtomicBool::new(false),
            observers: ObserverRegistry::new(),
        }
    }

    pub fn game(&self) -> &GameConfig {
        &self.game
    }

    /// Current snapshot of the session view
    pub fn view(&self) -> SessionView {
        self.lock_view().clone()
    }

    /// Receive a snapshot after every view mutation
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionView) + Send + Sync + 'static,
    {
        self.observers.subscribe(Arc::new(listener))
    }

    /// Stake `bet` and open a session, generating a fresh client seed
    pub async fn start_game(&self, bet: f64) -> Result<(), ErrorRecord> {
        let seed = self.keys.client_seed();
        self.start_game_with_seed(bet, seed).await
    }

    /// Stake `bet` and open a session using the caller's client seed
    pub async fn start_game_with_seed(&self, bet: f64, client_seed: String) -> Result<(), ErrorRecord> {
        let _flight = self.begin()?;

        let current = self.view();
        if !current.can_start() {
            return Err(self.reject(
                ErrorKind::InvalidState,
                format!("cannot start a game while {}", current.phase),
            ));
        }

        if let Err(e) = self.game.validate_bet(bet) {
            let record = ErrorRecord::new(ErrorKind::Validation, e.to_string());
            tracing::warn!("Rejected bet {} for {}: {}", bet, self.game.kind, record);
            self.update(|view| {
                *view = SessionView {
                    phase: Phase::Failed,
                    last_error: Some(record.clone()),
                    ..SessionView::default()
                }
            });
            return Err(record);
        }

        self.update(|view| {
            *view = SessionView {
                phase: Phase::DepositPending,
                client_seed: Some(client_seed.clone()),
                is_loading: true,
                ..SessionView::default()
            };
        });

        let request = TransferRequest {
            recipient: self.settings.recipient.clone(),
            amount: bet,
            token: self.settings.token.clone(),
        };
        let tx_ref = match self.transfers.submit_transfer(self.wallet.as_ref(), &request).await {
            Ok(tx_ref) => tx_ref,
            Err(e) => return self.fail(ErrorRecord::from_transfer(&e)),
        };

        // Arm the poll deadline before reading the wall clock so the recorded
        // deadline is never earlier than the last poll.
        let timeout = self.settings.confirmation_timeout;
        let deadline = tokio::time::Instant::now() + timeout;
        let deposit = DepositRecord {
            transaction_ref: tx_ref.clone(),
            amount: bet,
            token: self.settings.token.clone(),
            confirmation_deadline: Utc::now()
                + chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::zero()),
            confirmed: false,
        };
        self.update(|view| {
            view.phase = Phase::DepositConfirming;
            view.deposit = Some(deposit.clone());
        });
        tracing::debug!("Deposit {} accepted, confirming until {}", tx_ref, deposit.confirmation_deadline);

        match self.waiter.await_finality_until(&tx_ref, deadline).await {
            Finality::Confirmed => self.create_session(&deposit, client_seed).await,
            Finality::TimedOut => self.fail(ErrorRecord::new(
                ErrorKind::ConfirmationTimeout,
                format!(
                    "transaction {} not confirmed within {}ms",
                    tx_ref,
                    timeout.as_millis()
                ),
            )),
            Finality::Reverted(reason) => self.fail(ErrorRecord::new(
                ErrorKind::DepositReverted,
                format!("transaction {} failed on the ledger: {}", tx_ref, reason),
            )),
        }
    }

    /// Submit one player move with a fresh operation id
    pub async fn submit_move(&self, action: impl Into<String>, data: Value) -> Result<(), ErrorRecord> {
        let _flight = self.begin()?;
        let session_id = self.playable_session()?;

        let player_move = Move {
            action: action.into(),
            data,
            operation_id: self.keys.operation_id(),
        };
        tracing::debug!(
            "Submitting '{}' to session {} as {}",
            player_move.action,
            session_id,
            player_move.operation_id
        );
        self.play(&session_id, Some(player_move)).await
    }

    /// Let the server play out the rest of the session
    pub async fn auto_play(&self) -> Result<(), ErrorRecord> {
        let _flight = self.begin()?;
        let session_id = self.playable_session()?;
        tracing::debug!("Requesting auto-play for session {}", session_id);
        self.play(&session_id, None).await
    }

    /// Forget the session and return to `Idle`; cancels an addressable
    /// server session first when configured to
    pub async fn reset(&self) -> Result<(), ErrorRecord> {
        let _flight = self.begin()?;

        let current = self.view();
        if self.settings.cancel_on_reset && current.is_addressable() {
            if let Some(session_id) = current.session_id.as_deref() {
                match self.service.cancel_session(session_id).await {
                    Ok(()) => tracing::info!("Cancelled session {} on reset", session_id),
                    Err(e) => tracing::warn!("Failed to cancel session {} on reset: {}", session_id, e),
                }
            }
        }

        self.update(|view| *view = SessionView::default());
        tracing::debug!("Session view reset");
        Ok(())
    }

    /// Recover a deposit without transferring again. A deposit that timed
    /// out is re-checked once and, if it has since landed, used as proof for
    /// a new session. A confirmed deposit whose session creation failed is
    /// sent again with the same transaction and client seed.
    pub async fn verify_deposit(&self) -> Result<(), ErrorRecord> {
        let _flight = self.begin()?;

        let current = self.view();
        let seed = current
            .client_seed
            .clone()
            .unwrap_or_else(|| self.keys.client_seed());

        if let Some(deposit) = current.unclaimed_deposit().filter(|_| current.phase == Phase::Failed) {
            tracing::info!("Retrying session creation with deposit {}", deposit.transaction_ref);
            return self.create_session(deposit, seed).await;
        }

        let timed_out = current.phase == Phase::Failed
            && current
                .last_error
                .as_ref()
                .is_some_and(|e| e.kind == ErrorKind::ConfirmationTimeout);
        let (Some(deposit), true) = (current.deposit.clone(), timed_out) else {
            return Err(self.reject(
                ErrorKind::InvalidState,
                "no unclaimed or timed-out deposit to verify".to_string(),
            ));
        };

        self.update(|view| view.is_loading = true);
        let tx_ref = &deposit.transaction_ref;
        match self.waiter.check_once(tx_ref).await {
            Some(Finality::Confirmed) => {
                tracing::info!("Deposit {} confirmed after timeout", tx_ref);
                self.create_session(&deposit, seed).await
            }
            Some(Finality::Reverted(reason)) => self.fail(ErrorRecord::new(
                ErrorKind::DepositReverted,
                format!("transaction {} failed on the ledger: {}", tx_ref, reason),
            )),
            Some(Finality::TimedOut) | None => self.fail(ErrorRecord::new(
                ErrorKind::ConfirmationTimeout,
                format!("transaction {} is still not confirmed", tx_ref),
            )),
        }
    }

    /// Replace local state with the server's record of the session
    pub async fn reconcile(&self) -> Result<(), ErrorRecord> {
        let _flight = self.begin()?;

        let Some(session_id) = self.view().session_id else {
            return Err(self.reject(ErrorKind::InvalidState, "no session to reconcile".to_string()));
        };

        self.update(|view| view.is_loading = true);
        match self.service.fetch_session(&session_id).await {
            Ok(snapshot) => {
                tracing::debug!("Reconciled session {} as {:?}", session_id, snapshot.status);
                self.update(|view| {
                    view.server_state = snapshot.game_state;
                    if snapshot.status.is_terminal() {
                        view.phase = Phase::Completed;
                        view.result = snapshot.result;
                    } else {
                        view.phase = Phase::Playing;
                        view.last_error = None;
                    }
                    view.is_loading = false;
                });
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Reconciling session {} failed: {}", session_id, e);
                let record = ErrorRecord::new(ErrorKind::ReconcileFailed, e.to_string());
                self.update(|view| {
                    view.last_error = Some(record.clone());
                    view.is_loading = false;
                });
                Err(record)
            }
        }
    }

    /// `deposit` must already be final on the ledger
    async fn create_session(&self, deposit: &DepositRecord, client_seed: String) -> Result<(), ErrorRecord> {
        self.update(|view| {
            if let Some(held) = view.deposit.as_mut() {
                held.confirmed = true;
            }
            view.phase = Phase::SessionCreating;
            view.last_error = None;
            view.is_loading = true;
        });

        let request = CreateSessionRequest {
            game_type: self.game.kind,
            bet_amount: deposit.amount,
            deposit_proof: deposit.transaction_ref.as_str().to_string(),
            client_seed,
            device_fingerprint: self.settings.device_fingerprint.clone(),
        };
        let session = match self.service.create_session(&request).await {
            Ok(session) => session,
            Err(e) => {
                return self.fail(ErrorRecord::new(ErrorKind::SessionCreateFailed, e.to_string()));
            }
        };

        let entered_playing = self.adopt_session(session);
        if entered_playing && self.game.auto_resolve {
            if let Some(session_id) = self.view().session_id {
                tracing::debug!("{} resolves server-side, auto-playing {}", self.game.kind, session_id);
                return self.play(&session_id, None).await;
            }
        }
        Ok(())
    }

    /// Returns true when the session entered `Playing`
    fn adopt_session(&self, session: SessionResponse) -> bool {
        let terminal = session.status.is_terminal();
        tracing::info!(
            "Session {} created for {} ({:?})",
            session.session_id,
            session.game_type,
            session.status
        );
        let kind = self.game.kind;
        self.update(|view| {
            view.session_id = Some(session.session_id);
            view.game_kind = Some(kind);
            view.server_state = session.game_state;
            if terminal {
                view.phase = Phase::Completed;
                view.result = session.result;
            } else {
                view.phase = Phase::Playing;
            }
            view.is_loading = false;
        });
        !terminal
    }

    async fn play(&self, session_id: &str, player_move: Option<Move>) -> Result<(), ErrorRecord> {
        self.update(|view| view.is_loading = true);
        match self.service.submit_move(session_id, player_move).await {
            Ok(response) => {
                self.apply_play(response);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Move on session {} rejected: {}", session_id, e);
                self.fail(ErrorRecord::from_move(&e))
            }
        }
    }

    fn apply_play(&self, response: PlayResponse) {
        let terminal = response.status.is_terminal();
        self.update(|view| {
            view.server_state = response.game_state;
            view.last_error = None;
            if terminal {
                view.phase = Phase::Completed;
                view.result = response.result;
            } else {
                view.phase = Phase::Playing;
            }
            view.is_loading = false;
        });
        if terminal {
            tracing::info!("Session completed");
        }
    }

    /// Session id that may take a move; otherwise records `InvalidSession`
    fn playable_session(&self) -> Result<String, ErrorRecord> {
        let current = self.view();
        match current.session_id {
            Some(id) if current.is_addressable() => Ok(id),
            Some(id) => Err(self.record(ErrorRecord::new(
                ErrorKind::InvalidSession,
                format!("session {} is {}", id, current.phase),
            ))),
            None => Err(self.record(ErrorRecord::new(
                ErrorKind::InvalidSession,
                "no active session".to_string(),
            ))),
        }
    }

    fn begin(&self) -> Result<InFlight<'_>, ErrorRecord> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ErrorRecord::new(ErrorKind::Busy, "another operation is in progress"))?;
        Ok(InFlight { orchestrator: self })
    }

    /// Enter `Failed` with `record`
    fn fail(&self, record: ErrorRecord) -> Result<(), ErrorRecord> {
        tracing::warn!("Session failed: {}", record);
        self.update(|view| {
            view.phase = Phase::Failed;
            view.last_error = Some(record.clone());
            view.is_loading = false;
        });
        Err(record)
    }

    /// Record an error without changing phase
    fn record(&self, record: ErrorRecord) -> ErrorRecord {
        self.update(|view| view.last_error = Some(record.clone()));
        record
    }

    /// Reject without touching the view
    fn reject(&self, kind: ErrorKind, message: String) -> ErrorRecord {
        tracing::debug!("Rejected operation: {}", message);
        ErrorRecord::new(kind, message)
    }

    fn lock_view(&self) -> MutexGuard<'_, SessionView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one mutation and emit the resulting snapshot outside the lock
    fn update<R>(&self, mutate: impl FnOnce(&mut SessionView) -> R) -> R {
        let (out, snapshot) = {
            let mut view = self.lock_view();
            let out = mutate(&mut view);
            (out, view.clone())
        };
        self.observers.emit(&snapshot);
        out
    }
}

//! In-process devnet ledger
//!
//! A small ledger with token accounts, ed25519-signed submissions and a
//! configurable finality delay. Useful for local development and as the ledger
//! behind tests that need real transfer semantics.

use super::{
    InstructionStep, LedgerQuery, TokenAccount, TransactionRef, TransactionStatus,
    TransferInstruction, WalletSigner,
};
use crate::errors::{LedgerError, WalletError};
use crate::games::Token;
use async_trait::async_trait;
use dashmap::DashMap;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Transaction as recorded by the devnet
#[derive(Debug, Clone)]
struct LocalTransaction {
    accepted_at: Instant,
    execution_error: Option<String>,
}

/// Signed submission handed from a wallet to the ledger
#[derive(Debug, Clone)]
pub struct SignedSubmission {
    pub instruction: TransferInstruction,
    pub nonce: u64,
    pub signature: Signature,
}

impl SignedSubmission {
    fn message(instruction: &TransferInstruction, nonce: u64) -> Result<Vec<u8>, WalletError> {
        bincode::serialize(&(instruction, nonce))
            .map_err(|e| WalletError::Submission(format!("failed to encode instruction: {}", e)))
    }
}

fn token_key(token: &Token) -> String {
    match &token.mint_address {
        Some(mint) => mint.clone(),
        None => format!("native:{}", token.symbol),
    }
}

fn account_address(owner: &str, token: &Token) -> String {
    let mut hasher = Sha256::new();
    hasher.update(owner.as_bytes());
    hasher.update(token_key(token).as_bytes());
    hex::encode(&hasher.finalize()[..20])
}

/// Devnet ledger state
pub struct LocalLedger {
    /// (owner, token key) -> balance in base units
    balances: Mutex<HashMap<(String, String), u64>>,
    transactions: DashMap<TransactionRef, LocalTransaction>,
    finality_delay: Duration,
    revert_next: Mutex<Option<String>>,
}

impl LocalLedger {
    /// Ledger whose transactions are final as soon as they are accepted
    pub fn new() -> Self {
        Self::with_finality_delay(Duration::ZERO)
    }

    pub fn with_finality_delay(finality_delay: Duration) -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            transactions: DashMap::new(),
            finality_delay,
            revert_next: Mutex::new(None),
        }
    }

    /// Credit `amount` base units, creating the account if needed
    pub fn mint(&self, owner: &str, token: &Token, amount: u64) {
        let mut balances = self.lock_balances();
        *balances
            .entry((owner.to_string(), token_key(token)))
            .or_insert(0) += amount;
    }

    pub fn balance(&self, owner: &str, token: &Token) -> Option<u64> {
        self.lock_balances()
            .get(&(owner.to_string(), token_key(token)))
            .copied()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// The next accepted submission lands with this execution error and moves no funds
    pub fn revert_next(&self, reason: &str) {
        if let Ok(mut slot) = self.revert_next.lock() {
            *slot = Some(reason.to_string());
        }
    }

    fn lock_balances(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), u64>> {
        self.balances.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Verify and apply a signed submission atomically
    pub fn submit(&self, submission: SignedSubmission) -> Result<TransactionRef, WalletError> {
        let SignedSubmission {
            instruction,
            nonce,
            signature,
        } = submission;

        let key_bytes: [u8; 32] = hex::decode(&instruction.fee_payer)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| WalletError::Rejected("fee payer is not a valid public key".to_string()))?;
        let verifying_key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| WalletError::Rejected(format!("invalid fee payer key: {}", e)))?;
        let message = SignedSubmission::message(&instruction, nonce)?;
        verifying_key
            .verify(&message, &signature)
            .map_err(|_| WalletError::Rejected("signature verification failed".to_string()))?;

        let tx_ref = TransactionRef::new(hex::encode(Sha256::digest(signature.to_bytes())));
        let reverted = self
            .revert_next
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());

        if reverted.is_none() {
            self.apply(&instruction)?;
        }

        tracing::debug!(
            "Devnet accepted {} ({} steps, reverted: {})",
            tx_ref,
            instruction.steps.len(),
            reverted.is_some()
        );
        self.transactions.insert(
            tx_ref.clone(),
            LocalTransaction {
                accepted_at: Instant::now(),
                execution_error: reverted,
            },
        );
        Ok(tx_ref)
    }

    fn apply(&self, instruction: &TransferInstruction) -> Result<(), WalletError> {
        let mut balances = self.lock_balances();
        // Work on a copy so a failing step leaves no partial effects
        let mut staged = balances.clone();

        for step in &instruction.steps {
            match step {
                InstructionStep::CreateTokenAccount { owner, token } => {
                    staged.entry((owner.clone(), token_key(token))).or_insert(0);
                }
                InstructionStep::Transfer {
                    from,
                    to,
                    token,
                    amount,
                } => {
                    if from != &instruction.fee_payer {
                        return Err(WalletError::Rejected(format!(
                            "{} cannot move funds of {}",
                            instruction.fee_payer, from
                        )));
                    }
                    let key = token_key(token);
                    let source = staged
                        .get_mut(&(from.clone(), key.clone()))
                        .ok_or_else(|| WalletError::Rejected(format!("{} has no source account", from)))?;
                    if *source < *amount {
                        return Err(WalletError::Rejected("insufficient funds".to_string()));
                    }
                    *source -= amount;
                    let destination = if token.is_native() {
                        staged.entry((to.clone(), key)).or_insert(0)
                    } else {
                        staged
                            .get_mut(&(to.clone(), key))
                            .ok_or_else(|| WalletError::Rejected(format!("{} has no destination account", to)))?
                    };
                    *destination += amount;
                }
            }
        }

        *balances = staged;
        Ok(())
    }
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerQuery for LocalLedger {
    async fn transaction_status(&self, tx: &TransactionRef) -> Result<TransactionStatus, LedgerError> {
        let Some(record) = self.transactions.get(tx) else {
            return Ok(TransactionStatus::unknown());
        };
        if record.accepted_at.elapsed() < self.finality_delay {
            return Ok(TransactionStatus::unknown());
        }
        Ok(TransactionStatus {
            included: true,
            execution_error: record
                .execution_error
                .as_ref()
                .map(|reason| serde_json::Value::String(reason.clone())),
        })
    }

    async fn token_account(&self, owner: &str, token: &Token) -> Result<Option<TokenAccount>, LedgerError> {
        Ok(self.balance(owner, token).map(|balance| TokenAccount {
            address: account_address(owner, token),
            owner: owner.to_string(),
            balance,
        }))
    }
}

/// Devnet wallet holding an ed25519 key
pub struct LocalWallet {
    signing_key: Option<SigningKey>,
    ledger: Arc<LocalLedger>,
}

impl LocalWallet {
    pub fn generate(ledger: Arc<LocalLedger>) -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng), ledger)
    }

    pub fn from_signing_key(signing_key: SigningKey, ledger: Arc<LocalLedger>) -> Self {
        Self {
            signing_key: Some(signing_key),
            ledger,
        }
    }

    /// Wallet without signing capability
    pub fn disconnected(ledger: Arc<LocalLedger>) -> Self {
        Self {
            signing_key: None,
            ledger,
        }
    }
}

#[async_trait]
impl WalletSigner for LocalWallet {
    fn public_address(&self) -> Option<String> {
        self.signing_key
            .as_ref()
            .map(|key| hex::encode(key.verifying_key().to_bytes()))
    }

    async fn sign_and_submit(
        &self,
        instruction: &TransferInstruction,
    ) -> Result<TransactionRef, WalletError> {
        let key = self.signing_key.as_ref().ok_or(WalletError::NotConnected)?;
        let nonce = OsRng.next_u64();
        let message = SignedSubmission::message(instruction, nonce)?;
        let signature = key.sign(&message);

        self.ledger.submit(SignedSubmission {
            instruction: instruction.clone(),
            nonce,
            signature,
        })
    }
}

//! Ledger collaborators
//!
//! The wallet signs and broadcasts, the ledger query side reports balances and
//! transaction status. Both are traits so the orchestrator can run against a
//! real RPC node, the in-process devnet, or test doubles.

pub mod confirmation;
pub mod local;
pub mod rpc;
pub mod transfer;

use crate::errors::{LedgerError, WalletError};
use crate::games::Token;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use confirmation::{ConfirmationWaiter, Finality};
pub use local::{LocalLedger, LocalWallet};
pub use rpc::RpcLedger;
pub use transfer::{LedgerTransferClient, TransferRequest};

/// Ledger-assigned transaction identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionRef(String);

impl TransactionRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inclusion status of a submitted transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatus {
    pub included: bool,
    #[serde(default)]
    pub execution_error: Option<serde_json::Value>,
}

impl TransactionStatus {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn confirmed() -> Self {
        Self {
            included: true,
            execution_error: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.included && self.execution_error.is_none()
    }
}

/// Token-holding account of an owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAccount {
    pub address: String,
    pub owner: String,
    /// Balance in base units
    pub balance: u64,
}

/// One step of an atomic ledger submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionStep {
    /// Create the destination's token-holding account
    CreateTokenAccount { owner: String, token: Token },
    Transfer {
        from: String,
        to: String,
        token: Token,
        amount: u64,
    },
}

/// Ordered steps applied atomically by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInstruction {
    pub steps: Vec<InstructionStep>,
    /// Payer and signer of the submission
    pub fee_payer: String,
}

impl TransferInstruction {
    /// Total base units moved by transfer steps
    pub fn transfer_amount(&self) -> u64 {
        self.steps
            .iter()
            .map(|step| match step {
                InstructionStep::Transfer { amount, .. } => *amount,
                InstructionStep::CreateTokenAccount { .. } => 0,
            })
            .sum()
    }

    pub fn creates_account(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s, InstructionStep::CreateTokenAccount { .. }))
    }
}

/// Wallet/signing collaborator; never exposes key material
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Public address of the connected wallet, `None` when disconnected
    fn public_address(&self) -> Option<String>;

    /// Sign and broadcast; returns once the ledger accepts the transaction
    async fn sign_and_submit(
        &self,
        instruction: &TransferInstruction,
    ) -> Result<TransactionRef, WalletError>;
}

/// Read side of the ledger, shared across orchestrators
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    async fn transaction_status(&self, tx: &TransactionRef) -> Result<TransactionStatus, LedgerError>;

    async fn token_account(&self, owner: &str, token: &Token) -> Result<Option<TokenAccount>, LedgerError>;
}

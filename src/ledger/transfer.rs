//! Token transfer submission
//!
//! Builds exactly one atomic submission per call: an optional create-account
//! step for a missing destination followed by the transfer itself. Returns as
//! soon as the ledger accepts the transaction; finality is the waiter's job.

use super::{
    InstructionStep, LedgerQuery, TransactionRef, TransferInstruction, WalletSigner,
};
use crate::errors::LedgerError;
use crate::games::Token;
use std::sync::Arc;

/// Parameters of one deposit
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub recipient: String,
    /// Amount in UI units, converted with `token.decimals`
    pub amount: f64,
    pub token: Token,
}

/// Submits deposits to the ledger on behalf of the user
#[derive(Clone)]
pub struct LedgerTransferClient {
    ledger: Arc<dyn LedgerQuery>,
}

impl LedgerTransferClient {
    pub fn new(ledger: Arc<dyn LedgerQuery>) -> Self {
        Self { ledger }
    }

    /// Submit a transfer; never retried here. A resubmission by the caller
    /// mints a new transaction reference.
    pub async fn submit_transfer(
        &self,
        sender: &dyn WalletSigner,
        request: &TransferRequest,
    ) -> Result<TransactionRef, LedgerError> {
        let amount = request.token.to_base_units(request.amount).ok_or_else(|| {
            LedgerError::InvalidAmount(format!(
                "{} {} is not a positive amount at {} decimals",
                request.amount, request.token.symbol, request.token.decimals
            ))
        })?;
        if request.recipient.is_empty() {
            return Err(LedgerError::InvalidAmount("recipient address is empty".to_string()));
        }
        let owner = sender.public_address().ok_or(LedgerError::NotConnected)?;

        let instruction = self.build_instruction(&owner, request, amount).await?;

        tracing::debug!(
            "Submitting transfer of {} base units of {} from {} to {} (create account: {})",
            amount,
            request.token.symbol,
            owner,
            request.recipient,
            instruction.creates_account()
        );
        let tx_ref = sender.sign_and_submit(&instruction).await.map_err(|e| {
            tracing::warn!("Transfer submission from {} failed: {}", owner, e);
            LedgerError::from(e)
        })?;

        tracing::info!("Transfer accepted by ledger as {}", tx_ref);
        Ok(tx_ref)
    }

    async fn build_instruction(
        &self,
        owner: &str,
        request: &TransferRequest,
        amount: u64,
    ) -> Result<TransferInstruction, LedgerError> {
        let source = self
            .ledger
            .token_account(owner, &request.token)
            .await
            .map_err(|e| LedgerError::SubmissionFailed(e.to_string()))?
            .ok_or_else(|| {
                LedgerError::TransferRejected(format!(
                    "{} has no {} account",
                    owner, request.token.symbol
                ))
            })?;

        if source.balance < amount {
            return Err(LedgerError::TransferRejected(format!(
                "insufficient {} balance: have {}, need {}",
                request.token.symbol, source.balance, amount
            )));
        }

        let destination = self
            .ledger
            .token_account(&request.recipient, &request.token)
            .await
            .map_err(|e| LedgerError::SubmissionFailed(e.to_string()))?;

        let mut steps = Vec::with_capacity(2);
        // Native balances need no holding account
        if destination.is_none() && !request.token.is_native() {
            steps.push(InstructionStep::CreateTokenAccount {
                owner: request.recipient.clone(),
                token: request.token.clone(),
            });
        }
        steps.push(InstructionStep::Transfer {
            from: owner.to_string(),
            to: request.recipient.clone(),
            token: request.token.clone(),
            amount,
        });

        Ok(TransferInstruction {
            steps,
            fee_payer: owner.to_string(),
        })
    }
}

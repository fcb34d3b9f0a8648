//! JSON-RPC ledger query client
//!
//! Read-only access to a Solana-style RPC node: signature statuses, token
//! accounts by owner and native balances. Stateless per call, so one instance
//! can be shared by every orchestrator in the process.

use super::{LedgerQuery, TokenAccount, TransactionRef, TransactionStatus};
use crate::errors::LedgerError;
use crate::games::Token;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

/// Commitment level a transaction must reach to count as included
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processed" => Some(Commitment::Processed),
            "confirmed" => Some(Commitment::Confirmed),
            "finalized" => Some(Commitment::Finalized),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    confirmation_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeyedAccount {
    pubkey: String,
    account: Value,
}

/// Ledger query over JSON-RPC
pub struct RpcLedger {
    client: reqwest::Client,
    endpoint: Url,
    commitment: Commitment,
    next_id: AtomicU64,
}

impl RpcLedger {
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self, LedgerError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| LedgerError::QueryFailed(format!("invalid RPC URL {}: {}", endpoint, e)))?;
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            commitment: Commitment::Confirmed,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn with_commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = commitment;
        self
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::trace!("RPC {} #{} -> {}", method, id, self.endpoint);
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(LedgerError::QueryFailed(format!(
                "{} returned HTTP {}",
                method,
                response.status()
            )));
        }

        let parsed: RpcResponse<T> = response.json().await?;
        if let Some(error) = parsed.error {
            return Err(LedgerError::QueryFailed(format!(
                "{} failed ({}): {}",
                method, error.code, error.message
            )));
        }
        parsed
            .result
            .ok_or_else(|| LedgerError::UnexpectedResponse(format!("{} returned no result", method)))
    }

    fn reached_commitment(&self, status: &SignatureStatus) -> bool {
        status
            .confirmation_status
            .as_deref()
            .and_then(Commitment::parse)
            .map(|reached| reached >= self.commitment)
            .unwrap_or(false)
    }
}

fn parse_token_amount(account: &Value) -> Option<u64> {
    account
        .pointer("/data/parsed/info/tokenAmount/amount")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

#[async_trait]
impl LedgerQuery for RpcLedger {
    async fn transaction_status(&self, tx: &TransactionRef) -> Result<TransactionStatus, LedgerError> {
        let statuses: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[tx.as_str()], { "searchTransactionHistory": true }]),
            )
            .await?;

        let Some(Some(status)) = statuses.value.into_iter().next() else {
            return Ok(TransactionStatus::unknown());
        };
        Ok(TransactionStatus {
            included: self.reached_commitment(&status),
            execution_error: status.err.filter(|e| !e.is_null()),
        })
    }

    async fn token_account(&self, owner: &str, token: &Token) -> Result<Option<TokenAccount>, LedgerError> {
        let commitment = json!({ "commitment": self.commitment.as_str() });

        let Some(mint) = &token.mint_address else {
            let balance: WithContext<u64> = self.call("getBalance", json!([owner, commitment])).await?;
            return Ok((balance.value > 0).then(|| TokenAccount {
                address: owner.to_string(),
                owner: owner.to_string(),
                balance: balance.value,
            }));
        };

        let accounts: WithContext<Vec<KeyedAccount>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner,
                    { "mint": mint },
                    { "encoding": "jsonParsed", "commitment": self.commitment.as_str() }
                ]),
            )
            .await?;

        let Some(keyed) = accounts.value.into_iter().next() else {
            return Ok(None);
        };
        let balance = parse_token_amount(&keyed.account).ok_or_else(|| {
            LedgerError::UnexpectedResponse(format!("token account {} has no parsed amount", keyed.pubkey))
        })?;
        Ok(Some(TokenAccount {
            address: keyed.pubkey,
            owner: owner.to_string(),
            balance,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use std::net::SocketAddr;

    async fn rpc_handler(Json(body): Json<Value>) -> Json<Value> {
        let id = body["id"].clone();
        let result = match body["method"].as_str().unwrap_or_default() {
            "getSignatureStatuses" => match body["params"][0][0].as_str().unwrap_or_default() {
                "final" => json!({"context": {"slot": 9}, "value": [{"slot": 9, "confirmations": null, "err": null, "confirmationStatus": "finalized"}]}),
                "processing" => json!({"context": {"slot": 9}, "value": [{"slot": 9, "confirmations": 0, "err": null, "confirmationStatus": "processed"}]}),
                "failed" => json!({"context": {"slot": 9}, "value": [{"slot": 9, "confirmations": null, "err": {"InstructionError": [0, {"Custom": 1}]}, "confirmationStatus": "confirmed"}]}),
                "broken" => return Json(json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32602, "message": "Invalid param"}})),
                _ => json!({"context": {"slot": 9}, "value": [null]}),
            },
            "getTokenAccountsByOwner" => match body["params"][0].as_str().unwrap_or_default() {
                "alice" => json!({"context": {"slot": 9}, "value": [{
                    "pubkey": "AliceUsdc111",
                    "account": {"data": {"parsed": {"info": {"tokenAmount": {"amount": "2500000", "decimals": 6}}}}}
                }]}),
                _ => json!({"context": {"slot": 9}, "value": []}),
            },
            "getBalance" => json!({"context": {"slot": 9}, "value": 1_000_000_000u64}),
            _ => Value::Null,
        };
        Json(json!({"jsonrpc": "2.0", "id": id, "result": result}))
    }

    async fn spawn_rpc() -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Router::new().route("/", post(rpc_handler));
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}/"), handle)
    }

    #[tokio::test]
    async fn test_signature_status_mapping() {
        let (url, server) = spawn_rpc().await;
        let ledger = RpcLedger::new(&url, Duration::from_secs(5)).unwrap();

        let status = ledger.transaction_status(&TransactionRef::new("final")).await.unwrap();
        assert!(status.is_confirmed());

        let status = ledger.transaction_status(&TransactionRef::new("processing")).await.unwrap();
        assert!(!status.included);

        let status = ledger.transaction_status(&TransactionRef::new("unknown")).await.unwrap();
        assert_eq!(status, TransactionStatus::unknown());

        let status = ledger.transaction_status(&TransactionRef::new("failed")).await.unwrap();
        assert!(status.included);
        assert!(status.execution_error.is_some());

        server.abort();
    }

    #[tokio::test]
    async fn test_finalized_commitment_is_stricter() {
        let (url, server) = spawn_rpc().await;
        let ledger = RpcLedger::new(&url, Duration::from_secs(5))
            .unwrap()
            .with_commitment(Commitment::Finalized);

        let status = ledger.transaction_status(&TransactionRef::new("failed")).await.unwrap();
        assert!(!status.included);
        let status = ledger.transaction_status(&TransactionRef::new("final")).await.unwrap();
        assert!(status.is_confirmed());

        server.abort();
    }

    #[tokio::test]
    async fn test_rpc_error_surfaces_as_query_failure() {
        let (url, server) = spawn_rpc().await;
        let ledger = RpcLedger::new(&url, Duration::from_secs(5)).unwrap();

        let err = ledger
            .transaction_status(&TransactionRef::new("broken"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::QueryFailed(msg) if msg.contains("Invalid param")));

        server.abort();
    }

    #[tokio::test]
    async fn test_token_accounts() {
        let (url, server) = spawn_rpc().await;
        let ledger = RpcLedger::new(&url, Duration::from_secs(5)).unwrap();

        let account = ledger.token_account("alice", &Token::usdc()).await.unwrap().unwrap();
        assert_eq!(account.address, "AliceUsdc111");
        assert_eq!(account.balance, 2_500_000);

        assert!(ledger.token_account("house", &Token::usdc()).await.unwrap().is_none());

        let native = ledger.token_account("alice", &Token::sol()).await.unwrap().unwrap();
        assert_eq!(native.balance, 1_000_000_000);

        server.abort();
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(RpcLedger::new("not a url", Duration::from_secs(1)).is_err());
    }
}

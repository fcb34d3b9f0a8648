//! Stakeflow - staked game session client
//!
//! Sequences an on-chain deposit, waits for ledger finality, binds the
//! deposit to a backend game session and drives the session's moves to a
//! terminal result. `SessionOrchestrator` is the entry point; the wallet,
//! ledger and backend are collaborators behind traits.

pub mod config;
pub mod errors;
pub mod games;
pub mod idempotency;
pub mod ledger;
pub mod orchestrator;
pub mod protocol;

pub use config::{ConfigBuilder, ConfigLoader, StakeflowConfig};
pub use errors::{ErrorKind, ErrorRecord, StakeflowError, StakeflowResult};
pub use games::{GameCatalog, GameConfig, GameKind, SessionResult, SessionStatus, Token};
pub use idempotency::IdempotencyKeys;
pub use ledger::{LedgerQuery, TransactionRef, WalletSigner};
pub use orchestrator::{OrchestratorSettings, Phase, SessionOrchestrator, SessionView, Subscription};
pub use protocol::{GameService, HttpGameService};

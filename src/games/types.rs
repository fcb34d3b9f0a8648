use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Supported game kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum GameKind {
    Blackjack,
    Dice,
    Slots,
    ShipCaptainCrew,
    CoinFlip,
    /// Kind reported by the backend that this client does not know
    #[serde(other)]
    Unsupported,
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameKind::Blackjack => write!(f, "blackjack"),
            GameKind::Dice => write!(f, "dice"),
            GameKind::Slots => write!(f, "slots"),
            GameKind::ShipCaptainCrew => write!(f, "ship-captain-crew"),
            GameKind::CoinFlip => write!(f, "coin-flip"),
            GameKind::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Stake token with mint address and decimal precision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    pub symbol: String,
    /// `None` for the ledger's native token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mint_address: Option<String>,
    pub decimals: u8,
}

impl Token {
    /// Native SOL token
    pub fn sol() -> Self {
        Self {
            symbol: "SOL".to_string(),
            mint_address: None,
            decimals: 9,
        }
    }

    /// USDC SPL token
    pub fn usdc() -> Self {
        Self {
            symbol: "USDC".to_string(),
            mint_address: Some("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string()),
            decimals: 6,
        }
    }

    pub fn is_native(&self) -> bool {
        self.mint_address.is_none()
    }

    /// Convert a UI amount into base units, rounding to the nearest unit
    pub fn to_base_units(&self, amount: f64) -> Option<u64> {
        if !amount.is_finite() || amount <= 0.0 {
            return None;
        }
        let scaled = (amount * 10f64.powi(self.decimals as i32)).round();
        if scaled < 1.0 || scaled > u64::MAX as f64 {
            return None;
        }
        Some(scaled as u64)
    }
}

/// Per-game betting limits and play style
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    #[serde(rename = "gameType", alias = "kind")]
    pub kind: GameKind,
    #[serde(default)]
    pub name: String,
    pub min_bet: f64,
    pub max_bet: f64,
    /// Server resolves the whole game in a single auto-play call
    #[serde(default)]
    pub auto_resolve: bool,
}

/// Bet rejected before any network call
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BetValidationError {
    #[error("Bet amount must be a positive number, got {0}")]
    NotPositive(f64),
    #[error("Bet {bet} outside {kind} limits [{min}, {max}]")]
    OutOfRange {
        kind: GameKind,
        bet: f64,
        min: f64,
        max: f64,
    },
}

impl GameConfig {
    pub fn new(kind: GameKind, min_bet: f64, max_bet: f64) -> Self {
        Self {
            kind,
            name: kind.to_string(),
            min_bet,
            max_bet,
            auto_resolve: false,
        }
    }

    pub fn auto_resolving(mut self) -> Self {
        self.auto_resolve = true;
        self
    }

    /// Check a bet against `[min_bet, max_bet]`
    pub fn validate_bet(&self, bet: f64) -> Result<(), BetValidationError> {
        if !bet.is_finite() || bet <= 0.0 {
            return Err(BetValidationError::NotPositive(bet));
        }
        if bet < self.min_bet || bet > self.max_bet {
            return Err(BetValidationError::OutOfRange {
                kind: self.kind,
                bet,
                min: self.min_bet,
                max: self.max_bet,
            });
        }
        Ok(())
    }
}

/// Known games keyed by kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameCatalog {
    games: BTreeMap<GameKind, GameConfig>,
}

impl GameCatalog {
    pub fn new(games: impl IntoIterator<Item = GameConfig>) -> Self {
        let games = games
            .into_iter()
            .filter(|g| g.kind != GameKind::Unsupported)
            .map(|g| (g.kind, g))
            .collect();
        Self { games }
    }

    /// Catalog used when neither config nor backend supplies one
    pub fn default_catalog() -> Self {
        Self::new(vec![
            GameConfig::new(GameKind::Dice, 0.01, 100.0).auto_resolving(),
            GameConfig::new(GameKind::Slots, 0.01, 100.0).auto_resolving(),
            GameConfig::new(GameKind::Blackjack, 0.1, 500.0),
            GameConfig::new(GameKind::ShipCaptainCrew, 0.1, 250.0),
        ])
    }

    /// Merge backend-reported games over this catalog; the server's bounds win
    pub fn merge_supported(&self, supported: Vec<GameConfig>) -> Self {
        let mut games = self.games.clone();
        for game in supported {
            if game.kind == GameKind::Unsupported {
                tracing::debug!("Ignoring unsupported game '{}' from backend", game.name);
                continue;
            }
            games.insert(game.kind, game);
        }
        Self { games }
    }

    pub fn get(&self, kind: GameKind) -> Option<&GameConfig> {
        self.games.get(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameConfig> {
        self.games.values()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

/// Session status as reported by the backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    #[serde(alias = "active")]
    Playing,
    Completed,
    Cancelled,
    Expired,
    #[serde(other)]
    Unknown,
}

impl SessionStatus {
    /// No further moves are accepted once a session reaches one of these
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Expired
        )
    }
}

/// Terminal outcome of a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub is_win: bool,
    pub multiplier: f64,
    pub payout: f64,
}

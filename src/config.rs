//! Configuration management for the stakeflow client
//!
//! Settings are loaded from a TOML file, overridden from `STAKEFLOW_*`
//! environment variables and validated before use.

use crate::errors::{ConfigurationError, StakeflowResult};
use crate::games::{GameCatalog, GameConfig, Token};
use crate::ledger::rpc::Commitment;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Top-level client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StakeflowConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default = "default_games")]
    pub games: Vec<GameConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend game service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    pub url: String,
    /// Bearer token; obtained by the login handshake outside this crate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub request_timeout_ms: u64,
}

/// Ledger RPC endpoint and stake token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerConfig {
    pub rpc_url: String,
    /// Recipient of every deposit
    pub house_address: String,
    pub commitment: String,
    pub token: Token,
}

/// Deposit confirmation and session lifecycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub confirmation_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Cancel an addressable session on the server when the view is reset
    pub cancel_on_reset: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_games() -> Vec<GameConfig> {
    GameCatalog::default_catalog().iter().cloned().collect()
}

impl Default for StakeflowConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            ledger: LedgerConfig::default(),
            session: SessionConfig::default(),
            games: default_games(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3001".to_string(),
            auth_token: None,
            request_timeout_ms: 15_000,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8899".to_string(),
            house_address: "HouseVau1t1111111111111111111111111111111111".to_string(),
            commitment: Commitment::Confirmed.as_str().to_string(),
            token: Token::usdc(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_ms: 30_000,
            poll_interval_ms: 1_000,
            cancel_on_reset: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl StakeflowConfig {
    pub fn catalog(&self) -> GameCatalog {
        GameCatalog::new(self.games.clone())
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.session.confirmation_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.session.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.request_timeout_ms)
    }

    /// Commitment level parsed from `ledger.commitment`; validated on load
    pub fn commitment(&self) -> Commitment {
        Commitment::parse(&self.ledger.commitment).unwrap_or(Commitment::Confirmed)
    }
}

/// Configuration loader with environment variable support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> StakeflowResult<StakeflowConfig> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            StakeflowConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> StakeflowResult<StakeflowConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(&self, config: &mut StakeflowConfig) -> StakeflowResult<()> {
        if let Ok(url) = env::var("STAKEFLOW_BACKEND_URL") {
            config.backend.url = url;
        }
        if let Ok(token) = env::var("STAKEFLOW_AUTH_TOKEN") {
            config.backend.auth_token = Some(token).filter(|t| !t.is_empty());
        }

        if let Ok(url) = env::var("STAKEFLOW_RPC_URL") {
            config.ledger.rpc_url = url;
        }
        if let Ok(address) = env::var("STAKEFLOW_HOUSE_ADDRESS") {
            config.ledger.house_address = address;
        }

        if let Ok(timeout) = env::var("STAKEFLOW_CONFIRMATION_TIMEOUT_MS") {
            config.session.confirmation_timeout_ms =
                parse_millis("STAKEFLOW_CONFIRMATION_TIMEOUT_MS", timeout)?;
        }
        if let Ok(interval) = env::var("STAKEFLOW_POLL_INTERVAL_MS") {
            config.session.poll_interval_ms = parse_millis("STAKEFLOW_POLL_INTERVAL_MS", interval)?;
        }

        if let Ok(level) = env::var("STAKEFLOW_LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self, config: &StakeflowConfig) -> StakeflowResult<()> {
        for (field, value) in [
            ("backend.url", &config.backend.url),
            ("ledger.rpc_url", &config.ledger.rpc_url),
        ] {
            let parsed = url::Url::parse(value).map_err(|e| ConfigurationError::InvalidValue {
                field: field.to_string(),
                value: value.clone(),
                reason: e.to_string(),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigurationError::InvalidValue {
                    field: field.to_string(),
                    value: value.clone(),
                    reason: "URL scheme must be http or https".to_string(),
                }
                .into());
            }
        }

        if config.ledger.house_address.trim().is_empty() {
            return Err(ConfigurationError::MissingRequired("ledger.house_address".to_string()).into());
        }
        if Commitment::parse(&config.ledger.commitment).is_none() {
            return Err(ConfigurationError::InvalidValue {
                field: "ledger.commitment".to_string(),
                value: config.ledger.commitment.clone(),
                reason: "Expected processed, confirmed or finalized".to_string(),
            }
            .into());
        }
        if config.ledger.token.decimals > 18 {
            return Err(ConfigurationError::InvalidValue {
                field: "ledger.token.decimals".to_string(),
                value: config.ledger.token.decimals.to_string(),
                reason: "Token decimals cannot exceed 18".to_string(),
            }
            .into());
        }

        if config.session.poll_interval_ms == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "session.poll_interval_ms".to_string(),
                value: "0".to_string(),
                reason: "Poll interval cannot be zero".to_string(),
            }
            .into());
        }
        if config.session.confirmation_timeout_ms < config.session.poll_interval_ms {
            return Err(ConfigurationError::InvalidValue {
                field: "session.confirmation_timeout_ms".to_string(),
                value: config.session.confirmation_timeout_ms.to_string(),
                reason: "Confirmation timeout must be at least one poll interval".to_string(),
            }
            .into());
        }

        for game in &config.games {
            if !(game.min_bet > 0.0 && game.min_bet <= game.max_bet) {
                return Err(ConfigurationError::InvalidValue {
                    field: format!("games.{}", game.kind),
                    value: format!("[{}, {}]", game.min_bet, game.max_bet),
                    reason: "Bet limits must satisfy 0 < min_bet <= max_bet".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &StakeflowConfig, path: &str) -> StakeflowResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

fn parse_millis(field: &str, value: String) -> Result<u64, ConfigurationError> {
    value.trim().parse().map_err(|_| ConfigurationError::InvalidValue {
        field: field.to_string(),
        value,
        reason: "Expected a duration in milliseconds".to_string(),
    })
}

/// Builder for assembling configurations in code
pub struct ConfigBuilder {
    config: StakeflowConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: StakeflowConfig::default(),
        }
    }

    pub fn backend(mut self, backend: BackendConfig) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn ledger(mut self, ledger: LedgerConfig) -> Self {
        self.config.ledger = ledger;
        self
    }

    pub fn session(mut self, session: SessionConfig) -> Self {
        self.config.session = session;
        self
    }

    pub fn games(mut self, games: Vec<GameConfig>) -> Self {
        self.config.games = games;
        self
    }

    pub fn build(self) -> StakeflowConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config(path: &str) -> StakeflowResult<()> {
    let config = StakeflowConfig::default();
    ConfigLoader::new().save(&config, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StakeflowError;
    use crate::games::GameKind;
    use tempfile::NamedTempFile;

    fn defaults() -> StakeflowConfig {
        StakeflowConfig::default()
    }

    #[test]
    fn test_default_config() {
        let config = defaults();
        assert_eq!(config.confirmation_timeout(), Duration::from_millis(30_000));
        assert_eq!(config.poll_interval(), Duration::from_millis(1_000));
        assert_eq!(config.request_timeout(), Duration::from_millis(15_000));
        assert!(config.session.cancel_on_reset);
        assert_eq!(config.commitment(), Commitment::Confirmed);
        assert!(config.catalog().get(GameKind::Dice).unwrap().auto_resolve);
        assert!(!config.catalog().get(GameKind::Blackjack).unwrap().auto_resolve);
    }

    #[test]
    fn test_config_validation() {
        let loader = ConfigLoader::new();
        let mut config = defaults();
        assert!(loader.validate(&config).is_ok());

        config.session.poll_interval_ms = 0;
        assert!(loader.validate(&config).is_err());

        let mut config = defaults();
        config.session.confirmation_timeout_ms = 500;
        assert!(loader.validate(&config).is_err());

        let mut config = defaults();
        config.backend.url = "ftp://games.example".to_string();
        assert!(matches!(
            loader.validate(&config),
            Err(StakeflowError::Configuration(ConfigurationError::InvalidValue { .. }))
        ));

        let mut config = defaults();
        config.ledger.house_address = "  ".to_string();
        assert!(matches!(
            loader.validate(&config),
            Err(StakeflowError::Configuration(ConfigurationError::MissingRequired(_)))
        ));
    }

    #[test]
    fn test_invalid_bet_limits_rejected() {
        let loader = ConfigLoader::new();
        let config = ConfigBuilder::new()
            .games(vec![GameConfig::new(GameKind::Dice, 10.0, 1.0)])
            .build();
        assert!(loader.validate(&config).is_err());

        let config = ConfigBuilder::new()
            .games(vec![GameConfig::new(GameKind::Dice, 0.0, 1.0)])
            .build();
        assert!(loader.validate(&config).is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .session(SessionConfig {
                confirmation_timeout_ms: 5_000,
                poll_interval_ms: 250,
                cancel_on_reset: false,
            })
            .games(vec![GameConfig::new(GameKind::Blackjack, 1.0, 100.0)])
            .build();

        assert_eq!(config.confirmation_timeout(), Duration::from_secs(5));
        assert!(!config.session.cancel_on_reset);
        assert_eq!(config.catalog().len(), 1);
    }

    #[test]
    fn test_save_and_load_config() -> StakeflowResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let original = defaults();
        ConfigLoader::new().save(&original, path)?;
        let loaded = ConfigLoader::new().with_path(path).load()?;

        assert_eq!(loaded.session, original.session);
        assert_eq!(loaded.ledger.token, original.ledger.token);
        assert_eq!(loaded.catalog(), original.catalog());
        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> StakeflowResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(
            temp_file.path(),
            "[session]\nconfirmation_timeout_ms = 10000\npoll_interval_ms = 500\ncancel_on_reset = false\n",
        )
        .unwrap();

        let loaded = ConfigLoader::new().with_path(temp_file.path()).load()?;
        assert_eq!(loaded.session.poll_interval_ms, 500);
        assert_eq!(loaded.backend, BackendConfig::default());
        assert_eq!(loaded.catalog(), GameCatalog::default_catalog());
        Ok(())
    }

    #[test]
    fn test_generate_sample_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();
        generate_sample_config(path).unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("[backend]"));
        assert!(content.contains("confirmation_timeout_ms = 30000"));
    }

    #[test]
    fn test_missing_file_fails_to_load() {
        let result = ConfigLoader::new().with_path("/nonexistent/stakeflow.toml").load();
        assert!(matches!(
            result,
            Err(StakeflowError::Configuration(ConfigurationError::LoadFailed(_)))
        ));
    }
}

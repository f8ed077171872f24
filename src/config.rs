use std::env;
use std::fmt;
use std::path::Path;

use eyre::{eyre, Result, WrapErr};

/// Main configuration for the matrix engine.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub explorer: ExplorerConfig,
    pub auth: AuthConfig,
    pub engine: EngineConfig,
    pub api: ApiConfig,
}

/// Database configuration
#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Custom Debug that redacts the database URL (may contain credentials).
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .finish()
    }
}

/// Block-explorer upstream and receiving-address constants.
#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    pub api_url: String,
    /// The fixed receiving address deposits are sent to.
    pub receive_address: String,
    pub usdt_contract: String,
    pub dhb_contract: String,
    /// Page size for token-transaction scans.
    pub page_size: u32,
    /// Safety cap on pages walked per sweep.
    pub max_pages: u32,
}

/// Token signing and scheduler authentication.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Shared secret required on the scheduler-only deposit trigger.
    pub scheduler_secret: String,
}

/// Custom Debug that redacts secrets to prevent accidental log leakage.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("scheduler_secret", &"<redacted>")
            .finish()
    }
}

/// Engine scheduling intervals.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sweep_interval_ms: u64,
    pub withdraw_interval_ms: u64,
    /// How often the monthly distributor wakes up to check the calendar.
    pub monthly_check_interval_ms: u64,
}

/// HTTP API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub port: u16,
}

fn default_page_size() -> u32 {
    200
}

fn default_max_pages() -> u32 {
    10
}

fn default_sweep_interval() -> u64 {
    60_000
}

fn default_withdraw_interval() -> u64 {
    30_000
}

fn default_monthly_check_interval() -> u64 {
    3_600_000
}

fn default_api_port() -> u16 {
    9090
}

impl Config {
    /// Load configuration from environment variables.
    /// Loads .env file if present, then reads from environment.
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env")
    }

    /// Load from a specific .env file path.
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    fn load_from_env() -> Result<Self> {
        let database = DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| eyre!("DATABASE_URL environment variable is required"))?,
        };

        let explorer = ExplorerConfig {
            api_url: env::var("EXPLORER_API_URL")
                .map_err(|_| eyre!("EXPLORER_API_URL environment variable is required"))?,
            receive_address: env::var("RECEIVE_ADDRESS")
                .map_err(|_| eyre!("RECEIVE_ADDRESS environment variable is required"))?,
            usdt_contract: env::var("USDT_CONTRACT")
                .map_err(|_| eyre!("USDT_CONTRACT environment variable is required"))?,
            dhb_contract: env::var("DHB_CONTRACT")
                .map_err(|_| eyre!("DHB_CONTRACT environment variable is required"))?,
            page_size: env::var("EXPLORER_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_page_size()),
            max_pages: env::var("EXPLORER_MAX_PAGES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_max_pages()),
        };

        let auth = AuthConfig {
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| eyre!("JWT_SECRET environment variable is required"))?,
            scheduler_secret: env::var("SCHEDULER_SECRET")
                .map_err(|_| eyre!("SCHEDULER_SECRET environment variable is required"))?,
        };

        let engine = EngineConfig {
            sweep_interval_ms: env::var("SWEEP_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_sweep_interval()),
            withdraw_interval_ms: env::var("WITHDRAW_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_withdraw_interval()),
            monthly_check_interval_ms: env::var("MONTHLY_CHECK_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_monthly_check_interval()),
        };

        let api = ApiConfig {
            port: env::var("API_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_api_port()),
        };

        let config = Config {
            database,
            explorer,
            auth,
            engine,
            api,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(eyre!("database.url cannot be empty"));
        }

        if self.explorer.api_url.is_empty() {
            return Err(eyre!("explorer.api_url cannot be empty"));
        }

        for (name, addr) in [
            ("receive_address", &self.explorer.receive_address),
            ("usdt_contract", &self.explorer.usdt_contract),
            ("dhb_contract", &self.explorer.dhb_contract),
        ] {
            if addr.len() != 42 || !addr.starts_with("0x") {
                return Err(eyre!(
                    "explorer.{name} must be a valid hex address (42 chars with 0x prefix)"
                ));
            }
        }

        if self.explorer.usdt_contract == self.explorer.dhb_contract {
            return Err(eyre!(
                "explorer.usdt_contract and explorer.dhb_contract must differ: \
                 scanning the same contract twice would pair a transfer with itself"
            ));
        }

        if self.explorer.page_size == 0 {
            return Err(eyre!("explorer.page_size must be positive"));
        }

        if self.explorer.max_pages == 0 {
            return Err(eyre!("explorer.max_pages must be positive"));
        }

        if self.auth.jwt_secret.len() < 16 {
            return Err(eyre!("auth.jwt_secret must be at least 16 bytes"));
        }

        if self.auth.scheduler_secret.is_empty() {
            return Err(eyre!("auth.scheduler_secret cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            database: DatabaseConfig {
                url: "postgres://localhost/test".to_string(),
            },
            explorer: ExplorerConfig {
                api_url: "https://api-testnet.bscscan.com/api".to_string(),
                receive_address: "0xe865f2e5ff04b8b7952d1c0d9163a91f313b158f".to_string(),
                usdt_contract: "0x337610d27c682e347c9cd60bd4b3b107c9d34ddd".to_string(),
                dhb_contract: "0x0000000000000000000000000000000000000d4b".to_string(),
                page_size: 200,
                max_pages: 10,
            },
            auth: AuthConfig {
                jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
                scheduler_secret: "scheduler-secret".to_string(),
            },
            engine: EngineConfig {
                sweep_interval_ms: 60_000,
                withdraw_interval_ms: 30_000,
                monthly_check_interval_ms: 3_600_000,
            },
            api: ApiConfig { port: 9090 },
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(default_page_size(), 200);
        assert_eq!(default_max_pages(), 10);
        assert_eq!(default_sweep_interval(), 60_000);
        assert_eq!(default_withdraw_interval(), 30_000);
        assert_eq!(default_monthly_check_interval(), 3_600_000);
        assert_eq!(default_api_port(), 9090);
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_address_validation() {
        let mut config = valid_config();
        config.explorer.receive_address = "invalid".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.explorer.usdt_contract = "337610d27c682e347c9cd60bd4b3b107c9d34ddd00".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_same_contract_rejected() {
        let mut config = valid_config();
        config.explorer.dhb_contract = config.explorer.usdt_contract.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let mut config = valid_config();
        config.auth.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let mut config = valid_config();
        config.explorer.page_size = 0;
        assert!(config.validate().is_err());
    }
}

//! Configuration management for the Lead CRM
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides, e.g. `CRM__JWT__SECRET`

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::Role;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Spreadsheet ledger configuration
    pub sheets: SheetsConfig,

    /// JWT session configuration
    pub jwt: JwtConfig,

    /// Lead assignment configuration
    pub assignment: AssignmentConfig,

    /// Per-client rate limiting
    pub rate_limit: RateLimitConfig,

    /// Accounts allowed to log in
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

/// Which ledger store backs the service
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Google,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SheetsConfig {
    pub backend: LedgerBackend,

    /// Spreadsheet ID from the sheet URL
    #[serde(default)]
    pub spreadsheet_id: String,

    /// Sheets API base URL
    pub api_base_url: String,

    /// OAuth token endpoint for the service account
    pub token_uri: String,

    /// Service account email
    #[serde(default)]
    pub service_account_email: String,

    /// Service account private key (PEM)
    #[serde(default)]
    pub private_key: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    pub leads_sheet: String,
    pub stock_sheet: String,
    pub movements_sheet: String,
    pub settings_sheet: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key for signing session tokens
    pub secret: String,

    /// Session token expiration in seconds
    pub access_token_expiry: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssignmentConfig {
    /// Ordered employee roster; falls back to configured agents when empty
    #[serde(default)]
    pub employees: Vec<String>,

    /// Maximum leads assigned per pass
    pub batch_size: usize,

    /// Minimum seconds between automatic passes
    pub cooldown_secs: u64,

    /// Fraction of assigned leads the max-min spread may reach before warning
    pub imbalance_tolerance: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UserConfig {
    pub username: String,

    /// bcrypt hash
    pub password_hash: String,

    pub role: Role,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("CRM_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("sheets.backend", "memory")?
            .set_default("sheets.api_base_url", "https://sheets.googleapis.com/v4")?
            .set_default("sheets.token_uri", "https://oauth2.googleapis.com/token")?
            .set_default("sheets.request_timeout_secs", 20)?
            .set_default("sheets.leads_sheet", "Leads")?
            .set_default("sheets.stock_sheet", "Stock")?
            .set_default("sheets.movements_sheet", "Stock Movements")?
            .set_default("sheets.settings_sheet", "Settings")?
            .set_default("jwt.access_token_expiry", 43200)?
            .set_default("assignment.batch_size", 100)?
            .set_default("assignment.cooldown_secs", 60)?
            .set_default("assignment.imbalance_tolerance", 0.10)?
            .set_default("rate_limit.requests_per_window", 120)?
            .set_default("rate_limit.window_secs", 60)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (CRM__SECTION__KEY)
            .add_source(
                Environment::with_prefix("CRM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Ordered employee roster used for round-robin assignment
    pub fn roster(&self) -> Vec<String> {
        if !self.assignment.employees.is_empty() {
            return self.assignment.employees.clone();
        }
        self.users
            .iter()
            .filter(|u| u.role == Role::Agent)
            .map(|u| u.username.clone())
            .collect()
    }
}

impl AssignmentConfig {
    /// Batch cap clamped to a range that keeps one write request bounded
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, 200)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Memory,
            spreadsheet_id: String::new(),
            api_base_url: "https://sheets.googleapis.com/v4".to_string(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            service_account_email: String::new(),
            private_key: String::new(),
            request_timeout_secs: 20,
            leads_sheet: "Leads".to_string(),
            stock_sheet: "Stock".to_string(),
            movements_sheet: "Stock Movements".to_string(),
            settings_sheet: "Settings".to_string(),
        }
    }
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            employees: Vec::new(),
            batch_size: 100,
            cooldown_secs: 60,
            imbalance_tolerance: 0.10,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 120,
            window_secs: 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server: ServerConfig::default(),
            sheets: SheetsConfig::default(),
            jwt: JwtConfig {
                secret: "development-secret-key".to_string(),
                access_token_expiry: 43200,
            },
            assignment: AssignmentConfig::default(),
            rate_limit: RateLimitConfig::default(),
            users: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_falls_back_to_agents() {
        let mut config = Config::default();
        config.users = vec![
            UserConfig {
                username: "boss".into(),
                password_hash: String::new(),
                role: Role::Admin,
            },
            UserConfig {
                username: "sara".into(),
                password_hash: String::new(),
                role: Role::Agent,
            },
            UserConfig {
                username: "omar".into(),
                password_hash: String::new(),
                role: Role::Agent,
            },
        ];
        assert_eq!(config.roster(), vec!["sara", "omar"]);

        config.assignment.employees = vec!["omar".into()];
        assert_eq!(config.roster(), vec!["omar"]);
    }

    #[test]
    fn test_batch_size_is_clamped() {
        let mut assignment = AssignmentConfig::default();
        assignment.batch_size = 0;
        assert_eq!(assignment.effective_batch_size(), 1);
        assignment.batch_size = 5000;
        assert_eq!(assignment.effective_batch_size(), 200);
    }
}

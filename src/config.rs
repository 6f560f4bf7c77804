use secrecy::Secret;
use serde::Deserialize;

use crate::ledger::sheets::DEFAULT_SHEETS_API_URL;
use crate::services::telegram::DEFAULT_TELEGRAM_API_URL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Sheets,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,

    // Telegram
    pub bot_token: Secret<String>,
    pub admin_id: i64,
    pub telegram_api_url: String,
    pub telegram_timeout_secs: u64,
    pub poll_timeout_secs: u64,

    // Ledger
    pub ledger_backend: LedgerBackend,
    pub spreadsheet_id: Option<String>,
    /// Service-account key JSON (or a bare access token)
    pub google_credentials: Option<Secret<String>>,
    pub google_credentials_file: Option<String>,
    pub sheets_api_url: String,
    pub ledger_timeout_secs: u64,

    // Payments
    pub payment_phone: Option<String>,
    pub payment_qr_photo: Option<String>,
    pub currency: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let source = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Self::from_source(&source)
    }

    pub fn from_source(source: &config::Config) -> Result<Self, config::ConfigError> {
        let ledger_backend = match source
            .get_string("ledger_backend")
            .map(|s| s.to_lowercase())
            .as_deref()
        {
            Ok("memory") => LedgerBackend::Memory,
            Ok("sheets") | Err(_) => LedgerBackend::Sheets,
            Ok(other) => {
                return Err(config::ConfigError::Message(format!(
                    "LEDGER_BACKEND must be sheets or memory, got {}",
                    other
                )))
            }
        };

        let config = Self {
            host: source
                .get("host")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: source.get("port").unwrap_or(8000),

            bot_token: Secret::new(source.get("bot_token")?),
            admin_id: source.get("admin_id")?,
            telegram_api_url: source
                .get("telegram_api_url")
                .unwrap_or_else(|_| DEFAULT_TELEGRAM_API_URL.to_string()),
            telegram_timeout_secs: source.get("telegram_timeout_secs").unwrap_or(10),
            poll_timeout_secs: source.get("poll_timeout_secs").unwrap_or(25),

            ledger_backend,
            spreadsheet_id: source.get("spreadsheet_id").ok(),
            google_credentials: source
                .get::<String>("google_credentials")
                .ok()
                .map(Secret::new),
            google_credentials_file: source.get("google_credentials_file").ok(),
            sheets_api_url: source
                .get("sheets_api_url")
                .unwrap_or_else(|_| DEFAULT_SHEETS_API_URL.to_string()),
            ledger_timeout_secs: source.get("ledger_timeout_secs").unwrap_or(10),

            payment_phone: source.get("payment_phone").ok(),
            payment_qr_photo: source.get("payment_qr_photo").ok(),
            currency: source
                .get("currency")
                .unwrap_or_else(|_| "som".to_string()),
        };

        if config.ledger_backend == LedgerBackend::Sheets && config.spreadsheet_id.is_none() {
            return Err(config::ConfigError::NotFound("spreadsheet_id".to_string()));
        }

        Ok(config)
    }

    /// Key material for the Sheets backend, from the inline variable or the
    /// key file.
    pub fn load_google_credentials(&self) -> anyhow::Result<Secret<String>> {
        if let Some(inline) = &self.google_credentials {
            return Ok(inline.clone());
        }
        let path = self
            .google_credentials_file
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("GOOGLE_CREDENTIALS or GOOGLE_CREDENTIALS_FILE must be set"))?;
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read credentials file {}: {}", path, e))?;
        Ok(Secret::new(contents))
    }
}

use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    // Authentication
    pub jwt_secret: Secret<String>,

    // Bootstrap administrator account, created on startup if missing
    pub admin_username: String,
    pub admin_password: Secret<String>,

    // Card issuance
    pub card_number_prefix: String,

    // Expiry sweep cron schedule (seconds-resolution cron expression)
    pub expiry_sweep_schedule: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            database_url: config.get("database_url")?,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port").unwrap_or(8080),

            jwt_secret: Secret::new(config.get("jwt_secret")?),

            admin_username: config
                .get("admin_username")
                .unwrap_or_else(|_| "admin".to_string()),
            admin_password: Secret::new(config.get("admin_password")?),

            card_number_prefix: config
                .get("card_number_prefix")
                .unwrap_or_else(|_| "444455".to_string()),

            expiry_sweep_schedule: config
                .get("expiry_sweep_schedule")
                .unwrap_or_else(|_| "0 0 19 * * *".to_string()),
        })
    }
}

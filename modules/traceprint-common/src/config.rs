use anyhow::Result;

/// Application configuration loaded from environment variables.
/// Contains only secrets and env-specific values; thresholds, TTLs, and
/// concurrency limits live in the TOML FileConfig.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")?,
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val.len().min(12);
            format!("{}...({} chars)", &val[..n], val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  DATABASE_URL: {}", preview(&self.database_url));
    }
}

use anyhow::Result;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Mock,
    Marketplace,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Mode::Mock),
            "marketplace" => Ok(Mode::Marketplace),
            _ => anyhow::bail!("Invalid MODE: {}. Must be 'mock' or 'marketplace'", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub region: String,
    pub product_code: String,
    /// Name of the usage dimension reported for unique hosts.
    pub usage_dimension: String,
    /// Interval multiples tolerated before classifying stop / warning.
    pub max_send_stop: u64,
    pub max_send_warning: u64,
    pub send_interval_seconds: u64,
    /// Override for the derived regional metering endpoint.
    pub metering_endpoint: Option<String>,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub aws_session_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mode_str = env::var("MODE").unwrap_or_else(|_| "mock".to_string());
        let mode = Mode::from_str(&mode_str)?;

        let region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());

        let product_code = env::var("PRODUCT_CODE").unwrap_or_default();
        if mode == Mode::Marketplace && product_code.is_empty() {
            anyhow::bail!("PRODUCT_CODE must be set when MODE is 'marketplace'");
        }

        let usage_dimension =
            env::var("USAGE_DIMENSION").unwrap_or_else(|_| "unique-hosts".to_string());

        let max_send_stop = env::var("MAX_SEND_STOP")
            .unwrap_or_else(|_| "2".to_string())
            .parse::<u64>()
            .unwrap_or(2);

        let max_send_warning = env::var("MAX_SEND_WARNING")
            .unwrap_or_else(|_| "1".to_string())
            .parse::<u64>()
            .unwrap_or(1);

        // A malformed interval falls back to the default rather than
        // failing startup.
        let send_interval_seconds = env::var("SEND_DIMENSIONS_AFTER")
            .unwrap_or_else(|_| "3600".to_string())
            .parse::<u64>()
            .unwrap_or(3600);

        let metering_endpoint = env::var("METERING_ENDPOINT").ok();

        let aws_access_key_id = env::var("AWS_ACCESS_KEY_ID").unwrap_or_default();
        let aws_secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default();
        let aws_session_token = env::var("AWS_SESSION_TOKEN").ok();

        Ok(Config {
            mode,
            region,
            product_code,
            usage_dimension,
            max_send_stop,
            max_send_warning,
            send_interval_seconds,
            metering_endpoint,
            aws_access_key_id,
            aws_secret_access_key,
            aws_session_token,
        })
    }
}

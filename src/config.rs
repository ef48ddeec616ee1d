use std::{env, path::PathBuf, str::FromStr, time::Duration};

#[derive(Debug, Clone)]
pub struct Settings {
    pub db_file: PathBuf,
    pub host: String,
    pub port: u16,

    pub poll_interval: Duration,
    pub alert_cooldown: Duration,
    pub request_timeout: Duration,
    pub max_concurrent_fetches: usize,
    pub politeness_delay: Duration,
    pub currency_symbol: String,

    // empty => alerts are logged and skipped
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub telegram_api_base: String,
}

pub fn load() -> Settings {
    // Loads .env if present (no crash if missing)
    dotenvy::dotenv().ok();

    Settings::from_lookup(|key| env::var(key).ok())
}

impl Settings {
    /// Builds settings from an arbitrary key lookup. `load()` passes the
    /// process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Settings
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let db_file = PathBuf::from(text("DB_FILE", "prices.db"));
        let host = text("HOST", "127.0.0.1");
        let port = parse_or(&lookup, "PORT", 3000u16);

        let poll_interval = Duration::from_secs(parse_or(&lookup, "POLL_INTERVAL_SECS", 1800u64).max(1));
        let alert_cooldown = Duration::from_secs(parse_or(&lookup, "ALERT_COOLDOWN_SECS", 43_200u64));
        let request_timeout = Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 15u64).max(1));
        let max_concurrent_fetches = parse_or(&lookup, "MAX_CONCURRENT_FETCHES", 5usize).max(1);
        let politeness_delay = Duration::from_millis(parse_or(&lookup, "POLITENESS_DELAY_MS", 2000u64));

        let currency_symbol = text("CURRENCY_SYMBOL", "₹");

        let telegram_bot_token = lookup("TELEGRAM_BOT_TOKEN").unwrap_or_default().trim().to_string();
        let telegram_chat_id = lookup("TELEGRAM_CHAT_ID").unwrap_or_default().trim().to_string();
        let telegram_api_base = text("TELEGRAM_API_BASE", "https://api.telegram.org");

        Settings {
            db_file,
            host,
            port,
            poll_interval,
            alert_cooldown,
            request_timeout,
            max_concurrent_fetches,
            politeness_delay,
            currency_symbol,
            telegram_bot_token,
            telegram_chat_id,
            telegram_api_base,
        }
    }

    pub fn has_notifier_credentials(&self) -> bool {
        !self.telegram_bot_token.is_empty() && !self.telegram_chat_id.is_empty()
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) if raw.trim().is_empty() => default,
        Some(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            tracing::warn!("{key}={raw:?} is not valid, using default {default}");
            default
        }),
    }
}

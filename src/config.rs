use std::env;
use std::time::Duration;

use crate::models::account::{Account, DEFAULT_IMAP_HOST, DEFAULT_IMAP_PORT};
use crate::models::Category;

/// Highest `EMAIL_USER_<n>` slot scanned for accounts.
pub const MAX_ACCOUNT_SLOTS: usize = 9;

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub database_url: String,
    pub cors_origin: String,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub gemini_embed_model: String,
    pub slack_webhook_url: Option<String>,
    pub webhook_site_url: Option<String>,
    pub knowledge_base_path: String,
    pub backfill_days: i64,
    pub oracle_timeout: Duration,
    pub network_timeout: Duration,
    pub classify_fallback: Category,
    pub accounts: Vec<Account>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let parse_or = |key: &str, default: u64| {
            get(key).and_then(|v| v.parse::<u64>().ok()).unwrap_or(default)
        };

        let classify_fallback = match get("CLASSIFY_FALLBACK") {
            Some(name) => Category::from_name(&name).unwrap_or_else(|| {
                tracing::warn!(value=%name, "unknown CLASSIFY_FALLBACK, using Other");
                Category::Other
            }),
            None => Category::Other,
        };

        Settings {
            port: get("PORT").and_then(|p| p.parse::<u16>().ok()).unwrap_or(3000),
            database_url: get("DATABASE_URL").unwrap_or_else(|| "sqlite://inbox_triage.db".into()),
            cors_origin: get("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".into()),
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".into()),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.5-flash".into()),
            gemini_embed_model: get("GEMINI_EMBED_MODEL")
                .unwrap_or_else(|| "text-embedding-004".into()),
            slack_webhook_url: get("SLACK_WEBHOOK_URL"),
            webhook_site_url: get("WEBHOOK_SITE_URL"),
            knowledge_base_path: get("KNOWLEDGE_BASE_PATH")
                .unwrap_or_else(|| "data/context.json".into()),
            backfill_days: parse_or("BACKFILL_DAYS", 30) as i64,
            oracle_timeout: Duration::from_secs(parse_or("ORACLE_TIMEOUT_SECS", 30)),
            network_timeout: Duration::from_secs(parse_or("NETWORK_TIMEOUT_SECS", 60)),
            classify_fallback,
            accounts: load_accounts(&get),
        }
    }
}

/// Enumerates `EMAIL_USER_<n>` / `EMAIL_PASS_<n>` pairs. Slots missing either
/// half are skipped; an empty result is not an error.
pub fn load_accounts<F>(get: F) -> Vec<Account>
where
    F: Fn(&str) -> Option<String>,
{
    let default_host = get("IMAP_HOST").unwrap_or_else(|| DEFAULT_IMAP_HOST.to_string());
    let default_port = get("IMAP_PORT")
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_IMAP_PORT);
    let default_secure = get("IMAP_SECURE").map(|v| parse_bool(&v)).unwrap_or(true);

    let mut accounts = Vec::new();
    for n in 1..=MAX_ACCOUNT_SLOTS {
        let (user, pass) = match (get(&format!("EMAIL_USER_{n}")), get(&format!("EMAIL_PASS_{n}"))) {
            (Some(u), Some(p)) => (u, p),
            (None, None) => continue,
            _ => {
                tracing::debug!(slot = n, "account slot has only one credential half, skipping");
                continue;
            }
        };
        let host = get(&format!("EMAIL_HOST_{n}")).unwrap_or_else(|| default_host.clone());
        let port = get(&format!("EMAIL_PORT_{n}"))
            .and_then(|p| p.parse().ok())
            .unwrap_or(default_port);
        let secure = get(&format!("EMAIL_SECURE_{n}"))
            .map(|v| parse_bool(&v))
            .unwrap_or(default_secure);
        accounts.push(Account::new(user, pass).with_server(host, port, secure));
    }
    accounts
}

fn parse_bool(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

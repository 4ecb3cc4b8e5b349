use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, registry::TableSchema, Result};

/// Where the Google service-account key comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialSource {
    /// Key JSON passed directly (preferred in containers).
    Inline(String),
    /// Path to a key file on disk.
    File(PathBuf),
    /// Nothing configured. Surfaces as a config error when the client is built.
    Missing,
}

/// Typed configuration for the bot.
#[derive(Clone, Debug)]
pub struct Config {
    // Messaging
    pub telegram_bot_token: String,
    pub admin_chat_id: Option<i64>,

    // Google Sheets
    pub google_credentials: CredentialSource,
    pub google_sheet_id: String,
    pub worksheet_name: String,
    pub table_schema: TableSchema,
    pub sheets_http_timeout: Duration,

    // Caches / lifecycle
    pub table_cache_ttl: Duration,
    pub user_state_ttl: Duration,
    pub shutdown_timeout: Duration,

    // Behavior flags
    pub detect_serial_conflicts: bool,

    // Notifications
    pub email_receivers: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        let google_sheet_id = env_str("GOOGLE_SHEET_ID").unwrap_or_default();
        if google_sheet_id.trim().is_empty() {
            return Err(Error::Config(
                "GOOGLE_SHEET_ID environment variable is required".to_string(),
            ));
        }

        let admin_chat_id = env_str("ADMIN_CHAT_ID").and_then(|s| s.trim().parse::<i64>().ok());

        // Credentials are validated lazily by the connector so a missing key
        // shows up as a degraded startup rather than a crash.
        let google_credentials = credential_source(
            env_str("GOOGLE_SHEETS_CREDENTIALS_JSON"),
            env_str("GOOGLE_SHEETS_CREDENTIALS_FILE"),
        );
        let worksheet_name = env_str("GOOGLE_SHEET_WORKSHEET_NAME")
            .and_then(non_empty)
            .unwrap_or_else(|| "工作表1".to_string());

        let defaults = TableSchema::default();
        let table_schema = TableSchema {
            serial_header: env_header("SHEET_SERIAL_HEADER", defaults.serial_header),
            timestamp_header: env_header("SHEET_TIMESTAMP_HEADER", defaults.timestamp_header),
            display_name_header: env_header(
                "SHEET_DISPLAY_NAME_HEADER",
                defaults.display_name_header,
            ),
            requester_id_header: env_header(
                "SHEET_REQUESTER_ID_HEADER",
                defaults.requester_id_header,
            ),
            status_header: env_header("SHEET_STATUS_HEADER", defaults.status_header),
        };

        let sheets_http_timeout =
            Duration::from_millis(env_u64("SHEETS_HTTP_TIMEOUT_MS").unwrap_or(10_000));

        // Larger TTL = fewer round-trips but a wider staleness window.
        let table_cache_ttl = Duration::from_secs(env_u64("TABLE_CACHE_TTL_SECS").unwrap_or(120));
        let user_state_ttl = Duration::from_secs(env_u64("USER_STATE_TTL_SECS").unwrap_or(300));
        let shutdown_timeout =
            Duration::from_millis(env_u64("SHUTDOWN_TIMEOUT_MS").unwrap_or(5_000));

        let detect_serial_conflicts = env_bool("DETECT_SERIAL_CONFLICTS").unwrap_or(true);
        let email_receivers = parse_csv(env_str("EMAIL_RECEIVER"));

        Ok(Self {
            telegram_bot_token,
            admin_chat_id,
            google_credentials,
            google_sheet_id,
            worksheet_name,
            table_schema,
            sheets_http_timeout,
            table_cache_ttl,
            user_state_ttl,
            shutdown_timeout,
            detect_serial_conflicts,
            email_receivers,
        })
    }
}

fn credential_source(inline: Option<String>, file: Option<String>) -> CredentialSource {
    if let Some(json) = inline.and_then(non_empty) {
        return CredentialSource::Inline(json);
    }
    match file.and_then(non_empty) {
        Some(path) => CredentialSource::File(PathBuf::from(path.trim())),
        None => CredentialSource::Missing,
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_header(key: &str, default: String) -> String {
    env_str(key)
        .and_then(non_empty)
        .map(|s| s.trim().to_string())
        .unwrap_or(default)
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

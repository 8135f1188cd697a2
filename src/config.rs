//! Environment configuration

use crate::names::parse_alias_list;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Everything the service reads from the environment
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub discord_bot_token: String,
    pub discord_bot_user_id: String,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub sheet_gid: u32,
    pub sheets_access_token: String,
    /// Finalize script; `action=` is appended per call
    pub gas_base_url: String,
    /// Where webhook notifications go; none means they are dropped
    pub notify_channel_id: Option<String>,
    pub port: u16,
    pub command_prefix: String,
    pub command_name: String,
    pub confirm_timeout: Duration,
    pub prompt_timeout: Duration,
    pub clear_on_timeout: bool,
    /// Extra aliases on top of the built-in table
    pub name_aliases: Vec<(String, String)>,
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let required = |var: &'static str| get(var).ok_or(ConfigError::Missing(var));

        Ok(Self {
            discord_bot_token: required("DISCORD_BOT_TOKEN")?,
            discord_bot_user_id: required("DISCORD_BOT_USER_ID")?,
            spreadsheet_id: required("LEDGER_SPREADSHEET_ID")?,
            sheet_name: get("LEDGER_SHEET_NAME").unwrap_or_else(|| "シート1".to_string()),
            sheet_gid: parse_or("LEDGER_SHEET_GID", get("LEDGER_SHEET_GID"), 0)?,
            sheets_access_token: required("GOOGLE_SHEETS_ACCESS_TOKEN")?,
            gas_base_url: required("GAS_BASE_URL")?,
            notify_channel_id: get("LEDGER_NOTIFY_CHANNEL_ID"),
            port: parse_or("LEDGER_PORT", get("LEDGER_PORT"), 5000)?,
            command_prefix: get("LEDGER_COMMAND_PREFIX").unwrap_or_else(|| "!".to_string()),
            command_name: get("LEDGER_COMMAND_NAME").unwrap_or_else(|| "memo".to_string()),
            confirm_timeout: Duration::from_secs(parse_or(
                "LEDGER_CONFIRM_TIMEOUT_SECS",
                get("LEDGER_CONFIRM_TIMEOUT_SECS"),
                60,
            )?),
            prompt_timeout: Duration::from_secs(parse_or(
                "LEDGER_PROMPT_TIMEOUT_SECS",
                get("LEDGER_PROMPT_TIMEOUT_SECS"),
                300,
            )?),
            clear_on_timeout: parse_flag("LEDGER_CLEAR_ON_TIMEOUT", get("LEDGER_CLEAR_ON_TIMEOUT"))?,
            name_aliases: get("LEDGER_NAME_ALIASES")
                .map(|raw| parse_alias_list(&raw))
                .unwrap_or_default(),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    var: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: v }),
    }
}

fn parse_flag(var: &'static str, value: Option<String>) -> Result<bool, ConfigError> {
    let Some(v) = value else {
        return Ok(false);
    };
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { var, value: v }),
    }
}

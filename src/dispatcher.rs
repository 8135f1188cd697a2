//! Trigger recognition for new ledger sessions
//!
//! Two forms start a session:
//! - the command keyword with one integer argument (`!memo 1200`)
//! - a direct mention of the bot followed only by 1-10 digits (`@bot 1200`)

use crate::store::MAX_AMOUNT_DIGITS;
use regex::Regex;

/// Classification of an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Start { amount: u64 },
    /// Command keyword, but the argument is not a usable amount
    InvalidAmount,
    /// Anything else
    None,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    command: Regex,
    mention: Regex,
    usage: String,
}

impl Dispatcher {
    pub fn new(prefix: &str, command_name: &str, bot_user_id: &str) -> Result<Self, regex::Error> {
        let command_word = format!("{prefix}{command_name}");
        let command = Regex::new(&format!(r"^{}(?:\s+(.*?))?\s*$", regex::escape(&command_word)))?;
        let mention = Regex::new(&format!(
            r"^<@!?{}>\s*([0-9]{{1,{MAX_AMOUNT_DIGITS}}})\s*$",
            regex::escape(bot_user_id)
        ))?;
        Ok(Self {
            command,
            mention,
            usage: format!("使い方: {command_word} <金額>（例: {command_word} 1200）"),
        })
    }

    pub fn classify(&self, content: &str) -> Trigger {
        let content = content.trim();

        if let Some(caps) = self.command.captures(content) {
            let arg = caps.get(1).map_or("", |m| m.as_str());
            return parse_amount_arg(arg).map_or(Trigger::InvalidAmount, |amount| {
                Trigger::Start { amount }
            });
        }

        if let Some(caps) = self.mention.captures(content) {
            if let Some(amount) = caps.get(1).and_then(|m| parse_amount_arg(m.as_str())) {
                return Trigger::Start { amount };
            }
        }

        Trigger::None
    }

    /// Reply text for `Trigger::InvalidAmount`
    pub fn usage(&self) -> &str {
        &self.usage
    }
}

/// 1-10 ASCII digits, nothing else
fn parse_amount_arg(arg: &str) -> Option<u64> {
    if arg.is_empty() || arg.len() > MAX_AMOUNT_DIGITS || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    arg.parse().ok()
}

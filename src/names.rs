//! Display name to ledger name mapping

use std::collections::HashMap;

/// Aliases every deployment knows about
const BUILTIN_ALIASES: [(&str, &str); 2] = [("ちょい", "ちゃい"), ("こしたみん", "こし")];

/// Maps a chat display name to the name used in the ledger.
/// Unmapped names pass through unchanged.
#[derive(Debug, Clone)]
pub struct NameResolver {
    aliases: HashMap<String, String>,
}

impl NameResolver {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self { aliases }
    }

    /// Built-in table extended (or overridden) by `extra`
    pub fn with_extra(extra: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut resolver = Self::default();
        resolver.aliases.extend(extra);
        resolver
    }

    pub fn resolve(&self, display_name: &str) -> String {
        self.aliases
            .get(display_name)
            .cloned()
            .unwrap_or_else(|| display_name.to_string())
    }
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new(
            BUILTIN_ALIASES
                .iter()
                .map(|(alias, canonical)| ((*alias).to_string(), (*canonical).to_string()))
                .collect(),
        )
    }
}

/// Parse `alias=canonical,alias2=canonical2`. Malformed pairs are skipped.
pub fn parse_alias_list(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (alias, canonical) = pair.split_once('=')?;
            let (alias, canonical) = (alias.trim(), canonical.trim());
            if alias.is_empty() || canonical.is_empty() {
                tracing::warn!(pair = %pair, "Ignoring malformed name alias");
                return None;
            }
            Some((alias.to_string(), canonical.to_string()))
        })
        .collect()
}

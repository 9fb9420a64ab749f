//! Field overrides requested by a message.
//!
//! Sources are applied in a fixed order and later sources overwrite earlier
//! ones on the same field:
//!
//! 1. Recipient aliases (`To`/`Cc` addresses and display names)
//! 2. Date-based values, resolved at "now"
//! 3. Mnemonics (`@@@name` tokens in the text)
//! 4. Explicit inline overrides matched by the configured regex

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{info, warn};

use crate::config::{
    InstanceConfig, MnemonicDefinition, RecipientOverrideDefinition, compile_regex,
};
use crate::error::ConfigError;
use crate::mail::IncomingMessage;
use crate::mail::text::eq_ignore_case;
use crate::overrides::date_range::DateRangeResolver;

/// Field name → override value.
pub type OverrideMap = HashMap<String, String>;

const MNEMONIC_PATTERN: &str = r"@@@\s*(?P<mnemonic>\w+)";
const EXPLICIT_REGEX_KEY: &str = "email.explicit_overrides_regex";
const FIELD_GROUP: &str = "field";
const VALUE_GROUP: &str = "value";

/// Computes the override map for a message or a reply's text.
#[derive(Debug, Clone)]
pub struct OverrideResolver {
    recipient_overrides: Vec<RecipientOverrideDefinition>,
    date_resolvers: Vec<(String, DateRangeResolver)>,
    mnemonics: Vec<MnemonicDefinition>,
    mnemonic_regex: Regex,
    explicit_regex: Regex,
}

impl OverrideResolver {
    /// Build from an instance configuration.
    ///
    /// The explicit override regex is required and must define `field` and
    /// `value` groups.
    pub fn from_config(config: &InstanceConfig) -> Result<Self, ConfigError> {
        let pattern = config
            .email
            .explicit_overrides_regex
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: format!("{}.{EXPLICIT_REGEX_KEY}", config.name),
                hint: r"Set a regex with 'field' and 'value' groups, e.g. ###\s*(?P<field>[^:]*):\s*(?P<value>.*)".into(),
            })?;

        let explicit_regex = compile_regex(EXPLICIT_REGEX_KEY, pattern, false)?;
        for group in [FIELD_GROUP, VALUE_GROUP] {
            if !explicit_regex.capture_names().flatten().any(|name| name == group) {
                return Err(ConfigError::MissingCaptureGroup {
                    key: EXPLICIT_REGEX_KEY.to_string(),
                    group: group.to_string(),
                });
            }
        }

        let settings = &config.work_items;
        Ok(Self {
            recipient_overrides: settings.recipient_overrides.clone(),
            date_resolvers: settings
                .date_based_overrides
                .iter()
                .map(|o| (o.field.clone(), DateRangeResolver::from_settings(o)))
                .collect(),
            mnemonics: settings.mnemonics.clone(),
            mnemonic_regex: compile_regex("mnemonic", MNEMONIC_PATTERN, false)?,
            explicit_regex,
        })
    }

    /// Overrides for a new message: every source, evaluated now.
    pub fn for_message(&self, message: &IncomingMessage) -> OverrideMap {
        self.for_message_at(message, Utc::now())
    }

    /// Overrides for a new message with date-based values resolved at `now`.
    pub fn for_message_at(&self, message: &IncomingMessage, now: DateTime<Utc>) -> OverrideMap {
        let text = message.full_text();
        let mut result = OverrideMap::new();
        result.extend(self.recipient_overrides(message));
        result.extend(self.date_overrides(now));
        result.extend(self.mnemonic_overrides(&text));
        result.extend(self.explicit_overrides(&text));
        result
    }

    /// Overrides found in free text, such as the latest reply on a thread.
    ///
    /// Only mnemonics and explicit overrides apply to bare text.
    pub fn for_text(&self, text: &str) -> OverrideMap {
        let mut result = OverrideMap::new();
        result.extend(self.mnemonic_overrides(text));
        result.extend(self.explicit_overrides(text));
        result
    }

    fn recipient_overrides(&self, message: &IncomingMessage) -> Vec<(String, String)> {
        let mut overrides = Vec::new();
        for recipient in message.recipients() {
            for rule in &self.recipient_overrides {
                if eq_ignore_case(&rule.alias, recipient) {
                    info!(
                        alias = %recipient,
                        field = %rule.field,
                        value = %rule.value,
                        "Found recipient override"
                    );
                    overrides.push((rule.field.clone(), rule.value.clone()));
                }
            }
        }
        overrides
    }

    fn date_overrides(&self, now: DateTime<Utc>) -> Vec<(String, String)> {
        self.date_resolvers
            .iter()
            .map(|(field, resolver)| (field.clone(), resolver.resolve(now).to_string()))
            .collect()
    }

    fn mnemonic_overrides(&self, text: &str) -> Vec<(String, String)> {
        let mut overrides = Vec::new();
        for captures in self.mnemonic_regex.captures_iter(text) {
            let Some(mnemonic) = captures.name("mnemonic").map(|m| m.as_str()) else {
                continue;
            };

            let before = overrides.len();
            for rule in &self.mnemonics {
                if eq_ignore_case(&rule.mnemonic, mnemonic) {
                    info!(
                        mnemonic,
                        field = %rule.field,
                        value = %rule.value,
                        "Mnemonic resolved"
                    );
                    overrides.push((rule.field.clone(), rule.value.clone()));
                }
            }
            if overrides.len() == before {
                warn!(mnemonic, "Unknown mnemonic used");
            }
        }
        overrides
    }

    fn explicit_overrides(&self, text: &str) -> Vec<(String, String)> {
        self.explicit_regex
            .captures_iter(text)
            .map(|captures| {
                let group = |name| {
                    captures
                        .name(name)
                        .map(|m| m.as_str().trim().to_string())
                        .unwrap_or_default()
                };
                let (field, value) = (group(FIELD_GROUP), group(VALUE_GROUP));
                info!(field = %field, value = %value, "Found explicit override");
                (field, value)
            })
            .collect()
    }
}

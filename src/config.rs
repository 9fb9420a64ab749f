//! Configuration types.
//!
//! Instance configuration is a JSON document listing every logical instance
//! that shares the mailbox. Host settings (paths, iteration count, timeouts)
//! come from the environment.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Root of the instance configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

impl Config {
    /// Parse a configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Reject configurations no instance could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instances.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "instances".into(),
                hint: "Add at least one instance to the configuration file.".into(),
            });
        }

        let mut names = HashSet::new();
        for instance in &self.instances {
            if instance.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "instances[].name".into(),
                    message: "instance name must not be empty".into(),
                });
            }
            if !names.insert(instance.name.to_lowercase()) {
                return Err(ConfigError::InvalidValue {
                    key: "instances[].name".into(),
                    message: format!("duplicate instance name '{}'", instance.name),
                });
            }
            instance.validate()?;
        }

        Ok(())
    }
}

/// One logical consumer of the shared mailbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub name: String,
    #[serde(default)]
    pub email: EmailSettings,
    #[serde(default)]
    pub work_items: WorkItemSettings,
}

impl InstanceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let regexes = [
            ("email.append_only_title_regex", &self.email.append_only_title_regex),
            ("email.append_only_body_regex", &self.email.append_only_body_regex),
            ("email.explicit_overrides_regex", &self.email.explicit_overrides_regex),
        ];
        for (key, pattern) in regexes {
            if let Some(pattern) = pattern.as_deref().filter(|p| !p.is_empty()) {
                compile_regex(key, pattern, false)?;
            }
        }

        if self.work_items.conversation_index_field.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: format!("{}.work_items.conversation_index_field", self.name),
                hint: "Name the work item field that stores the conversation key.".into(),
            });
        }

        Ok(())
    }
}

/// How a message's conversation key is derived and matched against the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversationKeyMode {
    /// Short, fixed-length conversation GUID; exact match only.
    GuidOnly,
    /// Full conversation index; exact or prefix match.
    #[default]
    FullIndex,
}

impl ConversationKeyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GuidOnly => "guid-only",
            Self::FullIndex => "full-index",
        }
    }
}

/// Mailbox-side settings of an instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailSettings {
    /// Recipient aliases or display names this instance owns. Empty means all.
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Regex with an `id` group that marks a subject as append-only.
    #[serde(default)]
    pub append_only_title_regex: Option<String>,
    /// Regex with an `id` group that marks a body as append-only.
    #[serde(default)]
    pub append_only_body_regex: Option<String>,
    /// Regex with `field` and `value` groups for inline overrides.
    #[serde(default)]
    pub explicit_overrides_regex: Option<String>,
    #[serde(default)]
    pub conversation_key_mode: ConversationKeyMode,
}

/// Work-item-side settings of an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemSettings {
    /// Field holding the conversation key of the originating thread.
    pub conversation_index_field: String,
    #[serde(default)]
    pub default_field_values: Vec<DefaultValueDefinition>,
    #[serde(default)]
    pub mnemonics: Vec<MnemonicDefinition>,
    #[serde(default)]
    pub recipient_overrides: Vec<RecipientOverrideDefinition>,
    #[serde(default)]
    pub date_based_overrides: Vec<DateBasedFieldOverrides>,
    /// Set `Changed By` to the sender when updating.
    #[serde(default)]
    pub override_changed_by: bool,
    /// Apply mnemonic/explicit overrides found in replies.
    #[serde(default)]
    pub apply_overrides_during_update: bool,
}

impl Default for WorkItemSettings {
    fn default() -> Self {
        Self {
            conversation_index_field: "ConversationID".to_string(),
            default_field_values: Vec::new(),
            mnemonics: Vec::new(),
            recipient_overrides: Vec::new(),
            date_based_overrides: Vec::new(),
            override_changed_by: false,
            apply_overrides_during_update: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultValueDefinition {
    pub field: String,
    /// Literal value, or a special keyword such as `##Subject`.
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MnemonicDefinition {
    pub mnemonic: String,
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientOverrideDefinition {
    pub alias: String,
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateBasedFieldOverrides {
    pub field: String,
    pub default_value: String,
    #[serde(default)]
    pub entries: Vec<DateBasedOverrideEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateBasedOverrideEntry {
    pub start_date: DateTime<Utc>,
    pub value: String,
}

/// Compile a configured regex, tagging failures with the configuration key.
pub fn compile_regex(
    key: &str,
    pattern: &str,
    case_insensitive: bool,
) -> Result<Regex, ConfigError> {
    regex::RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|source| ConfigError::InvalidRegex {
            key: key.to_string(),
            source,
        })
}

// ── Host configuration ──────────────────────────────────────────────

/// Default number of outer iterations before the host exits.
const DEFAULT_ITERATIONS: u32 = 200;
/// Default pause between iterations.
const DEFAULT_INTERVAL_SECS: u64 = 1;
/// Default wall-clock budget for one iteration.
const DEFAULT_TIMEOUT_MINS: u64 = 30;

/// Settings of the hosting process, built from environment variables.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub config_path: PathBuf,
    pub mail_dir: PathBuf,
    pub iterations: u32,
    pub interval: Duration,
    /// Run each instance on its own task.
    pub use_threads: bool,
    pub timeout_per_iteration: Duration,
    /// Directory for per-instance JSON snapshots of the simulated store.
    pub snapshot_path: Option<PathBuf>,
}

impl HostConfig {
    /// Build host settings from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config_path = std::env::var("MAIL2ITEM_CONFIG")
            .map(PathBuf::from)
            .map_err(|_| ConfigError::MissingEnvVar("MAIL2ITEM_CONFIG".into()))?;

        let mail_dir = std::env::var("MAIL2ITEM_MAIL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./mail"));

        let iterations: u32 = parse_env("MAIL2ITEM_ITERATIONS")?.unwrap_or(DEFAULT_ITERATIONS);
        let interval_secs: u64 =
            parse_env("MAIL2ITEM_INTERVAL_SECS")?.unwrap_or(DEFAULT_INTERVAL_SECS);
        let use_threads: bool = parse_env("MAIL2ITEM_USE_THREADS")?.unwrap_or(false);
        let timeout_mins: u64 = parse_env("MAIL2ITEM_TIMEOUT_MINS")?.unwrap_or(DEFAULT_TIMEOUT_MINS);

        let snapshot_path = std::env::var("MAIL2ITEM_SNAPSHOT_PATH")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            config_path,
            mail_dir,
            iterations,
            interval: Duration::from_secs(interval_secs),
            use_threads,
            timeout_per_iteration: Duration::from_secs(timeout_mins * 60),
            snapshot_path,
        })
    }
}

fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r####"{
        "instances": [
            {
                "name": "Contoso Support",
                "email": {
                    "recipients": ["support@contoso.com", "Contoso Support"],
                    "append_only_title_regex": "item #(?P<id>\\d+)",
                    "explicit_overrides_regex": "###(?P<field>[^:]+):(?P<value>.+)",
                    "conversation_key_mode": "guid-only"
                },
                "work_items": {
                    "conversation_index_field": "Mail2Item.ConversationId",
                    "default_field_values": [{"field": "Description", "value": "##MessageBody"}],
                    "mnemonics": [{"mnemonic": "ui", "field": "Area", "value": "Product\\UI"}],
                    "date_based_overrides": [{
                        "field": "Iteration",
                        "default_value": "Backlog",
                        "entries": [{"start_date": "2026-01-01T00:00:00Z", "value": "Sprint 1"}]
                    }],
                    "apply_overrides_during_update": true
                }
            }
        ]
    }"####;

    #[test]
    fn parses_sample_config() {
        let config = Config::from_json(SAMPLE).unwrap();
        assert_eq!(config.instances.len(), 1);

        let instance = &config.instances[0];
        assert_eq!(instance.name, "Contoso Support");
        assert_eq!(instance.email.recipients.len(), 2);
        assert_eq!(
            instance.email.conversation_key_mode,
            ConversationKeyMode::GuidOnly
        );
        assert_eq!(
            instance.email.explicit_overrides_regex.as_deref(),
            Some("###(?P<field>[^:]+):(?P<value>.+)")
        );
        assert_eq!(instance.work_items.default_field_values[0].value, "##MessageBody");
        assert_eq!(instance.work_items.mnemonics[0].field, "Area");
        assert_eq!(instance.work_items.date_based_overrides[0].entries.len(), 1);
        assert!(instance.work_items.apply_overrides_during_update);
        assert!(!instance.work_items.override_changed_by);
    }

    #[test]
    fn key_mode_defaults_to_full_index() {
        let config = Config::from_json(r#"{"instances": [{"name": "a"}]}"#).unwrap();
        assert_eq!(
            config.instances[0].email.conversation_key_mode,
            ConversationKeyMode::FullIndex
        );
        assert_eq!(
            config.instances[0].work_items.conversation_index_field,
            "ConversationID"
        );
    }

    #[test]
    fn rejects_empty_instance_list() {
        let err = Config::from_json(r#"{"instances": []}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    fn rejects_duplicate_instance_names() {
        let err =
            Config::from_json(r#"{"instances": [{"name": "Ops"}, {"name": "ops"}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn rejects_invalid_regex() {
        let json = r#"{"instances": [{"name": "a", "email": {"append_only_title_regex": "(unclosed"}}]}"#;
        let err = Config::from_json(json).unwrap_err();
        match err {
            ConfigError::InvalidRegex { key, .. } => {
                assert_eq!(key, "email.append_only_title_regex")
            }
            other => panic!("Expected InvalidRegex, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_json() {
        let err = Config::from_json("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.instances[0].name, "Contoso Support");
    }

    #[test]
    fn compile_regex_honours_case_flag() {
        let re = compile_regex("k", "item", true).unwrap();
        assert!(re.is_match("ITEM"));
        let re = compile_regex("k", "item", false).unwrap();
        assert!(!re.is_match("ITEM"));
    }
}

//! Maps an incoming message to the work item it continues, if any.
//!
//! Resolution order, first success wins:
//! 1. Append-only: an explicit id in the subject, then in the body
//! 2. Cache: the message's conversation key against known conversations
//! 3. Nothing; the caller creates a new work item
//!
//! Cache keys are tried in ascending order. In full-index mode more than one
//! stored key can be a prefix of the query; the smallest such key wins.

use regex::Regex;
use tracing::{debug, info};

use crate::config::{ConversationKeyMode, EmailSettings, compile_regex};
use crate::error::ConfigError;
use crate::mail::IncomingMessage;
use crate::workitems::cache::{WorkItemCache, WorkItemId};

const ID_GROUP: &str = "id";
const TITLE_REGEX_KEY: &str = "email.append_only_title_regex";
const BODY_REGEX_KEY: &str = "email.append_only_body_regex";

/// Resolves messages to existing work item ids.
#[derive(Debug, Clone)]
pub struct ConversationResolver {
    title_regex: Option<Regex>,
    body_regex: Option<Regex>,
    mode: ConversationKeyMode,
}

impl ConversationResolver {
    /// Build from patterns; blank patterns disable that step.
    pub fn new(
        title_pattern: Option<&str>,
        body_pattern: Option<&str>,
        mode: ConversationKeyMode,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            title_regex: compile_optional(TITLE_REGEX_KEY, title_pattern)?,
            body_regex: compile_optional(BODY_REGEX_KEY, body_pattern)?,
            mode,
        })
    }

    pub fn from_settings(settings: &EmailSettings) -> Result<Self, ConfigError> {
        Self::new(
            settings.append_only_title_regex.as_deref(),
            settings.append_only_body_regex.as_deref(),
            settings.conversation_key_mode,
        )
    }

    pub fn mode(&self) -> ConversationKeyMode {
        self.mode
    }

    /// The work item this message continues, or `None` for a new one.
    pub fn resolve(
        &self,
        message: &IncomingMessage,
        cache: &dyn WorkItemCache,
    ) -> Result<Option<WorkItemId>, ConfigError> {
        if let Some(id) = self.append_only_id(message)? {
            info!(work_item_id = %id, subject = %message.subject, "Append-only message");
            return Ok(Some(id));
        }

        Ok(lookup_conversation(
            message.conversation_key(self.mode),
            cache,
            self.mode,
        ))
    }

    /// Explicit work item id stated in the subject or body.
    pub fn append_only_id(&self, message: &IncomingMessage) -> Result<Option<WorkItemId>, ConfigError> {
        if let Some(id) = extract_id(&message.subject, self.title_regex.as_ref(), TITLE_REGEX_KEY)? {
            return Ok(Some(id));
        }
        extract_id(&message.plain_text_body, self.body_regex.as_ref(), BODY_REGEX_KEY)
    }
}

/// Find the work item for a conversation key.
///
/// Blank keys never match, on either side.
pub fn lookup_conversation(
    key: &str,
    cache: &dyn WorkItemCache,
    mode: ConversationKeyMode,
) -> Option<WorkItemId> {
    debug!(conversation_key = %key, mode = mode.as_str(), "Looking up conversation");
    if key.trim().is_empty() {
        return None;
    }

    for (cached_key, id) in cache.entries() {
        if cached_key.trim().is_empty() {
            debug!("Skipping cache entry with empty conversation key");
            continue;
        }

        let matched = match mode {
            ConversationKeyMode::GuidOnly => key == cached_key,
            ConversationKeyMode::FullIndex => key.starts_with(cached_key),
        };

        if matched {
            debug!(
                conversation_key = %key,
                cached_key = %cached_key,
                work_item_id = %id,
                "Matched conversation"
            );
            return Some(id);
        }
    }

    None
}

fn compile_optional(key: &str, pattern: Option<&str>) -> Result<Option<Regex>, ConfigError> {
    pattern
        .filter(|p| !p.trim().is_empty())
        .map(|p| compile_regex(key, p, true))
        .transpose()
}

fn extract_id(text: &str, regex: Option<&Regex>, key: &str) -> Result<Option<WorkItemId>, ConfigError> {
    let Some(regex) = regex else {
        return Ok(None);
    };
    let Some(captures) = regex.captures(text) else {
        return Ok(None);
    };

    let raw = captures
        .name(ID_GROUP)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingCaptureGroup {
            key: key.to_string(),
            group: ID_GROUP.to_string(),
        })?;

    raw.parse::<u64>()
        .ok()
        .and_then(WorkItemId::new)
        .map(Some)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("captured id '{raw}' is not a positive integer"),
        })
}

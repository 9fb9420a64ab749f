//! Incoming message snapshot handed to the engine by a mail folder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ConversationKeyMode;
use crate::mail::text::{strip_quoted_text, strip_reply_prefixes};

/// Hex offset of the conversation GUID inside a conversation index
/// (bytes 6..22 of the binary index).
const GUID_HEX_START: usize = 12;
const GUID_HEX_LEN: usize = 32;

/// Immutable snapshot of one message in the shared mailbox.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Folder-assigned identifier (file name, item id).
    pub id: String,
    pub subject: String,
    pub plain_text_body: String,
    /// Hex-encoded conversation index. Replies extend their parent's index.
    pub conversation_index: String,
    /// Hex-encoded conversation GUID, when the folder exposes it directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_guid: Option<String>,
    pub received_at: DateTime<Utc>,
    pub sender_name: String,
    pub sender_address: String,
    #[serde(default)]
    pub to_addresses: Vec<String>,
    #[serde(default)]
    pub to_names: Vec<String>,
    #[serde(default)]
    pub cc_addresses: Vec<String>,
    #[serde(default)]
    pub cc_names: Vec<String>,
    /// Meeting request metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl IncomingMessage {
    /// Key used to match this message against the work item cache.
    pub fn conversation_key(&self, mode: ConversationKeyMode) -> &str {
        match mode {
            ConversationKeyMode::FullIndex => &self.conversation_index,
            ConversationKeyMode::GuidOnly => match self.conversation_guid.as_deref() {
                Some(guid) if !guid.is_empty() => guid,
                _ => self
                    .conversation_index
                    .get(GUID_HEX_START..GUID_HEX_START + GUID_HEX_LEN)
                    .unwrap_or(&self.conversation_index),
            },
        }
    }

    /// Subject without `RE:`/`FW:` prefixes.
    pub fn conversation_topic(&self) -> &str {
        strip_reply_prefixes(&self.subject)
    }

    /// Text of the latest message in the thread, without quoted history.
    pub fn last_message_text(&self) -> String {
        strip_quoted_text(&self.plain_text_body)
    }

    /// Subject and body, as scanned for mnemonics and inline overrides.
    pub fn full_text(&self) -> String {
        format!("{}\n{}\n", self.subject, self.plain_text_body)
    }

    /// All To/Cc addresses and display names, Cc first.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.cc_addresses
            .iter()
            .chain(&self.cc_names)
            .chain(&self.to_addresses)
            .chain(&self.to_names)
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 22-byte header (44 hex chars) followed by one 5-byte reply block.
    const INDEX: &str = "01D9A1B2C3D4E5F60718293A4B5C6D7E8F90A1B2C3D4AABBCCDDEE";

    fn message() -> IncomingMessage {
        IncomingMessage {
            id: "m1".into(),
            subject: "RE: Build broken".into(),
            plain_text_body: "Still failing.\n\nOn Tue, Bob wrote:\n> it fails".into(),
            conversation_index: INDEX.into(),
            to_addresses: vec!["ops@contoso.com".into()],
            to_names: vec!["Ops".into()],
            cc_addresses: vec!["lead@contoso.com".into()],
            cc_names: vec!["Lead".into()],
            ..Default::default()
        }
    }

    #[test]
    fn full_index_key_is_the_whole_index() {
        assert_eq!(message().conversation_key(ConversationKeyMode::FullIndex), INDEX);
    }

    #[test]
    fn guid_key_is_cut_from_index() {
        let msg = message();
        assert_eq!(
            msg.conversation_key(ConversationKeyMode::GuidOnly),
            "E5F60718293A4B5C6D7E8F90A1B2C3D4"
        );
    }

    #[test]
    fn guid_key_prefers_explicit_guid() {
        let msg = IncomingMessage {
            conversation_guid: Some("ABC123".into()),
            ..message()
        };
        assert_eq!(msg.conversation_key(ConversationKeyMode::GuidOnly), "ABC123");
    }

    #[test]
    fn guid_key_falls_back_to_short_index() {
        let msg = IncomingMessage {
            conversation_index: "ABC123".into(),
            ..Default::default()
        };
        assert_eq!(msg.conversation_key(ConversationKeyMode::GuidOnly), "ABC123");
    }

    #[test]
    fn topic_strips_reply_prefix() {
        assert_eq!(message().conversation_topic(), "Build broken");
    }

    #[test]
    fn last_message_text_drops_history() {
        assert_eq!(message().last_message_text(), "Still failing.");
    }

    #[test]
    fn recipients_lists_cc_before_to() {
        let msg = message();
        let all: Vec<&str> = msg.recipients().collect();
        assert_eq!(all, vec!["lead@contoso.com", "Lead", "ops@contoso.com", "Ops"]);
    }
}

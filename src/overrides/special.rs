//! Keywords that default field values can use to pull data from the message.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::mail::IncomingMessage;

const NO_SUBJECT: &str = "NO SUBJECT";
const NO_TIME: &str = "No time specified (probably this is not a meeting request)";

/// A special keyword in a default field value, e.g. `##Subject`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialValue {
    Subject,
    Sender,
    MessageBody,
    MessageBodyWithSender,
    RawMessageBody,
    Now,
    Today,
    Location,
    StartTime,
    EndTime,
}

impl SpecialValue {
    pub const ALL: [SpecialValue; 10] = [
        Self::Subject,
        Self::Sender,
        Self::MessageBody,
        Self::MessageBodyWithSender,
        Self::RawMessageBody,
        Self::Now,
        Self::Today,
        Self::Location,
        Self::StartTime,
        Self::EndTime,
    ];

    /// Parse a keyword. Matching is case-sensitive.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.keyword() == value)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Subject => "##Subject",
            Self::Sender => "##Sender",
            Self::MessageBody => "##MessageBody",
            Self::MessageBodyWithSender => "##MessageBodyWithSender",
            Self::RawMessageBody => "##RawMessageBody",
            Self::Now => "##Now",
            Self::Today => "##Today",
            Self::Location => "##Location",
            Self::StartTime => "##StartTime",
            Self::EndTime => "##EndTime",
        }
    }

    /// The value this keyword stands for in `message` at time `now`.
    pub fn resolve(self, message: &IncomingMessage, now: DateTime<Utc>) -> String {
        match self {
            Self::Subject => {
                let topic = message.conversation_topic();
                if topic.is_empty() {
                    NO_SUBJECT.to_string()
                } else {
                    topic.to_string()
                }
            }
            Self::Sender => {
                if message.sender_name.trim().is_empty() {
                    message.sender_address.clone()
                } else {
                    message.sender_name.clone()
                }
            }
            Self::MessageBody => normalize_line_breaks(&message.plain_text_body),
            Self::MessageBodyWithSender => format!(
                "{}\n\nCreated by: {} ({})",
                normalize_line_breaks(&message.plain_text_body),
                message.sender_name,
                message.sender_address
            ),
            Self::RawMessageBody => message.plain_text_body.clone(),
            Self::Now => now.format("%Y-%m-%d %H:%M").to_string(),
            Self::Today => now.format("%Y-%m-%d").to_string(),
            Self::Location => message.location.clone().unwrap_or_default(),
            Self::StartTime => time_or_placeholder(message.start_time),
            Self::EndTime => time_or_placeholder(message.end_time),
        }
    }
}

/// Resolve a configured default value: keywords are substituted, anything
/// else is returned as is.
pub fn resolve_default(value: &str, message: &IncomingMessage, now: DateTime<Utc>) -> String {
    match SpecialValue::parse(value) {
        Some(keyword) => {
            let resolved = keyword.resolve(message, now);
            debug!(keyword = keyword.keyword(), resolved = %resolved, "Resolved special value");
            resolved
        }
        None => value.to_string(),
    }
}

fn normalize_line_breaks(text: &str) -> String {
    text.replace("\r\n", "\n")
}

fn time_or_placeholder(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339()).unwrap_or_else(|| NO_TIME.to_string())
}

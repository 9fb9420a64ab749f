//! Directory-of-`.eml`-files mail folder.
//!
//! Each scan parses every `.eml` file in the directory. Finished messages are
//! moved into `completed/` or `error/` so the next scan does not see them.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use mail_parser::{Address, MessageParser};
use tracing::{debug, info, warn};

use crate::error::MailError;
use crate::mail::{IncomingMessage, MailFolder};

const COMPLETED_DIR: &str = "completed";
const ERROR_DIR: &str = "error";

/// Mail folder backed by a directory of RFC 5322 files.
#[derive(Debug, Clone)]
pub struct EmlDirectoryFolder {
    root: PathBuf,
}

impl EmlDirectoryFolder {
    /// Open a folder. The directory must exist.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, MailError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(MailError::FolderNotFound { path: root });
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_message(&self, path: &Path) -> Result<IncomingMessage, MailError> {
        let raw = std::fs::read(path)?;
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        parse_eml(&id, &raw)
    }
}

impl MailFolder for EmlDirectoryFolder {
    fn messages(&self) -> Result<Vec<IncomingMessage>, MailError> {
        let mut messages = Vec::new();

        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "eml") {
                continue;
            }

            match self.read_message(&path) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable message"),
            }
        }

        debug!(count = messages.len(), root = %self.root.display(), "Scanned mail folder");
        Ok(messages)
    }

    fn finish(&self, message: &IncomingMessage, successful: bool) -> Result<(), MailError> {
        let target_dir = self
            .root
            .join(if successful { COMPLETED_DIR } else { ERROR_DIR });
        std::fs::create_dir_all(&target_dir)?;

        let source = self.root.join(&message.id);
        if !source.is_file() {
            return Err(MailError::UnknownMessage {
                id: message.id.clone(),
            });
        }

        std::fs::rename(&source, target_dir.join(&message.id))?;
        info!(id = %message.id, successful, "Moved finished message");
        Ok(())
    }
}

/// Parse one `.eml` file into a message snapshot.
pub fn parse_eml(id: &str, raw: &[u8]) -> Result<IncomingMessage, MailError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailError::Parse {
            id: id.to_string(),
            reason: "not an RFC 5322 message".into(),
        })?;

    let (sender_name, sender_address) = parsed
        .from()
        .and_then(|addr| addr.first())
        .map(|a| {
            (
                a.name.as_deref().unwrap_or_default().to_string(),
                a.address.as_deref().unwrap_or_default().to_string(),
            )
        })
        .unwrap_or_default();

    let (to_names, to_addresses) = split_addresses(parsed.to());
    let (cc_names, cc_addresses) = split_addresses(parsed.cc());

    let received_at = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);

    let conversation_index = raw_header(raw, "Thread-Index")
        .and_then(|value| thread_index_to_hex(&value))
        .or_else(|| raw_header(raw, "References").and_then(|refs| first_message_id(&refs)))
        .or_else(|| parsed.message_id().map(str::to_string))
        .unwrap_or_default();

    Ok(IncomingMessage {
        id: id.to_string(),
        subject: parsed.subject().unwrap_or_default().to_string(),
        plain_text_body: parsed
            .body_text(0)
            .map(|text| text.into_owned())
            .unwrap_or_default(),
        conversation_index,
        conversation_guid: None,
        received_at,
        sender_name,
        sender_address,
        to_addresses,
        to_names,
        cc_addresses,
        cc_names,
        location: None,
        start_time: None,
        end_time: None,
    })
}

/// Split an address header into (display names, addresses).
fn split_addresses(addr: Option<&Address>) -> (Vec<String>, Vec<String>) {
    let mut names = Vec::new();
    let mut addresses = Vec::new();

    let mut push = |a: &mail_parser::Addr| {
        if let Some(name) = a.name.as_deref() {
            names.push(name.to_string());
        }
        if let Some(address) = a.address.as_deref() {
            addresses.push(address.to_string());
        }
    };

    match addr {
        Some(Address::List(list)) => list.iter().for_each(&mut push),
        Some(Address::Group(groups)) => groups
            .iter()
            .flat_map(|g| g.addresses.iter())
            .for_each(&mut push),
        None => {}
    }

    (names, addresses)
}

/// Find an unfolded header value in the raw header block.
fn raw_header(raw: &[u8], name: &str) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let mut value: Option<String> = None;

    for line in text.lines() {
        if line.is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some(v) = value.as_mut() {
                v.push(' ');
                v.push_str(line.trim());
            }
            continue;
        }
        if value.is_some() {
            break;
        }
        if let Some((header, rest)) = line.split_once(':')
            && header.trim().eq_ignore_ascii_case(name)
        {
            value = Some(rest.trim().to_string());
        }
    }

    value.filter(|v| !v.is_empty())
}

/// Decode a base64 `Thread-Index` into upper-case hex.
fn thread_index_to_hex(value: &str) -> Option<String> {
    let bytes = STANDARD.decode(value.trim()).ok()?;
    if bytes.is_empty() {
        return None;
    }
    Some(bytes.iter().map(|b| format!("{b:02X}")).collect())
}

/// Root message id of a `References` header.
fn first_message_id(references: &str) -> Option<String> {
    references
        .split_whitespace()
        .next()
        .map(|id| id.trim_matches(['<', '>']).to_string())
        .filter(|id| !id.is_empty())
}

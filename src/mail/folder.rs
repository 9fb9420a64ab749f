//! Mail folder abstraction, the mailbox side of the engine.

use std::sync::Mutex;

use tracing::debug;

use crate::error::MailError;
use crate::mail::IncomingMessage;

/// A folder the router scans once per cycle.
///
/// Implementations do the I/O. Message order is not trusted by callers.
pub trait MailFolder: Send + Sync {
    /// Snapshot every message currently in the folder.
    fn messages(&self) -> Result<Vec<IncomingMessage>, MailError>;

    /// Called once a pipeline is done with a message.
    ///
    /// Messages that are never finished stay in the folder and are seen
    /// again by the next scan.
    fn finish(&self, _message: &IncomingMessage, _successful: bool) -> Result<(), MailError> {
        Ok(())
    }
}

/// Thread-safe in-memory folder.
///
/// Finishing a message removes it, whatever the outcome.
#[derive(Debug, Default)]
pub struct MemoryFolder {
    messages: Mutex<Vec<IncomingMessage>>,
}

impl MemoryFolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Vec<IncomingMessage>) -> Self {
        Self {
            messages: Mutex::new(messages),
        }
    }

    pub fn add(&self, message: IncomingMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MailFolder for MemoryFolder {
    fn messages(&self) -> Result<Vec<IncomingMessage>, MailError> {
        let messages = self
            .messages
            .lock()
            .map_err(|_| MailError::Io(std::io::Error::other("memory folder lock poisoned")))?;
        Ok(messages.clone())
    }

    fn finish(&self, message: &IncomingMessage, successful: bool) -> Result<(), MailError> {
        let mut messages = self
            .messages
            .lock()
            .map_err(|_| MailError::Io(std::io::Error::other("memory folder lock poisoned")))?;
        let before = messages.len();
        messages.retain(|m| m.id != message.id);
        if messages.len() == before {
            return Err(MailError::UnknownMessage {
                id: message.id.clone(),
            });
        }
        debug!(id = %message.id, successful, "Removed finished message from memory folder");
        Ok(())
    }
}

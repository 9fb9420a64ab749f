//! Recipient-based consumers of the shared mailbox.
//!
//! Each instance names the aliases or display names it owns; the router gives
//! it every message that has one of them on the To or Cc line.

use std::sync::Arc;

use crate::error::{MailError, RoutingError};
use crate::mail::IncomingMessage;
use crate::mail::text::eq_ignore_case;
use crate::routing::router::{ConsumerId, MessageEvaluator, MessageQueue, MessageRouter};

/// Accepts messages addressed to any of the configured recipients.
#[derive(Debug, Clone, Default)]
pub struct RecipientFilter {
    recipients: Vec<String>,
}

impl RecipientFilter {
    pub fn new(recipients: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            recipients: recipients
                .into_iter()
                .map(Into::into)
                .map(|r: String| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
        }
    }

    /// Parse the legacy semicolon-delimited recipients string.
    pub fn from_delimited(recipients: &str) -> Self {
        Self::new(recipients.split(';'))
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Empty filter accepts everything.
    pub fn accepts(&self, message: &IncomingMessage) -> bool {
        if self.recipients.is_empty() {
            return true;
        }

        self.recipients.iter().any(|recipient| {
            message
                .recipients()
                .any(|candidate| eq_ignore_case(candidate, recipient))
        })
    }
}

impl MessageEvaluator for RecipientFilter {
    fn evaluate(&self, message: &IncomingMessage) -> Result<bool, RoutingError> {
        Ok(self.accepts(message))
    }
}

/// One instance's view of the routed mailbox.
pub struct RoutedMailbox {
    router: Arc<MessageRouter>,
    consumer_id: ConsumerId,
}

impl RoutedMailbox {
    /// Register `filter` with the router.
    pub fn register(router: Arc<MessageRouter>, filter: RecipientFilter) -> Result<Self, RoutingError> {
        let consumer_id = router.register(Arc::new(filter))?;
        Ok(Self {
            router,
            consumer_id,
        })
    }

    pub fn consumer_id(&self) -> ConsumerId {
        self.consumer_id
    }

    /// Messages routed to this mailbox in the current cycle.
    pub fn read_messages(&self) -> Result<MessageQueue, RoutingError> {
        self.router.messages(self.consumer_id)
    }

    /// Report the outcome of processing a message back to the folder.
    pub fn finish(&self, message: &IncomingMessage, successful: bool) -> Result<(), MailError> {
        self.router.folder().finish(message, successful)
    }
}

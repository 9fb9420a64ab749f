//! One logical instance: a routed mailbox plus its item strategy.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::InstanceConfig;
use crate::error::PipelineError;
use crate::mail::IncomingMessage;
use crate::pipeline::strategy::{ItemOutcome, ItemStrategy};
use crate::routing::{MessageRouter, RecipientFilter, RoutedMailbox};
use crate::workitems::WorkItemStore;

/// Outcome of one pass over an instance's queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboxReport {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

impl InboxReport {
    pub fn processed(&self) -> usize {
        self.created + self.updated
    }
}

pub struct Instance {
    config: Arc<InstanceConfig>,
    mailbox: RoutedMailbox,
    store: Arc<dyn WorkItemStore>,
    strategy: Option<ItemStrategy>,
}

impl Instance {
    /// Register the instance's recipient filter with `router`.
    pub fn new(
        config: InstanceConfig,
        router: Arc<MessageRouter>,
        store: Arc<dyn WorkItemStore>,
    ) -> Result<Self, PipelineError> {
        let filter = RecipientFilter::new(config.email.recipients.iter().cloned());
        let mailbox = RoutedMailbox::register(router, filter)?;
        info!(
            instance = %config.name,
            consumer_id = mailbox.consumer_id(),
            "Registered instance"
        );

        Ok(Self {
            config: Arc::new(config),
            mailbox,
            store,
            strategy: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn mailbox(&self) -> &RoutedMailbox {
        &self.mailbox
    }

    /// Process every message routed to this instance in the current cycle.
    ///
    /// A failed message is reported to the folder and skipped. A configuration
    /// error stops the rest of this instance's cycle and is returned.
    pub async fn process_inbox(&mut self) -> Result<InboxReport, PipelineError> {
        let messages = self.mailbox.read_messages()?;
        info!(instance = %self.config.name, count = messages.len(), "Processing inbox");

        let mut report = InboxReport::default();
        for message in messages.iter() {
            match self.process_message(message).await {
                Ok(outcome) => {
                    match outcome {
                        ItemOutcome::Created(_) => report.created += 1,
                        ItemOutcome::Updated(_) => report.updated += 1,
                    }
                    self.finish(message, true);
                }
                Err(e) if e.is_fatal_for_cycle() => {
                    error!(
                        instance = %self.config.name,
                        message_id = %message.id,
                        error = %e,
                        "Aborting instance cycle"
                    );
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        instance = %self.config.name,
                        message_id = %message.id,
                        subject = %message.subject,
                        error = %e,
                        "Failed to process message"
                    );
                    report.failed += 1;
                    self.finish(message, false);
                }
            }
        }

        info!(
            instance = %self.config.name,
            created = report.created,
            updated = report.updated,
            failed = report.failed,
            "Inbox processed"
        );
        Ok(report)
    }

    async fn process_message(
        &mut self,
        message: &IncomingMessage,
    ) -> Result<ItemOutcome, PipelineError> {
        let strategy = match &mut self.strategy {
            Some(strategy) => strategy,
            slot => slot.insert(
                ItemStrategy::new(Arc::clone(&self.config), Arc::clone(&self.store)).await?,
            ),
        };
        strategy.process(message).await
    }

    fn finish(&self, message: &IncomingMessage, successful: bool) {
        if let Err(e) = self.mailbox.finish(message, successful) {
            warn!(message_id = %message.id, error = %e, "Failed to finish message");
        }
    }
}

//! Turns one routed message into a work item create or update.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::config::InstanceConfig;
use crate::error::PipelineError;
use crate::mail::IncomingMessage;
use crate::overrides::{OverrideResolver, SpecialValue, resolve_default};
use crate::workitems::{
    ConversationResolver, FieldValues, SortedWorkItemCache, WorkItemCache, WorkItemId,
    WorkItemStore,
};

/// Longest value a work item text field accepts.
const TEXT_FIELD_MAX_CHARS: usize = 255;

const TITLE_FIELD: &str = "Title";
const CHANGED_BY_FIELD: &str = "Changed By";

/// What processing a message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Created(WorkItemId),
    Updated(WorkItemId),
}

impl ItemOutcome {
    pub fn id(self) -> WorkItemId {
        match self {
            Self::Created(id) | Self::Updated(id) => id,
        }
    }
}

/// Per-instance create-or-update logic, with the instance's conversation cache.
pub struct ItemStrategy {
    config: Arc<InstanceConfig>,
    store: Arc<dyn WorkItemStore>,
    conversations: ConversationResolver,
    overrides: OverrideResolver,
    cache: SortedWorkItemCache,
}

impl ItemStrategy {
    /// Compile the instance's rules and seed the cache from the store.
    pub async fn new(
        config: Arc<InstanceConfig>,
        store: Arc<dyn WorkItemStore>,
    ) -> Result<Self, PipelineError> {
        let conversations = ConversationResolver::from_settings(&config.email)?;
        let overrides = OverrideResolver::from_config(&config)?;
        let cache: SortedWorkItemCache = store.conversations().await?.into_iter().collect();

        info!(
            instance = %config.name,
            cached_conversations = cache.len(),
            mode = conversations.mode().as_str(),
            "Initialised item strategy"
        );

        Ok(Self {
            config,
            store,
            conversations,
            overrides,
            cache,
        })
    }

    pub fn cache(&self) -> &SortedWorkItemCache {
        &self.cache
    }

    pub async fn process(&mut self, message: &IncomingMessage) -> Result<ItemOutcome, PipelineError> {
        self.process_at(message, Utc::now()).await
    }

    /// Process with `now` as the time for date-based values and keywords.
    pub async fn process_at(
        &mut self,
        message: &IncomingMessage,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, PipelineError> {
        match self.conversations.resolve(message, &self.cache)? {
            Some(id) => {
                self.update_item(message, id, now).await?;
                Ok(ItemOutcome::Updated(id))
            }
            None => self.new_item(message, now).await.map(ItemOutcome::Created),
        }
    }

    async fn new_item(
        &mut self,
        message: &IncomingMessage,
        now: DateTime<Utc>,
    ) -> Result<WorkItemId, PipelineError> {
        let settings = &self.config.work_items;
        let key: String = message
            .conversation_key(self.conversations.mode())
            .chars()
            .take(TEXT_FIELD_MAX_CHARS)
            .collect();

        let mut fields = FieldValues::new();
        fields.insert(
            TITLE_FIELD.to_string(),
            SpecialValue::Subject.resolve(message, now),
        );
        fields.insert(settings.conversation_index_field.clone(), key.clone());
        for default in &settings.default_field_values {
            fields.insert(
                default.field.clone(),
                resolve_default(&default.value, message, now),
            );
        }

        let id = self.store.create(&fields).await?;
        info!(
            instance = %self.config.name,
            work_item_id = %id,
            subject = %message.subject,
            conversation_key = %key,
            "Added new work item"
        );
        self.cache.insert(key, id);

        // The item exists now; failing to apply overrides must not fail the message.
        let overrides = self.overrides.for_message_at(message, now);
        if overrides.is_empty() {
            debug!(work_item_id = %id, "No overrides found");
        } else if let Err(e) = self.store.modify(id, "", &overrides).await {
            error!(
                work_item_id = %id,
                overrides = ?overrides,
                error = %e,
                "Failed to apply overrides to new work item"
            );
        }

        Ok(id)
    }

    async fn update_item(
        &self,
        message: &IncomingMessage,
        id: WorkItemId,
        now: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        info!(
            instance = %self.config.name,
            work_item_id = %id,
            subject = %message.subject,
            "Modifying work item"
        );

        let settings = &self.config.work_items;
        let last_message = message.last_message_text();
        let mut fields = FieldValues::new();

        if settings.override_changed_by {
            fields.insert(
                CHANGED_BY_FIELD.to_string(),
                SpecialValue::Sender.resolve(message, now),
            );
        }
        if settings.apply_overrides_during_update {
            let overrides = self.overrides.for_text(&last_message);
            debug!(count = overrides.len(), "Found overrides for update message");
            fields.extend(overrides);
        }

        self.store.modify(id, &last_message, &fields).await?;
        Ok(())
    }
}

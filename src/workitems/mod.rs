//! Work item identity, the conversation cache, and the backend.

pub mod cache;
pub mod conversation;
pub mod store;

pub use cache::{SortedWorkItemCache, WorkItemCache, WorkItemId};
pub use conversation::{ConversationResolver, lookup_conversation};
pub use store::{FieldValues, SimulatedWorkItem, SimulatedWorkItemStore, WorkItemStore};

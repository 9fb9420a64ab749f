//! Routing of the shared mailbox to logical instances.

pub mod recipients;
pub mod router;

pub use recipients::{RecipientFilter, RoutedMailbox};
pub use router::{
    ConsumerId, CycleReport, FIRST_CONSUMER_ID, MessageEvaluator, MessageQueue, MessageRouter,
};

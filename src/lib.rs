//! Routes a shared mailbox to tracked work items.

pub mod config;
pub mod error;
pub mod mail;
pub mod overrides;
pub mod pipeline;
pub mod routing;
pub mod workitems;

//! Mailbox side: message snapshots and the folders that produce them.

pub mod eml;
pub mod folder;
pub mod message;
pub mod text;

pub use eml::EmlDirectoryFolder;
pub use folder::{MailFolder, MemoryFolder};
pub use message::IncomingMessage;

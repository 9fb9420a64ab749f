//! Field values requested by a message: overrides and special keywords.

pub mod date_range;
pub mod resolver;
pub mod special;

pub use date_range::DateRangeResolver;
pub use resolver::{OverrideMap, OverrideResolver};
pub use special::{SpecialValue, resolve_default};

//! Piecewise-constant value lookup keyed by start date.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::DateBasedFieldOverrides;

/// Resolves the value in effect at a given time.
///
/// Each breakpoint takes effect at its start date (inclusive) and lasts until
/// the next one. The default is stored at the earliest representable instant,
/// so every query resolves.
#[derive(Debug, Clone)]
pub struct DateRangeResolver {
    values_by_start: BTreeMap<DateTime<Utc>, String>,
}

impl DateRangeResolver {
    pub fn new(
        default_value: impl Into<String>,
        breakpoints: impl IntoIterator<Item = (DateTime<Utc>, String)>,
    ) -> Self {
        let mut values_by_start: BTreeMap<_, _> = breakpoints.into_iter().collect();
        values_by_start.insert(DateTime::<Utc>::MIN_UTC, default_value.into());
        Self { values_by_start }
    }

    pub fn from_settings(settings: &DateBasedFieldOverrides) -> Self {
        Self::new(
            settings.default_value.clone(),
            settings
                .entries
                .iter()
                .map(|entry| (entry.start_date, entry.value.clone())),
        )
    }

    /// Value of the latest breakpoint starting at or before `date`.
    pub fn resolve(&self, date: DateTime<Utc>) -> &str {
        let Some((start, value)) = self.values_by_start.range(..=date).next_back() else {
            // Only reachable if the default entry was removed.
            return "";
        };
        debug!(date = %date, start = %start, value = %value, "Resolved date-based value");
        value
    }
}

//! Filtering for journal entries
//!
//! See systemd.journal-fields(7) for the fields available on an entry.

use std::sync::Arc;

use journalship_types::{Event, VALID_TRANSPORTS, list_contains, list_intersect, list_subtract};

/// A pure predicate over a journal entry
pub type FilterFn = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Ordered AND-chain of predicates
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<FilterFn>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter function to the end of the chain
    pub fn add_filter(&mut self, filter: FilterFn) {
        self.filters.push(filter);
    }

    /// Builder-style `add_filter`
    pub fn with_filter(mut self, filter: FilterFn) -> Self {
        self.add_filter(filter);
        self
    }

    /// True iff every filter accepts the entry; an empty chain accepts everything
    pub fn want(&self, event: &Event) -> bool {
        self.filters.iter().all(|f| f(event))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.filters.len())
            .finish()
    }
}

/// Accepts entries whose transport is one of `allowed`
pub fn by_transport(allowed: Vec<String>) -> FilterFn {
    Arc::new(move |e: &Event| list_contains(&allowed, e.transport()))
}

/// Rejects entries from the named systemd units; entries without a unit pass
pub fn exclude_units(excluded: Vec<String>) -> FilterFn {
    Arc::new(move |e: &Event| {
        let unit = e.systemd_unit();
        unit.is_empty() || !list_contains(&excluded, unit)
    })
}

/// Transports to listen for: the valid set, narrowed to `include` when it
/// is non-empty, minus `exclude`
pub fn allowed_transports(include: &[String], exclude: &[String]) -> Vec<String> {
    let transports = if include.is_empty() {
        VALID_TRANSPORTS.iter().map(|t| t.to_string()).collect()
    } else {
        list_intersect(&VALID_TRANSPORTS, include)
    };
    if exclude.is_empty() {
        transports
    } else {
        list_subtract(&transports, exclude)
    }
}

//! Per-field debouncing of filter edits.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::model::{Filters, SortKey, Visibility};

/// Quiet period a field must observe before its value takes effect.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Debounced filter fields. Each one has its own timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterField {
    /// Free-text search.
    Search,
    /// Category.
    Category,
    /// Visibility.
    Visibility,
    /// Tag.
    Tag,
    /// Sort order.
    Sort,
}

/// A single UI-side change to one filter field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChange {
    /// New search text.
    Search(String),
    /// New category (`None` clears it).
    Category(Option<String>),
    /// New visibility.
    Visibility(Visibility),
    /// New tag (`None` clears it).
    Tag(Option<String>),
    /// New sort order.
    Sort(SortKey),
}

impl FilterChange {
    /// Field this change targets.
    pub fn field(&self) -> FilterField {
        match self {
            Self::Search(_) => FilterField::Search,
            Self::Category(_) => FilterField::Category,
            Self::Visibility(_) => FilterField::Visibility,
            Self::Tag(_) => FilterField::Tag,
            Self::Sort(_) => FilterField::Sort,
        }
    }

    fn apply_to(self, filters: &mut Filters) {
        match self {
            Self::Search(s) => filters.search = s,
            Self::Category(c) => filters.category = blank_to_none(c),
            Self::Visibility(v) => filters.visibility = v,
            Self::Tag(t) => filters.tag = blank_to_none(t),
            Self::Sort(s) => filters.sort = s,
        }
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Clock-injected, per-field debouncer.
///
/// Every change restarts the timer of its field. Pending values are only
/// committed once *all* pending timers have elapsed, so changes to several
/// fields collapse into one recomputation. A commit that leaves the filters
/// unchanged yields nothing.
#[derive(Debug, Clone)]
pub struct FilterDebouncer {
    window: Duration,
    settled: Filters,
    pending: BTreeMap<FilterField, (FilterChange, Instant)>,
}

impl FilterDebouncer {
    /// Debouncer starting from already-effective `settled` filters.
    pub fn new(settled: Filters, window: Duration) -> Self {
        Self {
            window,
            settled,
            pending: BTreeMap::new(),
        }
    }

    /// Records a change at `now`, restarting that field's timer.
    pub fn push(&mut self, change: FilterChange, now: Instant) {
        let deadline = now + self.window;
        self.pending.insert(change.field(), (change, deadline));
    }

    /// Instant at which every pending timer will have elapsed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|(_, deadline)| *deadline).max()
    }

    /// True if any field is still waiting out its window.
    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Commits pending changes if all timers elapsed by `now`.
    ///
    /// Returns the new effective filters when they differ from the
    /// previously settled ones.
    pub fn poll(&mut self, now: Instant) -> Option<Filters> {
        let deadline = self.next_deadline()?;
        if deadline > now {
            return None;
        }
        let mut next = self.settled.clone();
        for (_, (change, _)) in std::mem::take(&mut self.pending) {
            change.apply_to(&mut next);
        }
        if next == self.settled {
            return None;
        }
        self.settled = next.clone();
        Some(next)
    }

    /// Currently effective filters.
    pub fn settled(&self) -> &Filters {
        &self.settled
    }
}

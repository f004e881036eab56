//! Collection loader state machine: a pure reducer from events to fetch
//! commands.

use std::collections::HashSet;

use crate::error::ApiError;
use crate::model::{Filters, ItemId, Keyed, PageResult, Query};

/// Phase of a collection loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderPhase {
    /// Created, nothing requested yet.
    Idle,
    /// Page 1 of the current lineage is in flight.
    LoadingFirstPage,
    /// A follow-up page is in flight.
    LoadingNextPage,
    /// Last fetch succeeded.
    Ready,
    /// Last fetch failed.
    Error,
}

/// Tag attached to every fetch. A completion is applied only if its ticket
/// is the one the state is waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchTicket {
    /// Lineage counter, bumped on every filter change or refresh.
    pub generation: u64,
    /// Query the fetch was issued for.
    pub query: Query,
}

/// Inputs to the loader state machine.
#[derive(Debug, Clone)]
pub enum LoaderEvent<T> {
    /// The consuming view mounted.
    Mount,
    /// Debounced filters settled on new values.
    FiltersChanged(Filters),
    /// Reload the current lineage from page 1.
    Refresh,
    /// The scroll sentinel became visible.
    SentinelVisible,
    /// Manual retry after an error.
    Retry,
    /// A fetch completed successfully.
    PageLoaded {
        /// Ticket the fetch was issued with.
        ticket: FetchTicket,
        /// Fetched page.
        page: PageResult<T>,
    },
    /// An item was deleted elsewhere and must leave the collection.
    ItemRemoved(ItemId),
    /// A fetch failed terminally.
    PageFailed {
        /// Ticket the fetch was issued with.
        ticket: FetchTicket,
        /// Final error.
        error: ApiError,
    },
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderCommand {
    /// Start a fetch. Any other fetch still in flight is superseded.
    Fetch(FetchTicket),
}

/// Loader state exposed to the UI layer.
///
/// Invariant: `items` is the id-deduplicated concatenation of every page
/// successfully fetched for the current lineage, in fetch order.
#[derive(Debug, Clone)]
pub struct CollectionState<T> {
    items: Vec<T>,
    has_more: bool,
    phase: LoaderPhase,
    error: Option<ApiError>,
    current_query: Query,
    generation: u64,
    in_flight: Option<FetchTicket>,
    seen: HashSet<ItemId>,
}

impl<T: Keyed + Clone> CollectionState<T> {
    /// Fresh `Idle` state for `filters`.
    pub fn new(filters: Filters, page_size: u32) -> Result<Self, ApiError> {
        Ok(Self {
            items: Vec::new(),
            has_more: false,
            phase: LoaderPhase::Idle,
            error: None,
            current_query: Query::first_page(filters, page_size)?,
            generation: 0,
            in_flight: None,
            seen: HashSet::new(),
        })
    }

    /// Loaded items in display order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Whether another page may be requested.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// True while a fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Current phase.
    pub fn phase(&self) -> LoaderPhase {
        self.phase
    }

    /// Error of the last failed fetch, cleared on the next success.
    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    /// Query of the most recently issued page of the current lineage.
    pub fn current_query(&self) -> &Query {
        &self.current_query
    }

    /// Ticket of the fetch in flight, if any.
    pub fn in_flight(&self) -> Option<&FetchTicket> {
        self.in_flight.as_ref()
    }

    /// True if a completion carrying `ticket` would be applied.
    pub fn accepts(&self, ticket: &FetchTicket) -> bool {
        self.in_flight.as_ref() == Some(ticket)
    }

    /// Applies one event and returns the commands it triggers.
    ///
    /// Pure: no I/O, no clock. Completions whose ticket does not match the
    /// fetch in flight are ignored.
    pub fn apply(&mut self, event: LoaderEvent<T>) -> Vec<LoaderCommand> {
        match event {
            LoaderEvent::Mount => {
                if self.phase != LoaderPhase::Idle {
                    return vec![];
                }
                let filters = self.current_query.filters.clone();
                self.start_lineage(filters, false)
            }
            LoaderEvent::FiltersChanged(filters) => {
                let changed = filters != self.current_query.filters;
                self.start_lineage(filters, changed)
            }
            LoaderEvent::Refresh => {
                let filters = self.current_query.filters.clone();
                self.start_lineage(filters, false)
            }
            LoaderEvent::SentinelVisible => {
                if self.phase != LoaderPhase::Ready || !self.has_more || self.in_flight.is_some() {
                    return vec![];
                }
                let query = self.current_query.next_page();
                self.issue(query, LoaderPhase::LoadingNextPage)
            }
            LoaderEvent::Retry => {
                if self.phase != LoaderPhase::Error || self.in_flight.is_some() {
                    return vec![];
                }
                if self.current_query.page == 1 {
                    let filters = self.current_query.filters.clone();
                    self.start_lineage(filters, false)
                } else {
                    let query = self.current_query.clone();
                    self.issue(query, LoaderPhase::LoadingNextPage)
                }
            }
            LoaderEvent::PageLoaded { ticket, page } => {
                if !self.accepts(&ticket) {
                    return vec![];
                }
                self.in_flight = None;
                self.has_more = page.has_more();
                if ticket.query.page == 1 {
                    self.items.clear();
                    self.seen.clear();
                }
                for item in page.items {
                    if self.seen.insert(item.key().clone()) {
                        self.items.push(item);
                    }
                }
                self.error = None;
                self.phase = LoaderPhase::Ready;
                vec![]
            }
            LoaderEvent::ItemRemoved(id) => {
                if self.seen.remove(&id) {
                    self.items.retain(|item| item.key() != &id);
                }
                vec![]
            }
            LoaderEvent::PageFailed { ticket, error } => {
                if !self.accepts(&ticket) {
                    return vec![];
                }
                self.in_flight = None;
                if ticket.query.page == 1 {
                    self.items.clear();
                    self.seen.clear();
                }
                self.has_more = false;
                self.error = Some(error);
                self.phase = LoaderPhase::Error;
                vec![]
            }
        }
    }

    fn start_lineage(&mut self, filters: Filters, discard_items: bool) -> Vec<LoaderCommand> {
        self.generation += 1;
        if discard_items {
            self.items.clear();
            self.seen.clear();
            self.has_more = false;
        }
        let query = Query {
            filters,
            page: 1,
            page_size: self.current_query.page_size,
        };
        self.issue(query, LoaderPhase::LoadingFirstPage)
    }

    fn issue(&mut self, query: Query, phase: LoaderPhase) -> Vec<LoaderCommand> {
        let ticket = FetchTicket {
            generation: self.generation,
            query: query.clone(),
        };
        self.current_query = query;
        self.phase = phase;
        self.error = None;
        self.in_flight = Some(ticket.clone());
        vec![LoaderCommand::Fetch(ticket)]
    }
}

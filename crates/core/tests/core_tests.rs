use std::time::{Duration, Instant};

use prok_core::{
    ApiError, CollectionState, FetchTicket, FilterChange, FilterDebouncer, Filters, ItemId, Keyed,
    LoaderCommand, LoaderEvent, LoaderPhase, NetworkFailure, PageResult, Query, Record, SortKey,
    DEFAULT_DEBOUNCE,
};
use serde_json::json;

fn record(id: u64) -> Record {
    serde_json::from_value(json!({"id": id, "title": format!("post {id}")})).unwrap()
}

/// Server-side listing: slices `all` the way the upstream paginator does.
fn serve(all: &[Record], query: &Query) -> PageResult<Record> {
    let start = ((query.page - 1) * query.page_size) as usize;
    let end = (start + query.page_size as usize).min(all.len());
    let items = if start < all.len() { all[start..end].to_vec() } else { vec![] };
    PageResult::new(items, query.clone())
}

fn single_fetch(cmds: Vec<LoaderCommand>) -> FetchTicket {
    assert_eq!(cmds.len(), 1, "expected exactly one fetch, got {cmds:?}");
    match cmds.into_iter().next() {
        Some(LoaderCommand::Fetch(ticket)) => ticket,
        None => unreachable!(),
    }
}

#[test]
fn test_scenario_a_two_pages() {
    let all: Vec<Record> = (1..=14).map(record).collect();
    let mut state: CollectionState<Record> = CollectionState::new(Filters::default(), 10).unwrap();

    let t1 = single_fetch(state.apply(LoaderEvent::Mount));
    assert_eq!(t1.query.filters.sort, SortKey::CreatedAt);
    let page = serve(&all, &t1.query);
    assert_eq!(page.items.len(), 10);
    state.apply(LoaderEvent::PageLoaded { ticket: t1, page });
    assert!(state.has_more());

    let t2 = single_fetch(state.apply(LoaderEvent::SentinelVisible));
    let page = serve(&all, &t2.query);
    assert_eq!(page.items.len(), 4);
    state.apply(LoaderEvent::PageLoaded { ticket: t2, page });

    assert_eq!(state.items().len(), 14);
    assert!(!state.has_more());
    assert_eq!(state.phase(), LoaderPhase::Ready);
}

#[test]
fn test_paging_matches_single_listing() {
    let all: Vec<Record> = (1..=37).map(record).collect();
    for page_size in [1u32, 5, 10, 36, 37, 50] {
        let mut state: CollectionState<Record> = CollectionState::new(Filters::default(), page_size).unwrap();
        let mut cmds = state.apply(LoaderEvent::Mount);
        while let Some(LoaderCommand::Fetch(ticket)) = cmds.pop() {
            let page = serve(&all, &ticket.query);
            state.apply(LoaderEvent::PageLoaded { ticket, page });
            cmds = state.apply(LoaderEvent::SentinelVisible);
        }
        let ids: Vec<&ItemId> = state.items().iter().map(Keyed::key).collect();
        let expected: Vec<&ItemId> = all.iter().map(Record::id).collect();
        assert_eq!(ids, expected, "page_size={page_size}");
        assert!(!state.has_more());
    }
}

#[test]
fn test_slow_stale_result_never_visible() {
    let all: Vec<Record> = (1..=30).map(record).collect();
    let mut state: CollectionState<Record> = CollectionState::new(Filters::default(), 10).unwrap();
    let slow = single_fetch(state.apply(LoaderEvent::Mount));

    let filters = Filters {
        search: "post 2".into(),
        ..Default::default()
    };
    let fast = single_fetch(state.apply(LoaderEvent::FiltersChanged(filters)));
    let filtered: Vec<Record> = vec![record(2), record(20)];
    state.apply(LoaderEvent::PageLoaded {
        page: serve(&filtered, &fast.query),
        ticket: fast,
    });
    let visible: Vec<Record> = state.items().to_vec();

    state.apply(LoaderEvent::PageLoaded {
        page: serve(&all, &slow.query),
        ticket: slow,
    });
    assert_eq!(state.items(), visible.as_slice());
    assert_eq!(state.current_query().filters.search, "post 2");
}

#[test]
fn test_duplicate_refresh_yields_no_duplicates() {
    let all: Vec<Record> = (1..=10).map(record).collect();
    let mut state: CollectionState<Record> = CollectionState::new(Filters::default(), 10).unwrap();
    let t0 = single_fetch(state.apply(LoaderEvent::Mount));
    state.apply(LoaderEvent::PageLoaded { page: serve(&all, &t0.query), ticket: t0 });

    let a = single_fetch(state.apply(LoaderEvent::Refresh));
    let b = single_fetch(state.apply(LoaderEvent::Refresh));
    assert_eq!(a.query, b.query);
    for ticket in [b, a] {
        let page = serve(&all, &ticket.query);
        state.apply(LoaderEvent::PageLoaded { ticket, page });
    }
    assert_eq!(state.items().len(), 10);
}

#[test]
fn test_scenario_b_terminal_server_error() {
    let mut state: CollectionState<Record> = CollectionState::new(Filters::default(), 10).unwrap();
    let t = single_fetch(state.apply(LoaderEvent::Mount));
    state.apply(LoaderEvent::PageFailed {
        ticket: t,
        error: ApiError::Network(NetworkFailure::ServerError(503)),
    });
    assert_eq!(state.phase(), LoaderPhase::Error);
    assert!(state.items().is_empty());
    assert_eq!(state.error().and_then(ApiError::status), Some(503));
}

#[test]
fn test_scenario_d_category_burst_commits_once() {
    let t0 = Instant::now();
    let mut debouncer = FilterDebouncer::new(Filters::default(), DEFAULT_DEBOUNCE);
    let mut commits = Vec::new();

    for (i, category) in ["design", "sales", "engineering"].into_iter().enumerate() {
        let at = t0 + Duration::from_millis(300 * i as u64);
        if let Some(filters) = debouncer.poll(at) {
            commits.push(filters);
        }
        debouncer.push(FilterChange::Category(Some(category.into())), at);
    }
    for step in 0..40 {
        let at = t0 + Duration::from_millis(600 + 50 * step);
        if let Some(filters) = debouncer.poll(at) {
            commits.push(filters);
        }
    }

    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].category.as_deref(), Some("engineering"));
}

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{reply, ScriptedTransport};
use prok_client::{
    ClientConfig, CollectionLoader, LoaderHandle, PageSource, ProkApi, RequestClient, Session,
};
use prok_core::{
    ApiError, FilterChange, ItemId, LoaderPhase, NetworkFailure, PageResult, Query, Record,
};
use serde_json::json;
use tokio::time::{sleep, Instant};

/// In-memory listing with per-query latency and one-shot page failures.
struct FakeListing {
    catalog: Vec<Record>,
    latency: Box<dyn Fn(&Query) -> Duration + Send + Sync>,
    failures: Mutex<HashMap<u32, ApiError>>,
    calls: Mutex<Vec<(Instant, Query)>>,
    completed: AtomicUsize,
}

impl FakeListing {
    fn new(len: u64) -> Self {
        let categories = ["design", "sales", "engineering"];
        let catalog = (1..=len)
            .map(|id| serde_json::from_value(common::post(id, categories[(id % 3) as usize])).unwrap())
            .collect();
        Self {
            catalog,
            latency: Box::new(|_| Duration::from_millis(50)),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            completed: AtomicUsize::new(0),
        }
    }

    fn with_latency(mut self, f: impl Fn(&Query) -> Duration + Send + Sync + 'static) -> Self {
        self.latency = Box::new(f);
        self
    }

    fn fail_page_once(self, page: u32, error: ApiError) -> Self {
        self.failures.lock().unwrap().insert(page, error);
        self
    }

    fn calls(&self) -> Vec<(Instant, Query)> {
        self.calls.lock().unwrap().clone()
    }

    fn matches(record: &Record, query: &Query) -> bool {
        let field = |name: &str| record.get(name).and_then(|v| v.as_str()).unwrap_or_default();
        let filters = &query.filters;
        (filters.search.is_empty() || field("title").contains(filters.search.as_str()))
            && filters.category.as_deref().map_or(true, |c| field("category") == c)
    }
}

#[async_trait]
impl PageSource<Record> for FakeListing {
    async fn fetch_page(&self, query: &Query) -> Result<PageResult<Record>, ApiError> {
        self.calls.lock().unwrap().push((Instant::now(), query.clone()));
        sleep((self.latency)(query)).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().unwrap().remove(&query.page) {
            return Err(error);
        }
        let matching: Vec<Record> = self
            .catalog
            .iter()
            .filter(|r| Self::matches(r, query))
            .cloned()
            .collect();
        let start = ((query.page - 1) * query.page_size) as usize;
        let items = matching
            .into_iter()
            .skip(start)
            .take(query.page_size as usize)
            .collect();
        Ok(PageResult::new(items, query.clone()))
    }
}

fn spawn(source: Arc<FakeListing>, page_size: u32) -> LoaderHandle<Record> {
    CollectionLoader::new(source, page_size).spawn().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_sentinel_pages_through_listing() {
    let source = Arc::new(FakeListing::new(14));
    let handle = spawn(source.clone(), 10);

    let state = handle.wait_for(|s| s.phase() == LoaderPhase::Ready).await.unwrap();
    assert_eq!(state.items().len(), 10);
    assert!(state.has_more());

    handle.sentinel_visible();
    let state = handle
        .wait_for(|s| s.phase() == LoaderPhase::Ready && s.items().len() == 14)
        .await
        .unwrap();
    assert!(!state.has_more());

    handle.sentinel_visible();
    sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls().len(), 2);
    handle.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn test_category_burst_fetches_once() {
    let source = Arc::new(FakeListing::new(30));
    let handle = spawn(source.clone(), 10);
    handle.wait_for(|s| s.phase() == LoaderPhase::Ready).await.unwrap();

    for category in ["design", "sales", "engineering"] {
        handle.set_filter(FilterChange::Category(Some(category.into())));
        sleep(Duration::from_millis(300)).await;
    }
    let last_change = Instant::now() - Duration::from_millis(300);

    let state = handle
        .wait_for(|s| {
            s.phase() == LoaderPhase::Ready
                && s.current_query().filters.category.as_deref() == Some("engineering")
        })
        .await
        .unwrap();
    assert_eq!(state.items().len(), 10);
    assert!(state
        .items()
        .iter()
        .all(|r| r.get("category") == Some(&json!("engineering"))));

    sleep(Duration::from_secs(2)).await;
    let calls = source.calls();
    assert_eq!(calls.len(), 2, "mount plus one debounced fetch");
    assert_eq!(calls[1].1.filters.category.as_deref(), Some("engineering"));
    assert!(calls[1].0 - last_change >= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_slow_stale_page_never_shown() {
    let source = Arc::new(FakeListing::new(30).with_latency(|q| {
        if q.filters.search.is_empty() {
            Duration::from_secs(5)
        } else {
            Duration::from_millis(100)
        }
    }));
    let handle = spawn(source.clone(), 10);

    sleep(Duration::from_millis(100)).await;
    handle.set_filter(FilterChange::Search("post 1".into()));

    let state = handle
        .wait_for(|s| s.phase() == LoaderPhase::Ready && s.current_query().filters.search == "post 1")
        .await
        .unwrap();
    let visible: Vec<Record> = state.items().to_vec();
    assert!(!visible.is_empty());
    assert!(visible
        .iter()
        .all(|r| r.get("title").and_then(|t| t.as_str()).unwrap().contains("post 1")));

    sleep(Duration::from_secs(10)).await;
    let state = handle.snapshot();
    assert_eq!(state.items(), visible.as_slice());
    assert_eq!(state.phase(), LoaderPhase::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_next_page_failure_keeps_items_until_retry() {
    let source = Arc::new(
        FakeListing::new(25).fail_page_once(2, ApiError::Network(NetworkFailure::ServerError(502))),
    );
    let handle = spawn(source.clone(), 10);
    handle.wait_for(|s| s.phase() == LoaderPhase::Ready).await.unwrap();

    handle.sentinel_visible();
    let state = handle.wait_for(|s| s.phase() == LoaderPhase::Error).await.unwrap();
    assert_eq!(state.items().len(), 10);
    assert!(!state.has_more());
    assert_eq!(state.error().and_then(ApiError::status), Some(502));

    // No automatic paging while failed.
    handle.sentinel_visible();
    sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls().len(), 2);

    handle.retry();
    let state = handle
        .wait_for(|s| s.phase() == LoaderPhase::Ready && s.items().len() == 20)
        .await
        .unwrap();
    assert!(state.has_more());
    assert_eq!(source.calls()[2].1.page, 2);
}

#[tokio::test(start_paused = true)]
async fn test_first_page_server_error_surfaces_after_retries() {
    let transport = ScriptedTransport::always(reply(503, json!({"msg": "maintenance"})));
    let client = RequestClient::new(transport.clone(), Session::in_memory(), &ClientConfig::default());
    let api = ProkApi::new(Arc::new(client));

    let handle = CollectionLoader::<Record>::new(Arc::new(api.posts()), 10).spawn().unwrap();
    let state = handle.wait_for(|s| s.phase() == LoaderPhase::Error).await.unwrap();

    assert!(state.items().is_empty());
    assert_eq!(
        state.error(),
        Some(&ApiError::Network(NetworkFailure::ServerError(503)))
    );
    assert_eq!(transport.call_count(), 3);
    assert_eq!(transport.calls()[0].path, "/api/posts/");
}

#[tokio::test(start_paused = true)]
async fn test_refresh_replaces_items_without_duplicates() {
    let source = Arc::new(FakeListing::new(8));
    let handle = spawn(source.clone(), 10);
    handle.wait_for(|s| s.phase() == LoaderPhase::Ready).await.unwrap();

    handle.refresh();
    handle.refresh();
    sleep(Duration::from_secs(1)).await;
    let state = handle.settled().await.unwrap();
    assert_eq!(state.items().len(), 8);
    assert!(source.calls().iter().all(|(_, q)| q.page == 1));
}

#[tokio::test(start_paused = true)]
async fn test_unmount_aborts_in_flight_fetch() {
    let source = Arc::new(FakeListing::new(10).with_latency(|_| Duration::from_secs(10)));
    let handle = spawn(source.clone(), 10);
    handle
        .wait_for(|s| s.phase() == LoaderPhase::LoadingFirstPage)
        .await
        .unwrap();
    sleep(Duration::from_millis(10)).await;

    handle.unmount().await;
    sleep(Duration::from_secs(30)).await;
    assert_eq!(source.calls().len(), 1);
    assert_eq!(source.completed.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deleted_item_leaves_loaded_list() {
    let source = Arc::new(FakeListing::new(14));
    let handle = spawn(source.clone(), 10);
    handle.wait_for(|s| s.phase() == LoaderPhase::Ready).await.unwrap();

    handle.remove(ItemId::from(3));
    let state = handle.wait_for(|s| s.items().len() == 9).await.unwrap();
    assert!(state.items().iter().all(|r| r.id() != &ItemId::from(3)));
    assert_eq!(state.phase(), LoaderPhase::Ready);
    assert!(state.has_more());
    assert_eq!(source.calls().len(), 1);
}

/// Serves the same full page for every query, as a server whose listing
/// shifted under the client would.
struct RepeatingSource;

#[async_trait]
impl PageSource<Record> for RepeatingSource {
    async fn fetch_page(&self, query: &Query) -> Result<PageResult<Record>, ApiError> {
        let items = (1..=u64::from(query.page_size))
            .map(|id| serde_json::from_value(common::post(id, "design")).unwrap())
            .collect();
        Ok(PageResult::new(items, query.clone()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_load_next_returns_when_page_adds_nothing() {
    let handle = CollectionLoader::<Record>::new(Arc::new(RepeatingSource), 5)
        .spawn()
        .unwrap();
    handle.settled().await.unwrap();

    let state = handle.load_next().await.unwrap();
    assert_eq!(state.phase(), LoaderPhase::Ready);
    assert_eq!(state.items().len(), 5);
    assert_eq!(state.current_query().page, 2);
    handle.unmount().await;
}

#[tokio::test]
async fn test_zero_page_size_rejected() {
    let source = Arc::new(FakeListing::new(1));
    let err = CollectionLoader::<Record>::new(source, 0).spawn().err().unwrap();
    assert!(matches!(err, ApiError::Validation(_)));
}

//! Async driver for [`CollectionState`].
//!
//! The driver task owns the state machine and the per-field debouncer. UI
//! intents arrive on an mpsc channel, snapshots leave on a watch channel.
//! Each fetch runs as its own task; a superseded fetch is aborted, and a
//! completion that still slips through is dropped by ticket matching.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prok_core::{
    ApiError, CollectionState, FetchTicket, FilterChange, FilterDebouncer, Filters, ItemId, Keyed,
    LoaderCommand, LoaderEvent, LoaderPhase, PageResult, Query,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info};

/// Anything that can serve one page of a listing.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn fetch_page(&self, query: &Query) -> Result<PageResult<T>, ApiError>;
}

#[derive(Debug)]
enum Input {
    Filter(FilterChange),
    Sentinel,
    Retry,
    Refresh,
    Remove(ItemId),
}

/// Builder for a running loader.
pub struct CollectionLoader<T> {
    source: Arc<dyn PageSource<T>>,
    filters: Filters,
    page_size: u32,
    debounce: Duration,
}

impl<T> CollectionLoader<T>
where
    T: Keyed + Clone + Send + Sync + 'static,
{
    pub fn new(source: Arc<dyn PageSource<T>>, page_size: u32) -> Self {
        Self {
            source,
            filters: Filters::default(),
            page_size,
            debounce: prok_core::DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Mounts the loader: spawns the driver and requests page 1.
    pub fn spawn(self) -> Result<LoaderHandle<T>, ApiError> {
        let state = CollectionState::new(self.filters.clone(), self.page_size)?;
        let (snapshot_tx, snapshot_rx) = watch::channel(state.clone());
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            source: self.source,
            state,
            debouncer: FilterDebouncer::new(self.filters, self.debounce),
            snapshot: snapshot_tx,
            done_tx,
            fetch: None,
        };
        let task = tokio::spawn(driver.run(input_rx, done_rx));
        Ok(LoaderHandle {
            input: input_tx,
            snapshot: snapshot_rx,
            task,
        })
    }
}

/// UI-side handle of a mounted loader. Dropping it unmounts the loader.
pub struct LoaderHandle<T> {
    input: mpsc::UnboundedSender<Input>,
    snapshot: watch::Receiver<CollectionState<T>>,
    task: JoinHandle<()>,
}

impl<T: Keyed + Clone> LoaderHandle<T> {
    /// Debounced change of one filter field.
    pub fn set_filter(&self, change: FilterChange) {
        self.send(Input::Filter(change));
    }

    /// The end-of-list sentinel scrolled into view.
    pub fn sentinel_visible(&self) {
        self.send(Input::Sentinel);
    }

    pub fn retry(&self) {
        self.send(Input::Retry);
    }

    pub fn refresh(&self) {
        self.send(Input::Refresh);
    }

    /// Drops a deleted item from the loaded collection without refetching.
    pub fn remove(&self, id: ItemId) {
        self.send(Input::Remove(id));
    }

    fn send(&self, input: Input) {
        if self.input.send(input).is_err() {
            debug!("loader already unmounted");
        }
    }

    pub fn snapshot(&self) -> CollectionState<T> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CollectionState<T>> {
        self.snapshot.clone()
    }

    /// Waits for a snapshot matching `pred`. Returns `None` if the driver
    /// stopped first.
    pub async fn wait_for(
        &self,
        mut pred: impl FnMut(&CollectionState<T>) -> bool,
    ) -> Option<CollectionState<T>> {
        let mut rx = self.snapshot.clone();
        let state = rx.wait_for(|s| pred(s)).await.ok()?.clone();
        Some(state)
    }

    /// Waits until no fetch is in flight and returns that snapshot.
    pub async fn settled(&self) -> Option<CollectionState<T>> {
        self.wait_for(|s| {
            matches!(s.phase(), LoaderPhase::Ready | LoaderPhase::Error) && s.in_flight().is_none()
        })
        .await
    }

    /// Triggers the sentinel and waits for the outcome. Returns the settled
    /// snapshot even when the page added nothing new.
    pub async fn load_next(&self) -> Option<CollectionState<T>> {
        let mut rx = self.snapshot.clone();
        rx.borrow_and_update();
        self.sentinel_visible();
        rx.changed().await.ok()?;
        self.settled().await
    }

    /// Stops the driver and aborts any in-flight fetch.
    pub async fn unmount(self) {
        let Self { input, task, .. } = self;
        drop(input);
        let _ = task.await;
    }
}

struct Driver<T> {
    source: Arc<dyn PageSource<T>>,
    state: CollectionState<T>,
    debouncer: FilterDebouncer,
    snapshot: watch::Sender<CollectionState<T>>,
    done_tx: mpsc::UnboundedSender<LoaderEvent<T>>,
    fetch: Option<JoinHandle<()>>,
}

impl<T> Driver<T>
where
    T: Keyed + Clone + Send + Sync + 'static,
{
    async fn run(
        mut self,
        mut inputs: mpsc::UnboundedReceiver<Input>,
        mut done: mpsc::UnboundedReceiver<LoaderEvent<T>>,
    ) {
        self.dispatch(LoaderEvent::Mount);
        loop {
            let wake = self.debouncer.next_deadline().map(Instant::from_std);
            tokio::select! {
                input = inputs.recv() => match input {
                    None => break,
                    Some(Input::Filter(change)) => {
                        debug!(?change, "filter change pending");
                        self.debouncer.push(change, Instant::now().into_std());
                    }
                    Some(Input::Sentinel) => self.dispatch(LoaderEvent::SentinelVisible),
                    Some(Input::Retry) => self.dispatch(LoaderEvent::Retry),
                    Some(Input::Refresh) => self.dispatch(LoaderEvent::Refresh),
                    Some(Input::Remove(id)) => self.dispatch(LoaderEvent::ItemRemoved(id)),
                },
                Some(event) = done.recv() => self.dispatch(event),
                _ = sleep_until(wake) => {
                    if let Some(filters) = self.debouncer.poll(Instant::now().into_std()) {
                        self.dispatch(LoaderEvent::FiltersChanged(filters));
                    }
                }
            }
        }
        if let Some(fetch) = self.fetch.take() {
            fetch.abort();
        }
        debug!("loader unmounted");
    }

    fn dispatch(&mut self, event: LoaderEvent<T>) {
        if let LoaderEvent::PageLoaded { ticket, .. } | LoaderEvent::PageFailed { ticket, .. } = &event {
            if !self.state.accepts(ticket) {
                debug!(generation = ticket.generation, page = ticket.query.page, "dropping stale page");
                return;
            }
        }
        let before = self.state.phase();
        for command in self.state.apply(event) {
            match command {
                LoaderCommand::Fetch(ticket) => self.start_fetch(ticket),
            }
        }
        let after = self.state.phase();
        if before != after {
            info!(
                from = ?before,
                to = ?after,
                items = self.state.items().len(),
                has_more = self.state.has_more(),
                "loader phase"
            );
        }
        self.snapshot.send_replace(self.state.clone());
    }

    fn start_fetch(&mut self, ticket: FetchTicket) {
        if let Some(previous) = self.fetch.take() {
            previous.abort();
        }
        debug!(generation = ticket.generation, page = ticket.query.page, "fetching page");
        let source = Arc::clone(&self.source);
        let done = self.done_tx.clone();
        self.fetch = Some(tokio::spawn(async move {
            let event = match source.fetch_page(&ticket.query).await {
                Ok(page) => LoaderEvent::PageLoaded { ticket, page },
                Err(error) => LoaderEvent::PageFailed { ticket, error },
            };
            let _ = done.send(event);
        }));
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

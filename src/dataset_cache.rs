use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{AbortHandle, BoxFuture, Shared};
use tracing::{debug, info};

use crate::enums::{CacheAction, LoadState};
use crate::events::{EventSink, LoaderEvent, Observers};
use crate::options::LoaderOptions;
use crate::parser::{ContainerParser, Part10Parser};
use crate::streaming_loader::{LoadError, LoadedDataset, StreamingLoader};
use crate::tag_accessor::Dataset;
use crate::transport::{HttpTransport, Transport};

pub type LoadResult = Result<Arc<Dataset>, LoadError>;

/// A load that any number of callers can await. Lazy: the retrieval
/// starts when one of them is first polled.
pub type PendingLoad = Shared<BoxFuture<'static, LoadResult>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheInfo {
    pub cache_size_in_bytes: u64,
    /// Every entry, including those still loading.
    pub number_of_data_sets_cached: usize,
}

enum EntryState {
    Loading,
    Ready(Arc<Dataset>),
    Failed,
}

struct CacheEntry {
    generation: u64,
    ref_count: usize,
    state: EntryState,
    byte_size: u64,
    load: PendingLoad,
    abort_handle: AbortHandle,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    cache_size_in_bytes: u64,
    next_generation: u64,
}

impl CacheState {
    fn info(&self) -> CacheInfo {
        CacheInfo {
            cache_size_in_bytes: self.cache_size_in_bytes,
            number_of_data_sets_cached: self.entries.len(),
        }
    }
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reference counted cache of parsed datasets keyed by location.
///
/// Concurrent requests for the same location share one retrieval. Each
/// [`DatasetCache::load`] must be balanced by one [`DatasetCache::unload`];
/// the last unload evicts the dataset and cancels a retrieval in flight.
///
/// ```no_run
/// # use dicom_frame_loader::DatasetCache;
/// # async fn run() -> Result<(), dicom_frame_loader::LoadError> {
/// let cache = DatasetCache::http();
/// let first = cache.load("https://pacs.example/ct/1.dcm");
/// let second = cache.load("https://pacs.example/ct/1.dcm");
/// let (a, b) = futures::join!(first, second);
/// assert!(std::sync::Arc::ptr_eq(&a?, &b?));
///
/// cache.unload("https://pacs.example/ct/1.dcm");
/// cache.unload("https://pacs.example/ct/1.dcm");
/// assert_eq!(cache.get_info().number_of_data_sets_cached, 0);
/// # Ok(())
/// # }
/// ```
pub struct DatasetCache {
    state: Arc<Mutex<CacheState>>,
    transport: Arc<dyn Transport>,
    parser: Arc<dyn ContainerParser>,
    options: LoaderOptions,
    observers: Observers,
}

impl DatasetCache {
    pub fn new(transport: impl Transport + 'static, parser: impl ContainerParser + 'static) -> Self {
        Self {
            state: Arc::default(),
            transport: Arc::new(transport),
            parser: Arc::new(parser),
            options: LoaderOptions::default(),
            observers: Observers::default(),
        }
    }

    /// A cache reading DICOM Part 10 files over HTTP.
    pub fn http() -> Self {
        Self::new(HttpTransport::new(), Part10Parser)
    }

    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_observer(mut self, sink: impl EventSink + 'static) -> Self {
        self.observers.push(Arc::new(sink));
        self
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Load the dataset at `location`, or join the load already under way.
    ///
    /// The reference count is taken immediately, whether or not the returned
    /// future is ever awaited. A previously failed location is retried.
    pub fn load(&self, location: &str) -> PendingLoad {
        self.load_for(location, None)
    }

    /// Like [`DatasetCache::load`], tagging progress events with `consumer_id`.
    pub fn load_for(&self, location: &str, consumer_id: Option<&str>) -> PendingLoad {
        let mut guard = lock(&self.state);
        let state = &mut *guard;

        if let Some(entry) = state.entries.get_mut(location) {
            entry.ref_count += 1;
            if !matches!(entry.state, EntryState::Failed) {
                debug!(location, ref_count = entry.ref_count, "joining cached dataset");
                return entry.load.clone();
            }
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        let loader = StreamingLoader::new(location, Arc::clone(&self.transport))
            .with_consumer_id(consumer_id.map(str::to_owned))
            .with_options(self.options.clone())
            .with_observers(self.observers.clone());
        let abort_handle = loader.abort_handle();
        let load = self.start_load(location, generation, loader);

        match state.entries.entry(location.to_owned()) {
            Entry::Occupied(mut occupied) => {
                debug!(location, "retrying failed dataset");
                let entry = occupied.get_mut();
                entry.generation = generation;
                entry.state = EntryState::Loading;
                entry.load = load.clone();
                entry.abort_handle = abort_handle;
            }
            Entry::Vacant(vacant) => {
                debug!(location, "loading dataset");
                vacant.insert(CacheEntry {
                    generation,
                    ref_count: 1,
                    state: EntryState::Loading,
                    byte_size: 0,
                    load: load.clone(),
                    abort_handle,
                });
            }
        }
        load
    }

    fn start_load(&self, location: &str, generation: u64, loader: StreamingLoader) -> PendingLoad {
        // entries hold this future, so it must not keep the state alive
        let state = Arc::downgrade(&self.state);
        let parser = Arc::clone(&self.parser);
        let observers = self.observers.clone();
        let location = location.to_owned();

        async move {
            let result = loader.load(parser.as_ref()).await;
            match state.upgrade() {
                Some(state) => complete_load(&state, &observers, &location, generation, result),
                None => {
                    debug!(location, "discarding completion, cache was dropped");
                    result.map(|loaded| Arc::new(loaded.dataset))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// The dataset at `location`, only if it has finished loading. Never waits.
    pub fn get(&self, location: &str) -> Option<Arc<Dataset>> {
        match lock(&self.state).entries.get(location)?.state {
            EntryState::Ready(ref dataset) => Some(Arc::clone(dataset)),
            _ => None,
        }
    }

    pub fn is_loaded(&self, location: &str) -> bool {
        self.get(location).is_some()
    }

    pub fn state(&self, location: &str) -> Option<LoadState> {
        lock(&self.state).entries.get(location).map(|entry| match entry.state {
            EntryState::Loading => LoadState::Loading,
            EntryState::Ready(_) => LoadState::Ready,
            EntryState::Failed => LoadState::Failed,
        })
    }

    pub fn ref_count(&self, location: &str) -> Option<usize> {
        lock(&self.state).entries.get(location).map(|entry| entry.ref_count)
    }

    /// Release one reference. The last release evicts the entry, cancels a
    /// retrieval still in flight and notifies observers. Unknown locations
    /// are ignored.
    pub fn unload(&self, location: &str) {
        let mut guard = lock(&self.state);
        let state = &mut *guard;

        let Some(entry) = state.entries.get_mut(location) else {
            debug!(location, "unload of a dataset that is not cached");
            return;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count > 0 {
            debug!(location, ref_count = entry.ref_count, "dataset still referenced");
            return;
        }

        if let Some(entry) = state.entries.remove(location) {
            entry.abort_handle.abort();
            state.cache_size_in_bytes = state.cache_size_in_bytes.saturating_sub(entry.byte_size);
        }
        let info = state.info();
        drop(guard);

        info!(location, size = info.cache_size_in_bytes, "dataset unloaded");
        self.observers.emit(LoaderEvent::CacheChanged {
            location: location.to_owned(),
            action: CacheAction::Unloaded,
            info,
        });
    }

    /// Drop every entry and reset the size. Loads in flight are not
    /// cancelled and observers are not notified.
    pub fn purge(&self) {
        let mut state = lock(&self.state);
        state.entries.clear();
        state.cache_size_in_bytes = 0;
        info!("dataset cache purged");
    }

    pub fn get_info(&self) -> CacheInfo {
        lock(&self.state).info()
    }
}

impl Default for DatasetCache {
    fn default() -> Self {
        Self::http()
    }
}

impl std::fmt::Debug for DatasetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetCache")
            .field("info", &self.get_info())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Record the outcome of a load, unless its entry was evicted or restarted
/// meanwhile. The result is passed on to the waiting callers either way.
fn complete_load(
    state: &Mutex<CacheState>,
    observers: &Observers,
    location: &str,
    generation: u64,
    result: Result<LoadedDataset, LoadError>,
) -> LoadResult {
    let mut guard = lock(state);
    let state = &mut *guard;

    let Some(entry) = state
        .entries
        .get_mut(location)
        .filter(|entry| entry.generation == generation)
    else {
        debug!(location, "discarding completion of an evicted load");
        return result.map(|loaded| Arc::new(loaded.dataset));
    };

    match result {
        Ok(loaded) => {
            let dataset = Arc::new(loaded.dataset);
            entry.state = EntryState::Ready(Arc::clone(&dataset));
            entry.byte_size = loaded.byte_size as u64;
            state.cache_size_in_bytes += entry.byte_size;
            let info = state.info();
            drop(guard);

            info!(location, size = info.cache_size_in_bytes, "dataset loaded");
            observers.emit(LoaderEvent::CacheChanged {
                location: location.to_owned(),
                action: CacheAction::Loaded,
                info,
            });
            Ok(dataset)
        }
        Err(error) => {
            entry.state = EntryState::Failed;
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParseError;
    use crate::tag_accessor::get_u16;
    use crate::transport::{TransportError, TransportResponse};
    use async_trait::async_trait;
    use bytes::Bytes;
    use dicom::core::{DataElement, VR, dicom_value};
    use dicom_dictionary_std::tags;
    use futures::StreamExt;
    use futures::stream;
    use reqwest::StatusCode;
    use reqwest::header::HeaderMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves every location with a fixed body, failing once per location
    /// listed in `fail_once`. Locations starting with "stall" never finish.
    #[derive(Default)]
    struct FakeTransport {
        fetches: Arc<AtomicUsize>,
        fail_once: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn fetch(&self, location: &str, _headers: HeaderMap) -> Result<TransportResponse, TransportError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut fail_once = self.fail_once.lock().unwrap();
            if let Some(index) = fail_once.iter().position(|l| l == location) {
                fail_once.remove(index);
                return Err(TransportError::Status {
                    url: location.to_owned(),
                    status: StatusCode::SERVICE_UNAVAILABLE,
                });
            }
            if location.starts_with("stall") {
                return Ok(TransportResponse {
                    content_length: None,
                    chunks: stream::pending().boxed(),
                });
            }
            Ok(TransportResponse {
                content_length: Some(6),
                chunks: stream::iter([Ok(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"def"))]).boxed(),
            })
        }
    }

    /// Produces a dataset whose Rows hold the body length.
    struct RowsParser;

    impl ContainerParser for RowsParser {
        fn parse(&self, bytes: &[u8]) -> Result<Dataset, ParseError> {
            Ok(Dataset::from_element_iter([DataElement::new(
                tags::ROWS,
                VR::US,
                dicom_value!(U16, [bytes.len() as u16]),
            )]))
        }
    }

    fn cache_failing_once(fail_once: &[&str]) -> (DatasetCache, Arc<AtomicUsize>) {
        let transport = FakeTransport {
            fail_once: Mutex::new(fail_once.iter().map(|l| l.to_string()).collect()),
            ..FakeTransport::default()
        };
        let fetches = Arc::clone(&transport.fetches);
        (DatasetCache::new(transport, RowsParser), fetches)
    }

    fn cache() -> (DatasetCache, Arc<AtomicUsize>) {
        cache_failing_once(&[])
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_retrieval() {
        let (cache, fetches) = cache();
        let first = cache.load("a.dcm");
        let second = cache.load("a.dcm");
        assert_eq!(cache.ref_count("a.dcm"), Some(2));
        assert_eq!(cache.state("a.dcm"), Some(LoadState::Loading));

        let (a, b) = futures::join!(first, second);
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(get_u16(&a, tags::ROWS), Some(6));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.get_info(),
            CacheInfo {
                cache_size_in_bytes: 6,
                number_of_data_sets_cached: 1,
            }
        );
    }

    #[tokio::test]
    async fn load_then_unload_restores_the_cache() {
        let (cache, _) = cache();
        let before = cache.get_info();

        cache.load("a.dcm").await.unwrap();
        cache.load("a.dcm").await.unwrap();
        cache.unload("a.dcm");
        assert!(cache.is_loaded("a.dcm"));
        cache.unload("a.dcm");

        assert!(!cache.is_loaded("a.dcm"));
        assert_eq!(cache.state("a.dcm"), None);
        assert_eq!(cache.get_info(), before);
    }

    #[tokio::test]
    async fn get_does_not_wait_for_a_load() {
        let (cache, _) = cache();
        let pending = cache.load("a.dcm");
        assert!(cache.get("a.dcm").is_none());
        pending.await.unwrap();
        assert!(cache.get("a.dcm").is_some());
        assert!(cache.get("other.dcm").is_none());
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let (cache, fetches) = cache_failing_once(&["b.dcm"]);

        let err = cache.load("b.dcm").await.unwrap_err();
        assert!(matches!(err, LoadError::Transport(_)));
        assert_eq!(cache.state("b.dcm"), Some(LoadState::Failed));
        assert!(cache.get("b.dcm").is_none());

        // a later load retries instead of replaying the error
        let dataset = cache.load("b.dcm").await.unwrap();
        assert_eq!(get_u16(&dataset, tags::ROWS), Some(6));
        assert_eq!(cache.ref_count("b.dcm"), Some(2));
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn last_unload_cancels_a_load_in_flight() {
        let (cache, _) = cache();
        let pending = cache.load("stall.dcm");
        let waiter = tokio::spawn(pending.clone());
        tokio::task::yield_now().await;

        cache.unload("stall.dcm");
        assert!(matches!(waiter.await.unwrap(), Err(LoadError::Cancelled)));
        assert_eq!(cache.get_info(), CacheInfo::default());
    }

    #[tokio::test]
    async fn unload_notifies_observers_and_ignores_unknown_locations() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let cache = cache()
            .0
            .with_observer(move |event: &LoaderEvent| {
                if let LoaderEvent::CacheChanged { action, info, .. } = event {
                    sink.lock().unwrap().push((*action, *info));
                }
            });

        cache.unload("never-loaded.dcm");
        cache.load("a.dcm").await.unwrap();
        cache.unload("a.dcm");

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                (
                    CacheAction::Loaded,
                    CacheInfo {
                        cache_size_in_bytes: 6,
                        number_of_data_sets_cached: 1,
                    }
                ),
                (CacheAction::Unloaded, CacheInfo::default()),
            ]
        );
    }

    #[tokio::test]
    async fn dropping_the_cache_frees_its_state() {
        let (cache, _) = cache();
        let state = Arc::downgrade(&cache.state);
        let pending = cache.load("a.dcm");

        drop(cache);
        assert!(state.upgrade().is_none());

        // the load still completes for whoever holds it
        let dataset = pending.await.unwrap();
        assert_eq!(get_u16(&dataset, tags::ROWS), Some(6));
    }

    #[tokio::test]
    async fn purge_empties_the_cache_and_orphans_pending_loads() {
        let (cache, _) = cache();
        cache.load("a.dcm").await.unwrap();
        let pending = cache.load("b.dcm");

        cache.purge();
        assert_eq!(cache.get_info(), CacheInfo::default());

        // the orphaned load still resolves for its callers but is not cached
        assert!(pending.await.is_ok());
        assert_eq!(cache.get_info(), CacheInfo::default());
        assert!(cache.get("b.dcm").is_none());
    }
}

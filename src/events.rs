//! Observational notifications emitted while loading and caching datasets.

use std::fmt;
use std::sync::Arc;

use crate::dataset_cache::CacheInfo;
use crate::enums::CacheAction;

#[derive(Debug, Clone, PartialEq)]
pub enum LoaderEvent {
    LoadStart {
        location: String,
        consumer_id: Option<String>,
    },
    LoadProgress {
        location: String,
        consumer_id: Option<String>,
        loaded: u64,
        /// Declared size of the body, when the server sent one.
        total: Option<u64>,
        percent_complete: Option<u32>,
    },
    LoadEnd {
        location: String,
        consumer_id: Option<String>,
    },
    CacheChanged {
        location: String,
        action: CacheAction,
        info: CacheInfo,
    },
}

/// Receives [`LoaderEvent`]s. Any `Fn(&LoaderEvent)` closure is a sink.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &LoaderEvent);
}

impl<F> EventSink for F
where
    F: Fn(&LoaderEvent) + Send + Sync,
{
    fn on_event(&self, event: &LoaderEvent) {
        self(event)
    }
}

#[derive(Clone, Default)]
pub(crate) struct Observers(Vec<Arc<dyn EventSink>>);

impl Observers {
    pub(crate) fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.0.push(sink);
    }

    pub(crate) fn emit(&self, event: LoaderEvent) {
        for sink in &self.0 {
            sink.on_event(&event);
        }
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers").field("len", &self.0.len()).finish()
    }
}

pub(crate) fn percent_complete(loaded: u64, total: Option<u64>) -> Option<u32> {
    total
        .filter(|&total| total > 0)
        .map(|total| ((loaded as f64 / total as f64) * 100.0).round() as u32)
}

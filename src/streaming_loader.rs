use std::sync::Arc;

use futures::StreamExt;
use futures::future::{AbortHandle, AbortRegistration, Abortable};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::events::{LoaderEvent, Observers, percent_complete};
use crate::options::LoaderOptions;
use crate::parser::{ContainerParser, ParseError};
use crate::tag_accessor::Dataset;
use crate::transport::{Transport, TransportError};

/// Why a dataset could not be loaded.
///
/// Cloneable so that every caller sharing one load receives the same error.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("Transport error: {0}")]
    Transport(#[source] Arc<TransportError>),

    #[error("Parse error: {0}")]
    Parse(#[source] Arc<ParseError>),

    #[error("Load was cancelled")]
    Cancelled,
}

impl From<TransportError> for LoadError {
    fn from(error: TransportError) -> Self {
        Self::Transport(Arc::new(error))
    }
}

impl From<ParseError> for LoadError {
    fn from(error: ParseError) -> Self {
        Self::Parse(Arc::new(error))
    }
}

#[derive(Debug)]
pub struct LoadedDataset {
    pub dataset: Dataset,
    /// Number of bytes actually received.
    pub byte_size: usize,
}

/// Retrieves one location chunk by chunk and parses the result.
///
/// A loader is consumed by [`StreamingLoader::load`]. Use
/// [`StreamingLoader::abort_handle`] beforehand to keep a way to cancel it.
pub struct StreamingLoader {
    location: String,
    consumer_id: Option<String>,
    transport: Arc<dyn Transport>,
    options: LoaderOptions,
    observers: Observers,
    abort_handle: AbortHandle,
    abort_registration: AbortRegistration,
}

impl StreamingLoader {
    pub fn new(location: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        Self {
            location: location.into(),
            consumer_id: None,
            transport,
            options: LoaderOptions::default(),
            observers: Observers::default(),
            abort_handle,
            abort_registration,
        }
    }

    pub fn with_consumer_id(mut self, consumer_id: Option<String>) -> Self {
        self.consumer_id = consumer_id;
        self
    }

    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub(crate) fn with_observers(mut self, observers: Observers) -> Self {
        self.observers = observers;
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Abort the retrieval. A pending [`StreamingLoader::load`] resolves to
    /// [`LoadError::Cancelled`] and the underlying body stream is dropped.
    pub fn cancel(&self) {
        self.abort_handle.abort();
    }

    /// Retrieve the whole body, then parse it.
    ///
    /// # Errors
    ///
    /// Returns the transport or parse failure, or [`LoadError::Cancelled`].
    /// The error interceptor sees transport and parse errors first.
    pub async fn load(self, parser: &dyn ContainerParser) -> Result<LoadedDataset, LoadError> {
        let options = self.options.clone();
        let result = match self.fetch().await {
            Ok(bytes) => {
                options.before_processing();
                parser
                    .parse(&bytes)
                    .map(|dataset| LoadedDataset {
                        dataset,
                        byte_size: bytes.len(),
                    })
                    .map_err(LoadError::from)
            }
            Err(error) => Err(error),
        };

        match &result {
            Err(LoadError::Cancelled) | Ok(_) => {}
            Err(error) => {
                warn!(%error, "dataset load failed");
                options.intercept_error(error);
            }
        }
        result
    }

    /// Retrieve the whole body without parsing it.
    pub async fn fetch(self) -> Result<Vec<u8>, LoadError> {
        let Self {
            location,
            consumer_id,
            transport,
            options,
            observers,
            abort_registration,
            ..
        } = self;

        let read = read_body(&location, consumer_id, transport.as_ref(), &options, &observers);
        match Abortable::new(read, abort_registration).await {
            Ok(result) => result,
            Err(_aborted) => {
                debug!(location, "load cancelled");
                Err(LoadError::Cancelled)
            }
        }
    }
}

impl std::fmt::Debug for StreamingLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingLoader")
            .field("location", &self.location)
            .field("consumer_id", &self.consumer_id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

async fn read_body(
    location: &str,
    consumer_id: Option<String>,
    transport: &dyn Transport,
    options: &LoaderOptions,
    observers: &Observers,
) -> Result<Vec<u8>, LoadError> {
    let headers = options.request_headers(location, consumer_id.as_deref());
    let response = transport.fetch(location, headers).await?;
    let total = response.content_length;

    options.load_started();
    observers.emit(LoaderEvent::LoadStart {
        location: location.to_owned(),
        consumer_id: consumer_id.clone(),
    });

    let mut chunks = Vec::new();
    let mut loaded = 0u64;
    let mut stream = response.chunks;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        loaded += chunk.len() as u64;
        trace!(location, loaded, ?total, "received chunk");
        chunks.push(chunk);

        options.progressed();
        observers.emit(LoaderEvent::LoadProgress {
            location: location.to_owned(),
            consumer_id: consumer_id.clone(),
            loaded,
            total,
            percent_complete: percent_complete(loaded, total),
        });
    }

    options.load_ended();
    observers.emit(LoaderEvent::LoadEnd {
        location: location.to_owned(),
        consumer_id,
    });

    // sized from what arrived, the declared length may be wrong
    let mut body = Vec::with_capacity(loaded as usize);
    for chunk in &chunks {
        body.extend_from_slice(chunk);
    }
    Ok(body)
}

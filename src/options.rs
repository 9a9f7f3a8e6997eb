//! Hooks and request settings for dataset retrieval.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::streaming_loader::LoadError;

/// Opaque values handed back to every hook.
pub type RequestParams = BTreeMap<String, String>;

type BeforeSendHook = dyn Fn(&str, Option<&str>, &HeaderMap, &RequestParams) -> HeaderMap + Send + Sync;
type ParamsHook = dyn Fn(&RequestParams) + Send + Sync;
type ErrorHook = dyn Fn(&LoadError) + Send + Sync;

/// Options shared by every load started from one cache.
///
/// ```
/// # use dicom_frame_loader::LoaderOptions;
/// use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
///
/// let options = LoaderOptions::new()
///     .with_default_header(ACCEPT, HeaderValue::from_static("application/dicom"))
///     .with_before_send(|_location, _consumer, _defaults, _params| {
///         let mut extra = HeaderMap::new();
///         extra.insert("authorization", HeaderValue::from_static("Bearer token"));
///         extra
///     });
/// ```
#[derive(Clone, Default)]
pub struct LoaderOptions {
    default_headers: HeaderMap,
    params: RequestParams,
    before_send: Option<Arc<BeforeSendHook>>,
    before_processing: Option<Arc<dyn Fn() + Send + Sync>>,
    on_load_start: Option<Arc<ParamsHook>>,
    on_progress: Option<Arc<ParamsHook>>,
    on_load_end: Option<Arc<ParamsHook>>,
    error_interceptor: Option<Arc<ErrorHook>>,
}

impl LoaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Called before each request with the location, the consumer id, the
    /// default headers and the params. The returned headers are added to the request.
    pub fn with_before_send<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, Option<&str>, &HeaderMap, &RequestParams) -> HeaderMap + Send + Sync + 'static,
    {
        self.before_send = Some(Arc::new(hook));
        self
    }

    /// Called once the body is complete, right before it is parsed.
    pub fn with_before_processing<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.before_processing = Some(Arc::new(hook));
        self
    }

    pub fn with_on_load_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RequestParams) + Send + Sync + 'static,
    {
        self.on_load_start = Some(Arc::new(hook));
        self
    }

    /// Called after every received chunk.
    pub fn with_on_progress<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RequestParams) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(hook));
        self
    }

    pub fn with_on_load_end<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RequestParams) + Send + Sync + 'static,
    {
        self.on_load_end = Some(Arc::new(hook));
        self
    }

    /// Sees every load failure before it reaches the callers.
    pub fn with_error_interceptor<F>(mut self, hook: F) -> Self
    where
        F: Fn(&LoadError) + Send + Sync + 'static,
    {
        self.error_interceptor = Some(Arc::new(hook));
        self
    }

    pub fn params(&self) -> &RequestParams {
        &self.params
    }

    pub(crate) fn request_headers(&self, location: &str, consumer_id: Option<&str>) -> HeaderMap {
        let mut headers = self.default_headers.clone();
        if let Some(before_send) = &self.before_send {
            headers.extend(before_send(location, consumer_id, &self.default_headers, &self.params));
        }
        headers
    }

    pub(crate) fn before_processing(&self) {
        if let Some(hook) = &self.before_processing {
            hook();
        }
    }

    pub(crate) fn load_started(&self) {
        if let Some(hook) = &self.on_load_start {
            hook(&self.params);
        }
    }

    pub(crate) fn progressed(&self) {
        if let Some(hook) = &self.on_progress {
            hook(&self.params);
        }
    }

    pub(crate) fn load_ended(&self) {
        if let Some(hook) = &self.on_load_end {
            hook(&self.params);
        }
    }

    pub(crate) fn intercept_error(&self, error: &LoadError) {
        if let Some(hook) = &self.error_interceptor {
            hook(error);
        }
    }
}

impl fmt::Debug for LoaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("default_headers", &self.default_headers)
            .field("params", &self.params)
            .field("before_send", &self.before_send.is_some())
            .field("before_processing", &self.before_processing.is_some())
            .field("on_load_start", &self.on_load_start.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_load_end", &self.on_load_end.is_some())
            .field("error_interceptor", &self.error_interceptor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{ACCEPT, AUTHORIZATION};

    #[test]
    fn before_send_headers_extend_the_defaults() {
        let options = LoaderOptions::new()
            .with_default_header(ACCEPT, HeaderValue::from_static("application/dicom"))
            .with_param("study", "1.2.3")
            .with_before_send(|location, consumer_id, defaults, params| {
                assert_eq!(location, "http://pacs/a.dcm");
                assert_eq!(consumer_id, Some("wadouri:http://pacs/a.dcm"));
                assert!(defaults.contains_key(ACCEPT));
                assert_eq!(params.get("study").map(String::as_str), Some("1.2.3"));
                let mut extra = HeaderMap::new();
                extra.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
                extra
            });

        let headers = options.request_headers("http://pacs/a.dcm", Some("wadouri:http://pacs/a.dcm"));
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/dicom");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc");
    }

    #[test]
    fn without_hooks_only_defaults_are_sent() {
        let headers = LoaderOptions::new().request_headers("http://pacs/a.dcm", None);
        assert!(headers.is_empty());
    }
}

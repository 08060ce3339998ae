//! Per-request context and the single-use responder.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use http::HeaderMap;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::envelope::Delivery;
use crate::response::Response;

/// Handler arguments: query parameters for `GET`, body parameters otherwise.
pub type Params = Map<String, Value>;

/// Everything the host knows about one inbound request.
///
/// Shared between the validator and the handler as `Arc<Context>`.
#[derive(Debug)]
pub struct Context {
    method: String,
    url: String,
    headers: HeaderMap,
    query: HashMap<String, String>,
    params: Params,
    body: Bytes,
    sent: Mutex<Option<Response>>,
}

impl Context {
    /// A context for `method` on `url` (path plus optional query string).
    ///
    /// The query string is parsed here; a repeated key keeps its last value.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let query: HashMap<String, String> = url
            .split_once('?')
            .map(|(_, qs)| form_urlencoded::parse(qs.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Self {
            method: method.into(),
            url,
            headers: HeaderMap::new(),
            query,
            params: Params::new(),
            body: Bytes::new(),
            sent: Mutex::new(None),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// The request method exactly as received (e.g. `"POST"`).
    pub fn method(&self) -> &str { &self.method }
    /// Path plus query string.
    pub fn url(&self) -> &str { &self.url }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn query(&self) -> &HashMap<String, String> { &self.query }
    /// Parsed body parameters.
    pub fn params(&self) -> &Params { &self.params }
    /// The raw request body.
    pub fn body(&self) -> &Bytes { &self.body }

    /// The URL without its query string.
    pub fn path(&self) -> &str {
        self.url.split_once('?').map_or(self.url.as_str(), |(path, _)| path)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Query parameters as handler arguments (every value a JSON string).
    pub fn query_params(&self) -> Params {
        self.query
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    }

    /// Writes the HTTP response directly. Return
    /// [`Reply::Handled`](crate::Reply::Handled) afterwards so no envelope is
    /// written on top of it. A second call replaces the first.
    pub fn send(&self, response: Response) {
        *self.sent.lock().unwrap_or_else(PoisonError::into_inner) = Some(response);
    }

    pub(crate) fn take_sent(&self) -> Option<Response> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Delivers a request's outcome back to the host, exactly once.
///
/// `respond` consumes the responder; dropping it without responding is
/// reported by the host as a missing response.
#[derive(Debug)]
pub struct Responder(oneshot::Sender<Delivery>);

/// The host's end of a [`Responder`].
pub type Pending = oneshot::Receiver<Delivery>;

impl Responder {
    pub fn channel() -> (Self, Pending) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    pub fn respond(self, delivery: impl Into<Delivery>) {
        // The host only goes away if its connection died; nothing to tell it.
        let _ = self.0.send(delivery.into());
    }
}

//! Per-request context handed to handlers, filters and exception handlers.

use crate::{Error, HttpRequest, HttpResponse};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

struct SinkState {
    response: HttpResponse,
    ended: bool,
}

/// Where a handler writes its response.
///
/// Clones share the same response. Once [`ResponseSink::end`] has been
/// called the response is frozen and later writes are ignored.
#[derive(Clone)]
pub struct ResponseSink {
    state: Arc<Mutex<SinkState>>,
}

impl ResponseSink {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SinkState {
                response: HttpResponse::ok(),
                ended: false,
            })),
        }
    }

    pub fn status(&self) -> u16 {
        self.state.lock().response.status
    }

    pub fn set_status(&self, status: u16) {
        let mut state = self.state.lock();
        if !state.ended {
            state.response.status = status;
        }
    }

    pub fn put_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut state = self.state.lock();
        if !state.ended {
            state.response.headers.insert(name.into(), value.into());
        }
    }

    /// Set a header unless one with the same (case-insensitive) name exists.
    pub fn default_header(&self, name: &str, value: &str) {
        let mut state = self.state.lock();
        let present = state
            .response
            .headers
            .keys()
            .any(|key| key.eq_ignore_ascii_case(name));
        if !state.ended && !present {
            state
                .response
                .headers
                .insert(name.to_string(), value.to_string());
        }
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .response
            .headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    /// Append to the body without ending the response.
    pub fn write(&self, chunk: impl AsRef<[u8]>) {
        let mut state = self.state.lock();
        if !state.ended {
            state.response.body.extend_from_slice(chunk.as_ref());
        }
    }

    /// Append `body` and end the response. Returns false if it had already ended.
    pub fn end(&self, body: impl AsRef<[u8]>) -> bool {
        let mut state = self.state.lock();
        if state.ended {
            return false;
        }
        state.response.body.extend_from_slice(body.as_ref());
        state.ended = true;
        true
    }

    /// Serialize `value` as the JSON body and end the response.
    pub fn end_json<T: Serialize>(&self, value: &T) -> Result<bool, Error> {
        let body = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.put_header("Content-Type", "application/json");
        Ok(self.end(body))
    }

    pub fn is_ended(&self) -> bool {
        self.state.lock().ended
    }

    /// Copy of the response as it stands.
    pub fn snapshot(&self) -> HttpResponse {
        self.state.lock().response.clone()
    }
}

impl Default for ResponseSink {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResponseSink")
            .field("status", &state.response.status)
            .field("ended", &state.ended)
            .finish()
    }
}

/// Full request context: the inbound request plus its response sink.
#[derive(Clone, Debug)]
pub struct RequestContext {
    request: Arc<HttpRequest>,
    response: ResponseSink,
}

impl RequestContext {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            request: Arc::new(request),
            response: ResponseSink::new(),
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn response(&self) -> &ResponseSink {
        &self.response
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.request.param(name).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.request.query(name).map(String::as_str)
    }

    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        self.request.json()
    }
}

//! Transport layer abstraction for tracking.

use crate::error::{SyncError, SyncResult};
use crate::pipe::PipeReader;
use deltaflow_codec::CodecError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Instant;

/// Protocol version header sent with every request.
pub const ODATA_VERSION: (&str, &str) = ("OData-Version", "4.0");

/// Accept header sent with every request.
pub const ACCEPT_JSON: (&str, &str) = ("Accept", "application/json");

/// Change-tracking preference sent with tracking requests.
pub const PREFER_TRACK_CHANGES: (&str, &str) = ("Prefer", "odata.track-changes");

/// Content type of the outbound stream.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Maximum number of body bytes kept in error reports.
pub const BODY_SNIPPET_LIMIT: usize = 4096;

/// A response body being streamed.
pub type ResponseBody = Box<dyn Read + Send>;

/// HTTP client abstraction.
///
/// Implementations validate status codes: any status outside the success
/// range becomes [`SyncError::UnexpectedStatus`].
pub trait HttpClient: Send + Sync {
    /// Sends a GET request and returns the body as a stream.
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> SyncResult<ResponseBody>;

    /// Sends a POST request whose body is read from `body` as it is written.
    fn post_stream(&self, url: &str, content_type: &str, body: PipeReader) -> SyncResult<()>;

    /// Sends a GET request and returns the whole body as text.
    fn get_text(&self, url: &str) -> SyncResult<String> {
        let mut body = self.get(url, &[ODATA_VERSION, ("Accept", "*/*")])?;
        let mut text = String::new();
        body.read_to_string(&mut text).map_err(CodecError::from)?;
        Ok(text)
    }
}

impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> SyncResult<ResponseBody> {
        (**self).get(url, headers)
    }

    fn post_stream(&self, url: &str, content_type: &str, body: PipeReader) -> SyncResult<()> {
        (**self).post_stream(url, content_type, body)
    }

    fn get_text(&self, url: &str) -> SyncResult<String> {
        (**self).get_text(url)
    }
}

/// Truncates a response body for inclusion in an error.
pub fn body_snippet(body: &str) -> String {
    if body.len() <= BODY_SNIPPET_LIMIT {
        return body.to_string();
    }
    let mut end = BODY_SNIPPET_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// A request observed by [`MockClient`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request method.
    pub method: String,
    /// Request URL.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// When the request was issued.
    pub at: Instant,
}

impl RecordedRequest {
    /// Returns the value of a header, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
enum MockResponse {
    Body(Vec<u8>),
    Status(u16, String),
}

/// A scripted HTTP client for testing.
///
/// GET responses are queued per URL and served in order. POST bodies are
/// read to the end and kept.
#[derive(Debug, Default)]
pub struct MockClient {
    responses: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    posts: Mutex<Vec<Vec<u8>>>,
    post_status: Mutex<Option<(u16, String)>>,
    post_read_limit: Mutex<Option<usize>>,
}

impl MockClient {
    /// Creates a mock client with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response body for `url`.
    pub fn push_body(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.responses
            .lock()
            .entry(url.into())
            .or_default()
            .push_back(MockResponse::Body(body.into()));
    }

    /// Queues an error status for `url`.
    pub fn push_status(&self, url: impl Into<String>, status: u16, body: impl Into<String>) {
        self.responses
            .lock()
            .entry(url.into())
            .or_default()
            .push_back(MockResponse::Status(status, body.into()));
    }

    /// Makes every following POST answer with `status` after reading the body.
    pub fn fail_posts_with(&self, status: u16, body: impl Into<String>) {
        *self.post_status.lock() = Some((status, body.into()));
    }

    /// Makes every following POST hang up after reading `bytes` bytes and
    /// answer with `status`, the way a server rejects a request early.
    pub fn reject_posts_after(&self, bytes: usize, status: u16, body: impl Into<String>) {
        *self.post_read_limit.lock() = Some(bytes);
        self.fail_posts_with(status, body);
    }

    /// Returns every request issued so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Returns the URLs of the GET requests issued so far.
    pub fn get_urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == "GET")
            .map(|r| r.url.clone())
            .collect()
    }

    /// Returns the bodies of completed POST requests.
    pub fn posts(&self) -> Vec<Vec<u8>> {
        self.posts.lock().clone()
    }

    fn record(&self, method: &str, url: &str, headers: &[(&str, &str)]) {
        self.requests.lock().push(RecordedRequest {
            method: method.into(),
            url: url.into(),
            headers: headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            at: Instant::now(),
        });
    }
}

impl HttpClient for MockClient {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> SyncResult<ResponseBody> {
        self.record("GET", url, headers);
        let response = self
            .responses
            .lock()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| SyncError::transport_fatal(format!("no mock response for {url}")))?;

        match response {
            MockResponse::Body(body) => Ok(Box::new(Cursor::new(body))),
            MockResponse::Status(status, body) => Err(SyncError::UnexpectedStatus {
                method: "GET".into(),
                url: url.into(),
                status,
                body: body_snippet(&body),
            }),
        }
    }

    fn post_stream(&self, url: &str, content_type: &str, mut body: PipeReader) -> SyncResult<()> {
        self.record("POST", url, &[("Content-Type", content_type)]);
        let mut received = Vec::new();
        let limit = *self.post_read_limit.lock();
        match limit {
            Some(limit) => {
                (&mut body)
                    .take(limit as u64)
                    .read_to_end(&mut received)
                    .map_err(CodecError::from)?;
                drop(body);
            }
            None => {
                body.read_to_end(&mut received).map_err(CodecError::from)?;
            }
        }

        if let Some((status, text)) = self.post_status.lock().clone() {
            return Err(SyncError::UnexpectedStatus {
                method: "POST".into(),
                url: url.into(),
                status,
                body: body_snippet(&text),
            });
        }

        self.posts.lock().push(received);
        Ok(())
    }
}

//! HTTP transport implementation.
//!
//! Blocking reqwest client with a cookie-backed session, so the credentials
//! sent on the first request establish a session reused by later ones.

use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::pipe::PipeReader;
use crate::transport::{body_snippet, HttpClient, ResponseBody, ACCEPT_JSON, ODATA_VERSION};
use reqwest::blocking::{Body, Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, error};

/// HTTP client backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Builds a client from the given configuration.
    pub fn new(config: &ClientConfig) -> SyncResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(value) = config.auth.header_value() {
            let mut value = HeaderValue::from_str(&value).map_err(|e| {
                SyncError::InvalidConfig(format!("credentials are not a valid header: {e}"))
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::transport_fatal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

fn request_error(method: &str, url: &str, err: reqwest::Error) -> SyncError {
    let message = format!("{method} {url}: {err}");
    if err.is_timeout() || err.is_connect() {
        SyncError::transport_retryable(message)
    } else {
        SyncError::transport_fatal(message)
    }
}

/// Turns a non-success response into `UnexpectedStatus`, logging it.
fn check_status(method: &str, url: &str, response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = body_snippet(&response.text().unwrap_or_default());
    error!(method, url, status = status.as_u16(), body = %body, "server responded with an unexpected status");
    Err(SyncError::UnexpectedStatus {
        method: method.into(),
        url: url.into(),
        status: status.as_u16(),
        body,
    })
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> SyncResult<ResponseBody> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request
            .send()
            .map_err(|e| request_error("GET", url, e))?;
        let response = check_status("GET", url, response)?;
        debug!(url, status = response.status().as_u16(), "response headers received");
        Ok(Box::new(response))
    }

    fn post_stream(&self, url: &str, content_type: &str, body: PipeReader) -> SyncResult<()> {
        let response = self
            .client
            .post(url)
            .header(ODATA_VERSION.0, ODATA_VERSION.1)
            .header(ACCEPT_JSON.0, ACCEPT_JSON.1)
            .header(CONTENT_TYPE, content_type)
            .body(Body::new(body))
            .send()
            .map_err(|e| request_error("POST", url, e))?;
        let response = check_status("POST", url, response)?;
        debug!(url, status = response.status().as_u16(), "outbound stream delivered");
        Ok(())
    }
}

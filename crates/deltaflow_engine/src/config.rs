//! Configuration for the tracker and its HTTP client.

use crate::error::{SyncError, SyncResult};
use crate::pipe::DEFAULT_PIPE_CAPACITY;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use deltaflow_codec::FieldNames;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Poll interval used when none (or an invalid one) is configured.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Smallest accepted poll interval in seconds.
pub const MIN_POLL_INTERVAL_SECS: i64 = 1;

/// Sink used when none is configured.
pub const DEFAULT_SINK_URL: &str = "http://localhost:12345";

/// Converts a configured interval in seconds into a poll interval.
///
/// Values below [`MIN_POLL_INTERVAL_SECS`] fall back to the default.
pub fn poll_interval_from_secs(secs: i64) -> Duration {
    if secs < MIN_POLL_INTERVAL_SECS {
        Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)
    } else {
        Duration::from_secs(secs.unsigned_abs())
    }
}

/// Parses a service root URL, appending `/` to its path if missing.
pub fn parse_service_root(service_root: &str) -> SyncResult<Url> {
    let mut root = Url::parse(service_root)
        .map_err(|e| SyncError::InvalidConfig(format!("service root {service_root:?}: {e}")))?;
    if root.cannot_be_a_base() {
        return Err(SyncError::InvalidConfig(format!(
            "service root {service_root:?} cannot hold relative links"
        )));
    }
    if !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }
    Ok(root)
}

/// Configuration for tracking one collection.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Service root URL; links are resolved against it.
    pub service_root: String,
    /// Collection path relative to the service root.
    pub collection: String,
    /// URL that receives the re-streamed records.
    pub sink_url: String,
    /// Wait between change-tracking polls.
    pub poll_interval: Duration,
    /// Member names recognized in response bodies.
    pub fields: FieldNames,
    /// Capacity of the outbound pipe in bytes.
    pub pipe_capacity: usize,
    /// Log every request at info level instead of debug.
    pub verbose: bool,
}

impl TrackerConfig {
    /// Creates a new tracker configuration.
    pub fn new(service_root: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            service_root: service_root.into(),
            collection: collection.into(),
            sink_url: DEFAULT_SINK_URL.into(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            fields: FieldNames::default(),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            verbose: false,
        }
    }

    /// Sets the sink URL.
    pub fn with_sink_url(mut self, url: impl Into<String>) -> Self {
        self.sink_url = url.into();
        self
    }

    /// Sets the poll interval in seconds, applying the minimum and default.
    pub fn with_poll_interval_secs(mut self, secs: i64) -> Self {
        self.poll_interval = poll_interval_from_secs(secs);
        self
    }

    /// Sets the poll interval directly. A zero interval selects the default.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = if interval.is_zero() {
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)
        } else {
            interval
        };
        self
    }

    /// Sets the recognized member names.
    pub fn with_fields(mut self, fields: FieldNames) -> Self {
        self.fields = fields;
        self
    }

    /// Sets the outbound pipe capacity.
    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity;
        self
    }

    /// Enables verbose request logging.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Checks the configuration and returns the normalized service root.
    ///
    /// The returned URL always ends with `/` so relative links resolve
    /// beneath it.
    pub fn validate(&self) -> SyncResult<Url> {
        let root = parse_service_root(&self.service_root)?;

        Url::parse(&self.sink_url)
            .map_err(|e| SyncError::InvalidConfig(format!("sink url {:?}: {e}", self.sink_url)))?;

        if self.collection.trim().is_empty() {
            return Err(SyncError::InvalidConfig("collection path is empty".into()));
        }
        if let Some(name) = self.fields.conflict() {
            return Err(SyncError::InvalidConfig(format!(
                "member name {name:?} is empty or used twice"
            )));
        }
        if self.pipe_capacity == 0 {
            return Err(SyncError::InvalidConfig("pipe capacity must be positive".into()));
        }

        Ok(root)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::new("", "")
    }
}

/// Credentials sent with every request.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Auth {
    /// No `Authorization` header.
    #[default]
    None,
    /// HTTP basic authentication.
    Basic {
        /// User name.
        user: String,
        /// Password.
        password: String,
    },
    /// CAM namespace authentication.
    CamNamespace {
        /// User name.
        user: String,
        /// Password.
        password: String,
        /// CAM namespace.
        namespace: String,
    },
}

impl Auth {
    /// Returns the `Authorization` header value, if any.
    pub fn header_value(&self) -> Option<String> {
        match self {
            Auth::None => None,
            Auth::Basic { user, password } => {
                Some(format!("Basic {}", STANDARD.encode(format!("{user}:{password}"))))
            }
            Auth::CamNamespace {
                user,
                password,
                namespace,
            } => Some(format!(
                "CAMNamespace {}",
                STANDARD.encode(format!("{user}:{password}:{namespace}"))
            )),
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Basic { user, .. } => f
                .debug_struct("Basic")
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
            Auth::CamNamespace {
                user, namespace, ..
            } => f
                .debug_struct("CamNamespace")
                .field("user", user)
                .field("password", &"<redacted>")
                .field("namespace", namespace)
                .finish(),
        }
    }
}

/// Configuration for the HTTP client.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Credentials.
    pub auth: Auth,
    /// Accept invalid TLS certificates.
    pub accept_invalid_certs: bool,
    /// Whole-request timeout. `None` lets long bodies stream indefinitely.
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    /// Creates a client configuration without credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the credentials.
    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    /// Accepts invalid TLS certificates.
    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

//! # deltaflow Engine
//!
//! Change-tracking poll loop that mirrors a collection into a sink.
//!
//! This crate provides:
//! - Tracker state machine (fetching → processing → waiting → fetching)
//! - Re-streaming forwarder with a bounded outbound pipe
//! - HTTP transport abstraction with a reqwest client and a scripted mock
//! - Server version probe
//!
//! ## Architecture
//!
//! Each response body is parsed on its own thread. Records are re-serialized
//! into a pipe as soon as they are decoded, and a POST to the sink streams
//! the pipe's other end. The continuation links reach the poll loop through
//! a one-shot handoff once the body has been fully consumed.
//!
//! ## Key Invariants
//!
//! - A body without records never produces a POST
//! - A next-link is followed immediately; a delta-link after the poll interval
//! - The previous POST completes before the next body is forwarded
//! - A truncated outbound stream is never closed cleanly

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod config;
mod error;
mod forwarder;
mod http;
mod pipe;
mod probe;
mod tracker;
mod transport;

pub use cancel::CancelToken;
pub use config::{
    parse_service_root, poll_interval_from_secs, Auth, ClientConfig, TrackerConfig,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SINK_URL, MIN_POLL_INTERVAL_SECS,
};
pub use error::{SyncError, SyncResult};
pub use forwarder::{Delivery, ForwardOutcome, Forwarder};
pub use http::ReqwestClient;
pub use pipe::{pipe, PipeHandle, PipeReader, PipeWriter, DEFAULT_PIPE_CAPACITY};
pub use probe::{probe_version, MIN_TRACKING_VERSION, PRODUCT_VERSION_PATH};
pub use tracker::{TrackState, TrackStats, TrackSummary, Tracker};
pub use transport::{
    body_snippet, HttpClient, MockClient, RecordedRequest, ResponseBody, ACCEPT_JSON,
    BODY_SNIPPET_LIMIT, CONTENT_TYPE_JSON, ODATA_VERSION, PREFER_TRACK_CHANGES,
};

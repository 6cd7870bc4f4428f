//! Poll loop state machine.
//!
//! ```text
//! Fetching ──GET──▶ Processing ──next-link──▶ Fetching
//!                       │
//!                       ├──delta-link──▶ Waiting ──interval──▶ Fetching
//!                       │
//!                       └──no link──▶ Stopped
//! ```

use crate::cancel::CancelToken;
use crate::config::TrackerConfig;
use crate::error::{SyncError, SyncResult};
use crate::forwarder::{Delivery, Forwarder};
use crate::transport::{HttpClient, ACCEPT_JSON, ODATA_VERSION, PREFER_TRACK_CHANGES};
use deltaflow_codec::NextStep;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use url::Url;

/// The current state of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Tracker has not run yet.
    Idle,
    /// A GET request is in flight.
    Fetching,
    /// A response body is being parsed and forwarded.
    Processing,
    /// Waiting for the poll interval before fetching the delta.
    Waiting,
    /// The server stopped offering continuation links.
    Stopped,
    /// Tracking ended with an error.
    Failed,
    /// Tracking was cancelled.
    Cancelled,
}

impl TrackState {
    /// Returns true while a loop is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TrackState::Fetching | TrackState::Processing | TrackState::Waiting
        )
    }

    /// Returns true if a new loop may be started.
    pub fn can_start(&self) -> bool {
        !self.is_active()
    }
}

/// Statistics about tracking.
#[derive(Debug, Clone, Default)]
pub struct TrackStats {
    /// Completed polls (the last page of a logical request was processed).
    pub polls: u64,
    /// Response bodies processed.
    pub pages: u64,
    /// Records forwarded to the sink.
    pub records_forwarded: u64,
    /// Outbound POSTs that completed successfully.
    pub posts: u64,
    /// Time the last page was processed.
    pub last_page_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a finished loop.
#[derive(Debug, Clone)]
pub struct TrackSummary {
    /// Completed polls.
    pub polls: u64,
    /// Response bodies processed.
    pub pages: u64,
    /// Records forwarded.
    pub records: u64,
    /// URL of the last request.
    pub last_url: String,
    /// Duration of the loop.
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Follow next-links and delta-links forever.
    Track,
    /// Follow next-links only.
    Iterate,
}

impl Mode {
    fn headers(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Mode::Track => &[ODATA_VERSION, ACCEPT_JSON, PREFER_TRACK_CHANGES],
            Mode::Iterate => &[ODATA_VERSION, ACCEPT_JSON],
        }
    }
}

/// Tracks one collection and mirrors its changes to a sink.
pub struct Tracker<C> {
    config: TrackerConfig,
    service_root: Url,
    client: Arc<C>,
    forwarder: Forwarder<C>,
    state: RwLock<TrackState>,
    stats: RwLock<TrackStats>,
    cancel: CancelToken,
}

impl<C: HttpClient + 'static> Tracker<C> {
    /// Creates a tracker. Fails if the configuration is invalid.
    pub fn new(config: TrackerConfig, client: C) -> SyncResult<Self> {
        Self::with_cancel_token(config, client, CancelToken::new())
    }

    /// Creates a tracker that stops when `cancel` is cancelled.
    pub fn with_cancel_token(
        config: TrackerConfig,
        client: C,
        cancel: CancelToken,
    ) -> SyncResult<Self> {
        let service_root = config.validate()?;
        let client = Arc::new(client);
        let forwarder = Forwarder::new(
            Arc::clone(&client),
            config.sink_url.clone(),
            config.fields.clone(),
            config.pipe_capacity,
            cancel.clone(),
        );

        Ok(Self {
            config,
            service_root,
            client,
            forwarder,
            state: RwLock::new(TrackState::Idle),
            stats: RwLock::new(TrackStats::default()),
            cancel,
        })
    }

    /// Gets the current state.
    pub fn state(&self) -> TrackState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> TrackStats {
        self.stats.read().clone()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Returns the HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns a clone of the cancellation token.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Cancels a running loop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn set_state(&self, state: TrackState) {
        *self.state.write() = state;
    }

    /// Tracks the configured collection until the server stops offering links.
    pub fn track(&self) -> SyncResult<TrackSummary> {
        self.run(&self.config.collection, Mode::Track)
    }

    /// Tracks starting from a previously observed link.
    ///
    /// Lets a supervising process resume from a delta-link it kept.
    pub fn track_from(&self, link: &str) -> SyncResult<TrackSummary> {
        self.run(link, Mode::Track)
    }

    /// Reads the whole collection once, following next-links only.
    pub fn iterate(&self) -> SyncResult<TrackSummary> {
        self.run(&self.config.collection, Mode::Iterate)
    }

    /// Resolves a link from a response against the service root.
    pub fn resolve(&self, link: &str) -> SyncResult<String> {
        match Url::parse(link) {
            Ok(absolute) => Ok(absolute.into()),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .service_root
                .join(link)
                .map(String::from)
                .map_err(|e| SyncError::Protocol(format!("cannot resolve link {link:?}: {e}"))),
            Err(e) => Err(SyncError::Protocol(format!("invalid link {link:?}: {e}"))),
        }
    }

    fn run(&self, start: &str, mode: Mode) -> SyncResult<TrackSummary> {
        {
            let mut state = self.state.write();
            if !state.can_start() {
                return Err(SyncError::InvalidStateTransition {
                    from: format!("{:?}", *state),
                    to: "Fetching".into(),
                });
            }
            *state = TrackState::Fetching;
        }

        let started = Instant::now();
        let mut summary = TrackSummary {
            polls: 0,
            pages: 0,
            records: 0,
            last_url: String::new(),
            duration: Duration::ZERO,
        };
        let mut pending = None;

        let result = self
            .resolve(start)
            .and_then(|url| self.poll(url, mode, &mut pending, &mut summary));

        // The last body's POST may still be draining.
        let settled = pending.map_or(Ok(()), |delivery| self.settle(delivery));
        let result = result.and(settled);
        summary.duration = started.elapsed();

        match result {
            Ok(()) => {
                self.set_state(TrackState::Stopped);
                info!(
                    polls = summary.polls,
                    pages = summary.pages,
                    records = summary.records,
                    "server stopped offering continuation links"
                );
                Ok(summary)
            }
            Err(err) if self.cancel.is_cancelled() => {
                self.set_state(TrackState::Cancelled);
                debug!(error = %err, "tracking cancelled");
                Err(SyncError::Cancelled)
            }
            Err(err) => {
                self.set_state(TrackState::Failed);
                self.stats.write().last_error = Some(err.to_string());
                error!(url = %summary.last_url, error = %err, "tracking failed");
                Err(err)
            }
        }
    }

    fn poll(
        &self,
        mut url: String,
        mode: Mode,
        pending: &mut Option<Delivery>,
        summary: &mut TrackSummary,
    ) -> SyncResult<()> {
        loop {
            self.cancel.check()?;

            self.set_state(TrackState::Fetching);
            summary.last_url.clone_from(&url);
            if self.config.verbose {
                info!(%url, "GET");
            } else {
                debug!(%url, "GET");
            }
            let body = self.client.get(&url, mode.headers())?;

            self.set_state(TrackState::Processing);
            if let Some(previous) = pending.take() {
                self.settle(previous)?;
            }
            let outcome = self.forwarder.forward(body)?;
            *pending = outcome.delivery;

            summary.pages += 1;
            summary.records += outcome.records;
            {
                let mut stats = self.stats.write();
                stats.pages += 1;
                stats.records_forwarded += outcome.records;
                stats.last_page_time = Some(Instant::now());
            }
            self.cancel.check()?;

            match outcome.continuation.next_step() {
                NextStep::NextPage(link) => {
                    url = self.resolve(link)?;
                    debug!(next = %url, "following next link");
                }
                NextStep::Delta(link) if mode == Mode::Track => {
                    url = self.resolve(link)?;
                    self.finish_poll(summary);
                    if let Some(previous) = pending.take() {
                        self.settle(previous)?;
                    }

                    self.set_state(TrackState::Waiting);
                    debug!(interval = ?self.config.poll_interval, delta = %url, "waiting for next poll");
                    if self.cancel.sleep(self.config.poll_interval) {
                        return Err(SyncError::Cancelled);
                    }
                }
                NextStep::Delta(_) | NextStep::Stop => {
                    self.finish_poll(summary);
                    return Ok(());
                }
            }
        }
    }

    fn finish_poll(&self, summary: &mut TrackSummary) {
        summary.polls += 1;
        self.stats.write().polls += 1;
    }

    fn settle(&self, delivery: Delivery) -> SyncResult<()> {
        delivery.wait()?;
        self.stats.write().posts += 1;
        Ok(())
    }
}

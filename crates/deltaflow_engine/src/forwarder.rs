//! Re-streaming forwarder.
//!
//! Republishes the records of one response body to the sink as
//! `{"value":[r1,r2,...]}` while the body is still being parsed.
//!
//! The outbound POST is armed on the first record only, so a body without
//! records produces no pipe and no request. The continuation reaches the
//! caller through a one-shot handoff that is resolved only after the pipe
//! has been closed, i.e. after every record has been written to it.

use crate::cancel::CancelToken;
use crate::error::{SyncError, SyncResult};
use crate::pipe::{pipe, PipeWriter};
use crate::transport::{HttpClient, CONTENT_TYPE_JSON};
use deltaflow_codec::{
    CodecError, CodecResult, Continuation, FieldNames, ParseUnit, Record, StreamParser,
};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// An outbound POST that may still be draining.
#[derive(Debug)]
pub struct Delivery {
    handle: JoinHandle<SyncResult<()>>,
}

impl Delivery {
    /// Blocks until the POST completes and returns its result.
    pub fn wait(self) -> SyncResult<()> {
        self.handle
            .join()
            .unwrap_or_else(|_| Err(SyncError::transport_fatal("outbound delivery thread panicked")))
    }
}

/// Result of forwarding one response body.
#[derive(Debug)]
pub struct ForwardOutcome {
    /// Continuation links found in the body.
    pub continuation: Continuation,
    /// Number of records forwarded.
    pub records: u64,
    /// The outbound POST, if at least one record was forwarded.
    pub delivery: Option<Delivery>,
}

/// Forwards parsed records from response bodies to a sink.
pub struct Forwarder<C> {
    client: Arc<C>,
    sink_url: String,
    fields: FieldNames,
    pipe_capacity: usize,
    cancel: CancelToken,
}

impl<C: HttpClient + 'static> Forwarder<C> {
    /// Creates a forwarder posting to `sink_url`.
    pub fn new(
        client: Arc<C>,
        sink_url: impl Into<String>,
        fields: FieldNames,
        pipe_capacity: usize,
        cancel: CancelToken,
    ) -> Self {
        Self {
            client,
            sink_url: sink_url.into(),
            fields,
            pipe_capacity,
            cancel,
        }
    }

    /// Parses `body` on a separate thread and re-streams its records.
    ///
    /// Returns as soon as the whole body has been consumed; the returned
    /// delivery may still be sending.
    pub fn forward<R>(&self, body: R) -> SyncResult<ForwardOutcome>
    where
        R: Read + Send + 'static,
    {
        let (handoff, outcome) = oneshot::channel();
        let session = Session {
            client: Arc::clone(&self.client),
            sink_url: self.sink_url.clone(),
            collection: self.fields.collection.clone(),
            pipe_capacity: self.pipe_capacity,
            cancel: self.cancel.clone(),
            writer: None,
            delivery: None,
            records: 0,
        };
        let fields = self.fields.clone();

        thread::Builder::new()
            .name("deltaflow-parse".into())
            .spawn(move || session.run(body, fields, handoff))
            .map_err(|e| SyncError::transport_fatal(format!("failed to spawn parser: {e}")))?;

        outcome.blocking_recv().map_err(|_| SyncError::HandoffLost)?
    }
}

/// Per-body state owned by the parser thread.
struct Session<C> {
    client: Arc<C>,
    sink_url: String,
    collection: String,
    pipe_capacity: usize,
    cancel: CancelToken,
    writer: Option<PipeWriter>,
    delivery: Option<Delivery>,
    records: u64,
}

impl<C: HttpClient + 'static> Session<C> {
    fn run<R: Read>(
        mut self,
        body: R,
        fields: FieldNames,
        handoff: oneshot::Sender<SyncResult<ForwardOutcome>>,
    ) {
        let mut handoff = Some(handoff);

        let result = StreamParser::new(body, fields).parse(|unit| match unit {
            ParseUnit::Record(record) => self.write_record(&record),
            ParseUnit::Final(continuation) => {
                let delivery = self.finish()?;
                debug!(records = self.records, armed = delivery.is_some(), "body consumed");
                if let Some(tx) = handoff.take() {
                    let outcome = ForwardOutcome {
                        continuation,
                        records: self.records,
                        delivery,
                    };
                    if tx.send(Ok(outcome)).is_err() {
                        warn!("continuation handoff dropped by the poll loop");
                    }
                }
                Ok(())
            }
        });

        if let Err(err) = result {
            // Reap the outbound stream first so the sink has seen it fail by
            // the time the poll loop learns about the error.
            let err = match (err, self.abandon()) {
                // The sink hung up mid-stream; its answer is the real failure.
                (CodecError::TransportInterrupted(cause), Some(sink_err))
                    if cause.kind() == io::ErrorKind::BrokenPipe =>
                {
                    sink_err
                }
                (err, Some(sink_err)) => {
                    debug!(error = %sink_err, "abandoned outbound stream failed");
                    err.into()
                }
                (err, None) => err.into(),
            };
            if let Some(tx) = handoff.take() {
                let _ = tx.send(Err(err));
            }
        }
    }

    fn write_record(&mut self, record: &Record) -> CodecResult<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write_all(b",")?,
            None => self.open()?,
        }
        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(writer, record).map_err(io::Error::from)?;
        }
        self.records += 1;
        trace!(index = self.records - 1, "record forwarded");
        Ok(())
    }

    /// Opens the pipe, arms the POST, then writes the array-open framing.
    fn open(&mut self) -> CodecResult<()> {
        let (writer, reader) = pipe(self.pipe_capacity);
        self.cancel.register_pipe(writer.handle());

        let client = Arc::clone(&self.client);
        let url = self.sink_url.clone();
        let handle = thread::Builder::new()
            .name("deltaflow-post".into())
            .spawn(move || client.post_stream(&url, CONTENT_TYPE_JSON, reader))?;
        debug!(url = %self.sink_url, "outbound stream armed");
        self.delivery = Some(Delivery { handle });

        let writer = self.writer.insert(writer);
        writer.write_all(b"{")?;
        serde_json::to_writer(&mut *writer, &self.collection).map_err(io::Error::from)?;
        writer.write_all(b":[")?;
        Ok(())
    }

    /// Closes the array and the pipe. Returns the delivery if one was armed.
    fn finish(&mut self) -> CodecResult<Option<Delivery>> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(b"]}")?;
        }
        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }
        Ok(self.delivery.take())
    }

    /// Drops the writer without closing so the POST fails, then reaps it.
    /// Returns the error the POST ended with, if any.
    fn abandon(&mut self) -> Option<SyncError> {
        drop(self.writer.take());
        self.delivery.take().and_then(|delivery| delivery.wait().err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockClient;
    use deltaflow_codec::CodecError;
    use deltaflow_testkit::{outbound_body, page_strategy, ChunkedReader};
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use std::io::Cursor;

    fn forwarder(client: &Arc<MockClient>, capacity: usize) -> Forwarder<MockClient> {
        Forwarder::new(
            Arc::clone(client),
            "http://sink/ingest",
            FieldNames::default(),
            capacity,
            CancelToken::new(),
        )
    }

    fn body(text: &str) -> Cursor<Vec<u8>> {
        Cursor::new(text.as_bytes().to_vec())
    }

    #[test]
    fn single_record_scenario() {
        let client = Arc::new(MockClient::new());
        let outcome = forwarder(&client, 1024)
            .forward(body(r#"{"value":[{"a":1}],"@odata.deltaLink":"T2"}"#))
            .unwrap();

        assert_eq!(outcome.continuation, Continuation::delta("T2"));
        assert_eq!(outcome.records, 1);
        outcome.delivery.unwrap().wait().unwrap();

        let posts = client.posts();
        assert_eq!(posts.len(), 1);
        let posted: Value = serde_json::from_slice(&posts[0]).unwrap();
        assert_eq!(posted, json!({"value": [{"a": 1}]}));
    }

    #[test]
    fn empty_collection_sends_nothing() {
        let client = Arc::new(MockClient::new());
        let outcome = forwarder(&client, 1024)
            .forward(body(r#"{"value":[],"@odata.deltaLink":"T3"}"#))
            .unwrap();

        assert_eq!(outcome.records, 0);
        assert!(outcome.delivery.is_none());
        assert_eq!(outcome.continuation, Continuation::delta("T3"));
        assert!(client.requests().is_empty());
    }

    #[test]
    fn many_records_through_a_tiny_pipe() {
        let client = Arc::new(MockClient::new());
        let records: Vec<Value> = (0..200).map(|i| json!({"ID": i, "Cube": "Sales"})).collect();
        let text = serde_json::to_string(&json!({"value": records, "@odata.nextLink": "/p2"})).unwrap();

        let outcome = forwarder(&client, 3).forward(body(&text)).unwrap();
        assert_eq!(outcome.records, 200);
        assert_eq!(outcome.continuation, Continuation::next("/p2"));
        outcome.delivery.unwrap().wait().unwrap();

        let posted: Value = serde_json::from_slice(&client.posts()[0]).unwrap();
        assert_eq!(posted, json!({"value": records}));
    }

    #[test]
    fn posts_use_json_content_type() {
        let client = Arc::new(MockClient::new());
        let outcome = forwarder(&client, 64)
            .forward(body(r#"{"value":[{"a":1}]}"#))
            .unwrap();
        outcome.delivery.unwrap().wait().unwrap();

        let requests = client.requests();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].url, "http://sink/ingest");
        assert_eq!(requests[0].header("Content-Type"), Some(CONTENT_TYPE_JSON));
    }

    #[test]
    fn decode_failure_aborts_outbound() {
        let client = Arc::new(MockClient::new());
        let err = forwarder(&client, 64)
            .forward(body(r#"{"value":[{"a":1},123]}"#))
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::Codec(CodecError::RecordDecodeFailed { index: 1, .. })
        ));
        // The truncated stream must never be accepted by the sink.
        assert!(client.posts().is_empty());
    }

    #[test]
    fn malformed_body_without_records() {
        let client = Arc::new(MockClient::new());
        let err = forwarder(&client, 64).forward(body(r#"{"value": ["#)).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Codec(CodecError::MalformedStructure { .. })
        ));
        assert!(client.requests().is_empty());
    }

    #[test]
    fn sink_failure_surfaces_on_wait() {
        let client = Arc::new(MockClient::new());
        client.fail_posts_with(503, "unavailable");
        let outcome = forwarder(&client, 64)
            .forward(body(r#"{"value":[{"a":1}],"@odata.deltaLink":"T"}"#))
            .unwrap();

        let err = outcome.delivery.unwrap().wait().unwrap_err();
        assert!(matches!(err, SyncError::UnexpectedStatus { status: 503, .. }));
    }

    #[test]
    fn sink_rejecting_mid_stream_reports_its_status() {
        let client = Arc::new(MockClient::new());
        client.reject_posts_after(100, 400, "bad request");
        let records: Vec<Value> = (0..2000).map(|i| json!({"ID": i})).collect();
        let text = serde_json::to_string(&json!({"value": records})).unwrap();

        let err = forwarder(&client, 64).forward(body(&text)).unwrap_err();

        assert!(matches!(err, SyncError::UnexpectedStatus { status: 400, .. }), "{err}");
        assert!(!err.is_retryable());
        assert!(client.posts().is_empty());
    }

    #[test]
    fn records_are_forwarded_byte_for_byte() {
        let client = Arc::new(MockClient::new());
        let outcome = forwarder(&client, 16)
            .forward(body(
                r#"{"value":[{"n":123456789012345678901234567890,"d":1E2,"f":0.10}]}"#,
            ))
            .unwrap();
        outcome.delivery.unwrap().wait().unwrap();

        assert_eq!(
            String::from_utf8(client.posts()[0].clone()).unwrap(),
            r#"{"value":[{"n":123456789012345678901234567890,"d":1E2,"f":0.10}]}"#
        );
    }

    #[test]
    fn custom_collection_name_frames_output() {
        let client = Arc::new(MockClient::new());
        let fields = FieldNames::default().with_collection("items");
        let forwarder = Forwarder::new(
            Arc::clone(&client),
            "http://sink",
            fields,
            64,
            CancelToken::new(),
        );
        let outcome = forwarder.forward(body(r#"{"items":[{"x":1},{"x":2}]}"#)).unwrap();
        outcome.delivery.unwrap().wait().unwrap();

        let posted: Value = serde_json::from_slice(&client.posts()[0]).unwrap();
        assert_eq!(posted, json!({"items": [{"x": 1}, {"x": 2}]}));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn forwarded_body_matches_page(page in page_strategy(12), chunk in 1usize..64) {
            let client = Arc::new(MockClient::new());
            let outcome = forwarder(&client, 8)
                .forward(ChunkedReader::new(page.body.clone(), chunk))
                .unwrap();

            prop_assert_eq!(outcome.records, page.records.len() as u64);
            prop_assert_eq!(&outcome.continuation.next_link, &page.next_link);
            prop_assert_eq!(&outcome.continuation.delta_link, &page.delta_link);

            match outcome.delivery {
                Some(delivery) => {
                    delivery.wait().unwrap();
                    let posted: Value = serde_json::from_slice(&client.posts()[0]).unwrap();
                    prop_assert_eq!(posted, outbound_body(&page.records));
                }
                None => {
                    prop_assert!(page.records.is_empty());
                    prop_assert!(client.requests().is_empty());
                }
            }
        }
    }
}

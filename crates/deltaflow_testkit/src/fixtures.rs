//! Response body fixtures.
//!
//! Builders for collection pages as a change-tracking server returns them,
//! and readers that hand them out a few bytes at a time.

use serde_json::{Map, Value};
use std::io::{self, Read};

/// Builds a collection page with the default member names.
pub fn collection_body(records: &[Value], next_link: Option<&str>, delta_link: Option<&str>) -> String {
    let mut page = Map::new();
    page.insert("@odata.context".into(), Value::from("$metadata#TransactionLogEntries"));
    page.insert("value".into(), Value::Array(records.to_vec()));
    if let Some(link) = next_link {
        page.insert("@odata.nextLink".into(), Value::from(link));
    }
    if let Some(link) = delta_link {
        page.insert("@odata.deltaLink".into(), Value::from(link));
    }
    Value::Object(page).to_string()
}

/// Builds `count` transaction log entries with ascending IDs.
pub fn transaction_log_entries(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            serde_json::json!({
                "ID": i,
                "ChangeSetID": format!("cs-{}", i / 10),
                "TimeStamp": format!("2026-01-01T00:{:02}:{:02}Z", (i / 60) % 60, i % 60),
                "User": "Admin",
                "Cube": "Sales",
                "Tuple": ["Actual", "Jan", format!("Product {i}")],
                "OldValue": i,
                "NewValue": i + 1,
                "StatusMessage": null,
            })
        })
        .collect()
}

/// Wraps `records` as the body the sink should receive.
pub fn outbound_body(records: &[Value]) -> Value {
    serde_json::json!({ "value": records })
}

/// A reader that returns at most `chunk` bytes per call.
///
/// Exercises parsers against bodies split at arbitrary positions, the way a
/// network stream arrives.
#[derive(Debug, Clone)]
pub struct ChunkedReader {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
}

impl ChunkedReader {
    /// Creates a reader over `data` with the given chunk size (at least 1).
    pub fn new(data: impl Into<Vec<u8>>, chunk: usize) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            chunk: chunk.max(1),
        }
    }
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(self.chunk).min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// A reader that fails after returning `limit` bytes.
///
/// Simulates a connection dropped mid-body.
#[derive(Debug, Clone)]
pub struct FailingReader {
    inner: ChunkedReader,
    limit: usize,
}

impl FailingReader {
    /// Creates a reader over `data` that errors once `limit` bytes were read.
    pub fn new(data: impl Into<Vec<u8>>, limit: usize) -> Self {
        Self {
            inner: ChunkedReader::new(data, 7),
            limit,
        }
    }
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.limit.saturating_sub(self.inner.pos);
        if left == 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
        }
        let n = buf.len().min(left);
        self.inner.read(&mut buf[..n])
    }
}

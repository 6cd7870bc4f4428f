//! Incremental parser for OData collection bodies.
//!
//! Parses `{ ..., "value": [ <record>, ... ], ..., "@odata.deltaLink": "..." }`
//! straight from a byte stream. Only one record is held in memory at a time.

use crate::continuation::{Continuation, FieldNames};
use crate::error::{CodecError, CodecResult};
use crate::record::Record;
use crate::scanner::{Scanner, Sink};
use std::io::Read;

/// One unit of parser output.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseUnit {
    /// A record, in collection order.
    Record(Record),
    /// Emitted exactly once, after every record of the body.
    Final(Continuation),
}

/// Totals for one parsed body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseSummary {
    /// Number of records delivered.
    pub records: u64,
    /// Number of body bytes consumed.
    pub bytes: u64,
}

/// Streaming parser for a single response body.
///
/// # Example
///
/// ```
/// use deltaflow_codec::{FieldNames, ParseUnit, StreamParser};
///
/// let body = br#"{"value":[{"a":1}],"@odata.deltaLink":"T2"}"#;
/// let mut units = Vec::new();
/// StreamParser::new(&body[..], FieldNames::default())
///     .parse(|unit| {
///         units.push(unit);
///         Ok(())
///     })
///     .unwrap();
///
/// assert_eq!(units.len(), 2);
/// assert!(matches!(&units[1], ParseUnit::Final(c) if c.delta_link.as_deref() == Some("T2")));
/// ```
pub struct StreamParser<R> {
    scanner: Scanner<R>,
    fields: FieldNames,
    scratch: Vec<u8>,
}

impl<R: Read> StreamParser<R> {
    /// Creates a parser positioned at the start of a JSON document.
    pub fn new(reader: R, fields: FieldNames) -> Self {
        Self {
            scanner: Scanner::new(reader),
            fields,
            scratch: Vec::new(),
        }
    }

    /// Parses the body, handing every unit to `on_unit`.
    ///
    /// On success the callback has seen every record followed by exactly one
    /// [`ParseUnit::Final`]. On failure no final unit is emitted; records
    /// already delivered stand. An error returned by the callback aborts the
    /// parse and is returned unchanged.
    pub fn parse<F>(mut self, mut on_unit: F) -> CodecResult<ParseSummary>
    where
        F: FnMut(ParseUnit) -> CodecResult<()>,
    {
        self.scanner.expect(b'{', "object start delimiter")?;

        let mut continuation = Continuation::default();
        let mut records = 0u64;

        if self.scanner.peek_token()? == Some(b'}') {
            self.scanner.next_token()?;
        } else {
            loop {
                let name = self.member_name()?;
                self.scanner.expect(b':', "member separator")?;

                if name == self.fields.collection {
                    records += self.parse_collection(records, &mut on_unit)?;
                } else if name == self.fields.delta_link {
                    continuation.delta_link = self.link(&name)?;
                } else if name == self.fields.next_link {
                    continuation.next_link = self.link(&name)?;
                } else {
                    self.scanner.scan_value(Sink::Discard)?;
                }

                match self.scanner.next_token()? {
                    Some(b',') => continue,
                    Some(b'}') => break,
                    Some(byte) => {
                        return Err(CodecError::malformed(format!(
                            "object end delimiter not found: unexpected '{}' at offset {}",
                            char::from(byte),
                            self.scanner.offset() - 1
                        )))
                    }
                    None => {
                        return Err(CodecError::malformed(
                            "object end delimiter not found: unexpected end of input",
                        ))
                    }
                }
            }
        }

        on_unit(ParseUnit::Final(continuation))?;

        Ok(ParseSummary {
            records,
            bytes: self.scanner.offset(),
        })
    }

    /// Parses the collection array. `first_index` continues the numbering
    /// if the collection member appears more than once.
    fn parse_collection<F>(&mut self, first_index: u64, on_unit: &mut F) -> CodecResult<u64>
    where
        F: FnMut(ParseUnit) -> CodecResult<()>,
    {
        self.scanner.expect(b'[', "array start delimiter")?;

        if self.scanner.peek_token()? == Some(b']') {
            self.scanner.next_token()?;
            return Ok(0);
        }

        let mut count = 0u64;
        loop {
            self.scratch.clear();
            self.scanner.scan_value(Sink::Keep(&mut self.scratch))?;

            let index = first_index + count;
            let record = Record::from_slice(&self.scratch)
                .map_err(|e| CodecError::record_decode_failed(index, e.to_string()))?;
            on_unit(ParseUnit::Record(record))?;
            count += 1;

            match self.scanner.next_token()? {
                Some(b',') => continue,
                Some(b']') => return Ok(count),
                Some(byte) => {
                    return Err(CodecError::malformed(format!(
                        "array end delimiter not found: unexpected '{}' at offset {}",
                        char::from(byte),
                        self.scanner.offset() - 1
                    )))
                }
                None => {
                    return Err(CodecError::malformed(
                        "array end delimiter not found: unexpected end of input",
                    ))
                }
            }
        }
    }

    fn member_name(&mut self) -> CodecResult<String> {
        if self.scanner.peek_token()? != Some(b'"') {
            return Err(CodecError::malformed(format!(
                "member name not found at offset {}",
                self.scanner.offset()
            )));
        }
        self.scratch.clear();
        self.scanner.scan_value(Sink::Keep(&mut self.scratch))?;
        serde_json::from_slice(&self.scratch)
            .map_err(|e| CodecError::malformed(format!("invalid member name: {e}")))
    }

    /// Reads a link member. `null` and `""` both mean "no link".
    fn link(&mut self, name: &str) -> CodecResult<Option<String>> {
        self.scratch.clear();
        self.scanner.scan_value(Sink::Keep(&mut self.scratch))?;
        let link: Option<String> = serde_json::from_slice(&self.scratch)
            .map_err(|e| CodecError::malformed(format!("{name} must be a string: {e}")))?;
        Ok(link.filter(|l| !l.is_empty()))
    }
}

/// Parses a body held in memory and collects every unit.
pub fn parse_units(body: &[u8], fields: &FieldNames) -> CodecResult<Vec<ParseUnit>> {
    let mut units = Vec::new();
    StreamParser::new(body, fields.clone()).parse(|unit| {
        units.push(unit);
        Ok(())
    })?;
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::io;

    fn units(body: &str) -> CodecResult<Vec<ParseUnit>> {
        parse_units(body.as_bytes(), &FieldNames::default())
    }

    fn records(units: &[ParseUnit]) -> Vec<Record> {
        units
            .iter()
            .filter_map(|u| match u {
                ParseUnit::Record(r) => Some(r.clone()),
                ParseUnit::Final(_) => None,
            })
            .collect()
    }

    fn record(value: serde_json::Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn single_record_with_delta_link() {
        let units = units(r#"{"value":[{"a":1}],"@odata.deltaLink":"T2"}"#).unwrap();
        assert_eq!(
            units,
            vec![
                ParseUnit::Record(record(json!({"a": 1}))),
                ParseUnit::Final(Continuation::delta("T2")),
            ]
        );
    }

    #[test]
    fn empty_collection_yields_only_final() {
        let plain = units(r#"{"value":[]}"#).unwrap();
        assert_eq!(plain, vec![ParseUnit::Final(Continuation::default())]);

        let spaced = units(r#"{ "value" : [ ] , "@odata.deltaLink" : "D" }"#).unwrap();
        assert_eq!(spaced, vec![ParseUnit::Final(Continuation::delta("D"))]);
    }

    #[test]
    fn empty_object_yields_only_final() {
        let units = units("{}").unwrap();
        assert_eq!(units, vec![ParseUnit::Final(Continuation::default())]);
    }

    #[test]
    fn next_link_is_captured() {
        let units =
            units(r#"{"@odata.context":"$metadata#X","value":[{"a":1},{"a":2}],"@odata.nextLink":"/p2"}"#)
                .unwrap();
        assert_eq!(units.len(), 3);
        assert_eq!(units[2], ParseUnit::Final(Continuation::next("/p2")));
    }

    #[test]
    fn link_before_collection_is_honoured() {
        let units = units(r#"{"@odata.deltaLink":"T9","value":[{"a":1}]}"#).unwrap();
        assert_eq!(units.last(), Some(&ParseUnit::Final(Continuation::delta("T9"))));
    }

    #[test]
    fn null_link_means_absent() {
        let units = units(r#"{"value":[],"@odata.deltaLink":null}"#).unwrap();
        assert_eq!(units, vec![ParseUnit::Final(Continuation::default())]);
    }

    #[test]
    fn non_string_link_is_malformed() {
        let err = units(r#"{"value":[],"@odata.deltaLink":5}"#).unwrap_err();
        assert!(matches!(err, CodecError::MalformedStructure { .. }));
    }

    #[test]
    fn unknown_nested_members_are_skipped() {
        let body = r#"{
            "@odata.context": "$metadata#TransactionLogEntries",
            "meta": {"nested": [1, {"deep": ["]", "}"]}], "flag": true},
            "value": [{"ID": 1, "Tuple": ["a", "b"]}],
            "count": -3.5e2,
            "@odata.deltaLink": "TransactionLogEntries/!delta('42')"
        }"#;
        let units = units(body).unwrap();
        assert_eq!(records(&units), vec![record(json!({"ID": 1, "Tuple": ["a", "b"]}))]);
        assert_eq!(
            units.last(),
            Some(&ParseUnit::Final(Continuation::delta(
                "TransactionLogEntries/!delta('42')"
            )))
        );
    }

    #[test]
    fn bare_word_in_skipped_member_is_malformed() {
        let err = units(r#"{"x": abc, "value": []}"#).unwrap_err();
        assert!(matches!(err, CodecError::MalformedStructure { .. }));
        assert!(err.to_string().contains("invalid literal 'abc'"));
    }

    #[test]
    fn missing_object_start_is_malformed() {
        let err = units(r#"["value"]"#).unwrap_err();
        assert!(err.to_string().contains("object start delimiter not found"));
        let err = units("").unwrap_err();
        assert!(matches!(err, CodecError::MalformedStructure { .. }));
    }

    #[test]
    fn collection_must_be_an_array() {
        let err = units(r#"{"value":{"a":1}}"#).unwrap_err();
        assert!(err.to_string().contains("array start delimiter not found"));
    }

    #[test]
    fn truncated_body_is_malformed_without_final() {
        let mut seen = Vec::new();
        let err = StreamParser::new(&br#"{"value": ["#[..], FieldNames::default())
            .parse(|unit| {
                seen.push(unit);
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, CodecError::MalformedStructure { .. }));
        assert!(seen.is_empty());
    }

    #[test]
    fn missing_object_end_is_malformed() {
        let mut finals = 0;
        let err = StreamParser::new(&br#"{"value":[{"a":1}]"#[..], FieldNames::default())
            .parse(|unit| {
                if matches!(unit, ParseUnit::Final(_)) {
                    finals += 1;
                }
                Ok(())
            })
            .unwrap_err();
        assert!(err.to_string().contains("object end delimiter not found"));
        assert_eq!(finals, 0);
    }

    #[test]
    fn non_object_element_fails_after_earlier_records() {
        let mut seen = Vec::new();
        let err = StreamParser::new(&br#"{"value":[{"a":1},123,{"a":3}]}"#[..], FieldNames::default())
            .parse(|unit| {
                seen.push(unit);
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, CodecError::RecordDecodeFailed { index: 1, .. }));
        assert_eq!(seen, vec![ParseUnit::Record(record(json!({"a": 1})))]);
    }

    #[test]
    fn callback_error_aborts_parse() {
        let mut calls = 0;
        let err = StreamParser::new(&br#"{"value":[{"a":1},{"a":2}]}"#[..], FieldNames::default())
            .parse(|_| {
                calls += 1;
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink gone").into())
            })
            .unwrap_err();
        assert!(matches!(err, CodecError::TransportInterrupted(_)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn read_error_is_transport_interrupted() {
        struct Failing(usize);
        impl Read for Failing {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let body = br#"{"value":[{"a":1},"#;
                if self.0 >= body.len() {
                    return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
                }
                let n = (body.len() - self.0).min(buf.len());
                buf[..n].copy_from_slice(&body[self.0..self.0 + n]);
                self.0 += n;
                Ok(n)
            }
        }

        let mut seen = 0;
        let err = StreamParser::new(Failing(0), FieldNames::default())
            .parse(|_| {
                seen += 1;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, CodecError::TransportInterrupted(_)));
        assert_eq!(seen, 1);
    }

    #[test]
    fn custom_field_names() {
        let fields = FieldNames::default()
            .with_collection("items")
            .with_delta_link("delta")
            .with_next_link("next");
        let body = br#"{"value":"ignored","items":[{"x":true}],"delta":"D1"}"#;
        let units = parse_units(body, &fields).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1], ParseUnit::Final(Continuation::delta("D1")));
    }

    #[test]
    fn trailing_bytes_are_not_consumed() {
        let body = br#"{"value":[]} garbage"#;
        let summary = StreamParser::new(&body[..], FieldNames::default())
            .parse(|_| Ok(()))
            .unwrap();
        assert_eq!(summary.bytes, 12);
        assert_eq!(summary.records, 0);
    }

    fn record_strategy() -> impl Strategy<Value = Record> {
        let leaf = prop_oneof![
            Just(json!(null)),
            any::<bool>().prop_map(|b| json!(b)),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-zA-Z0-9 \\[\\]{}\",:\\\\]{0,12}".prop_map(|s| json!(s)),
        ];
        prop::collection::vec(("[A-Za-z]{1,8}", leaf), 0..6).prop_map(|pairs| {
            let mut record = Record::new();
            for (key, value) in pairs {
                record.insert(key, value);
            }
            record
        })
    }

    proptest! {
        #[test]
        fn records_arrive_in_source_order(input in prop::collection::vec(record_strategy(), 0..20)) {
            let body = serde_json::to_vec(&json!({
                "@odata.context": "ctx",
                "value": input,
                "@odata.deltaLink": "next-poll",
            }))
            .unwrap();

            let units = parse_units(&body, &FieldNames::default()).unwrap();
            let finals = units.iter().filter(|u| matches!(u, ParseUnit::Final(_))).count();

            prop_assert_eq!(finals, 1);
            prop_assert!(matches!(units.last(), Some(ParseUnit::Final(_))));
            prop_assert_eq!(records(&units), input);
        }

        #[test]
        fn reframing_is_idempotent(input in prop::collection::vec(record_strategy(), 1..10)) {
            let body = serde_json::to_vec(&json!({ "value": input })).unwrap();
            let first = records(&parse_units(&body, &FieldNames::default()).unwrap());

            let reframed = serde_json::to_vec(&json!({ "value": first })).unwrap();
            let second = records(&parse_units(&reframed, &FieldNames::default()).unwrap());

            prop_assert_eq!(first, second);
        }
    }
}

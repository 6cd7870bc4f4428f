//! Fuzz harnesses for the stream parser.
//!
//! Usable from cargo-fuzz targets or proptest.

use crate::fixtures::ChunkedReader;
use deltaflow_codec::{parse_units, FieldNames, ParseUnit, StreamParser};

/// Parses arbitrary bytes. Must return an error or units, never panic.
pub fn fuzz_parse(data: &[u8]) {
    let _ = parse_units(data, &FieldNames::default());
}

/// Parses `data` whole and in `chunk`-sized reads and checks the results agree.
pub fn fuzz_parse_chunked(data: &[u8], chunk: usize) {
    let fields = FieldNames::default();
    let whole = parse_units(data, &fields);

    let mut units = Vec::new();
    let chunked = StreamParser::new(ChunkedReader::new(data, chunk), fields).parse(|unit| {
        units.push(unit);
        Ok(())
    });

    match (whole, chunked) {
        (Ok(expected), Ok(_)) => assert_eq!(expected, units, "chunking changed the parse"),
        (Err(_), Err(_)) => {}
        (whole, chunked) => panic!(
            "whole and chunked parses disagree: {:?} vs {:?}",
            whole.map(|u| u.len()),
            chunked.map(|s| s.records)
        ),
    }

    if let Some(last) = units.last() {
        let finals = units
            .iter()
            .filter(|u| matches!(u, ParseUnit::Final(_)))
            .count();
        assert!(finals <= 1, "more than one final unit");
        if finals == 1 {
            assert!(matches!(last, ParseUnit::Final(_)), "final unit was not last");
        }
    }
}

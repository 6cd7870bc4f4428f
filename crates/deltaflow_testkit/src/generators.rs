//! Property-based test generators using proptest.
//!
//! Provides strategies for records, links and whole collection pages,
//! including members of arbitrary shape that a parser must skip.

use crate::fixtures::collection_body;
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for scalar JSON values, including strings with escapes.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        (-1_000_000i32..1_000_000).prop_map(|n| Value::from(f64::from(n) / 4.0)),
        "[ -~]{0,12}".prop_map(Value::from),
        r#"[\[\]{}",:\\a-z]{0,8}"#.prop_map(Value::from),
        "\\PC{0,6}".prop_map(Value::from),
    ]
}

/// Strategy for nested JSON values up to a small depth.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z@.]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Strategy for a single record: a JSON object.
pub fn record_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[A-Za-z][A-Za-z0-9]{0,7}", value_strategy(), 0..6)
        .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>()))
}

/// Strategy for a list of records.
pub fn records_strategy(max: usize) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(record_strategy(), 0..max)
}

/// Strategy for an optional continuation link.
pub fn link_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[A-Za-z0-9/?$=!()'_.-]{1,40}")
}

/// A generated collection page with the values it was built from.
#[derive(Debug, Clone)]
pub struct GeneratedPage {
    /// Records in the collection.
    pub records: Vec<Value>,
    /// Next-link, if any.
    pub next_link: Option<String>,
    /// Delta-link, if any.
    pub delta_link: Option<String>,
    /// Serialized body.
    pub body: String,
}

/// Strategy for whole collection pages.
pub fn page_strategy(max_records: usize) -> impl Strategy<Value = GeneratedPage> {
    (records_strategy(max_records), link_strategy(), link_strategy()).prop_map(
        |(records, next_link, delta_link)| {
            let body = collection_body(&records, next_link.as_deref(), delta_link.as_deref());
            GeneratedPage {
                records,
                next_link,
                delta_link,
                body,
            }
        },
    )
}

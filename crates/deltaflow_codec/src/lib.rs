//! # deltaflow Codec
//!
//! Incremental parser for change-tracked OData collection bodies.
//!
//! This crate provides:
//! - A streaming parser that emits collection elements as they arrive
//! - Recognition of next-link and delta-link continuation members
//! - Structural skipping of unrelated members of any shape
//!
//! ## Parse Contract
//!
//! - Records are delivered in exactly the order they appear in the body
//! - Exactly one final unit is emitted per successful parse, after all records
//! - A failed parse never emits a final unit
//! - Memory use is bounded by the largest single record
//!
//! ## Usage
//!
//! ```
//! use deltaflow_codec::{parse_units, FieldNames, NextStep, ParseUnit};
//!
//! let body = br#"{"value":[{"ID":1},{"ID":2}],"@odata.nextLink":"/p2"}"#;
//! let units = parse_units(body, &FieldNames::default()).unwrap();
//!
//! assert_eq!(units.len(), 3);
//! if let ParseUnit::Final(continuation) = &units[2] {
//!     assert_eq!(continuation.next_step(), NextStep::NextPage("/p2"));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod continuation;
mod error;
mod parser;
mod record;
mod scanner;

pub use continuation::{
    Continuation, FieldNames, NextStep, DEFAULT_COLLECTION_FIELD, DEFAULT_DELTA_LINK_FIELD,
    DEFAULT_NEXT_LINK_FIELD,
};
pub use error::{CodecError, CodecResult};
pub use parser::{parse_units, ParseSummary, ParseUnit, StreamParser};
pub use record::Record;

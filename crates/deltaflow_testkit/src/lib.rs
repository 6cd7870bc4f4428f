//! # deltaflow Testkit
//!
//! Test utilities for deltaflow.
//!
//! This crate provides:
//! - Response body builders for collection pages
//! - Readers that deliver bodies in small chunks
//! - Property-based test generators using proptest
//! - Fuzz harnesses for the stream parser
//!
//! ## Usage
//!
//! ```rust
//! use deltaflow_testkit::prelude::*;
//! use serde_json::json;
//!
//! let body = collection_body(&[json!({"ID": 1})], None, Some("T2"));
//! assert!(body.contains("@odata.deltaLink"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod fuzz;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::fuzz::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;

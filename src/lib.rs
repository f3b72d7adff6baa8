//! # Tabular
//!
//! Tabular queries over hierarchical regional statistics, compiled to
//! document-store filters and shaped into CSV, TSV or JSON tables.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        URL query string  (?data=12411:BEVSTD&...)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [query + schema::validate]
//! ┌─────────────────────────────────────────────────────────┐
//! │     CanonicalQuery  (render key, data key)               │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [cache: render key? data key?]
//! ┌─────────────────────────────────────────────────────────┐
//! │     Filter (bool must / must_not / should)               │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [store]
//! ┌─────────────────────────────────────────────────────────┐
//! │     Facts → LongTable (base) → Frame                     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [table]
//! ┌─────────────────────────────────────────────────────────┐
//! │     CSV / TSV / JSON                                     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The schema index and name-list are loaded once and shared read-only;
//! [`service::Service`] ties the stages together per request.

pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod query;
pub mod schema;
pub mod service;
pub mod store;
pub mod table;

pub use error::{TabularError, TabularResult, ValidationError};
pub use query::CanonicalQuery;
pub use schema::{NameList, Schema};
pub use service::{CacheOutcome, ErrorResponse, Response, Service};

//! Capstone project assessment: registration, examiner mark intake, and
//! weighted grade aggregation over an append-only SQLite workspace.
//!
//! The aggregation engine ([`calc::aggregate`]), the ID normalizer
//! ([`ids::normalize_id`]) and the rubric catalog ([`rubric::RubricCatalog`])
//! are pure and usable without the daemon. [`ipc`] is the JSON-line request
//! surface driven by `main`.

pub mod calc;
pub mod config;
pub mod db;
pub mod error;
pub mod ids;
pub mod intake;
pub mod ipc;
pub mod logging;
pub mod registration;
pub mod rubric;
pub mod store;

pub use calc::{aggregate, AggregateResult, MarkRecord};
pub use error::GradeError;
pub use ids::{normalize_id, normalize_id_str};
pub use rubric::{RubricCatalog, StageDefinition, Track};

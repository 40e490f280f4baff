//! DetectLab common types, IDs, and errors.
//!
//! Foundational types shared across the dl-* crates:
//! - Run identity
//! - Common error types with stable codes
//! - Output formats

pub mod error;
pub mod id;
pub mod output;

pub use error::{Error, ErrorCategory, Result, StructuredError};
pub use id::RunId;
pub use output::OutputFormat;

/// Schema version of the evaluation result tree.
pub const SCHEMA_VERSION: &str = "1.0.0";

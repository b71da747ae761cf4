//! Pipeforge - formulas over CSV sources with unknown headers
//!
//! This library resolves free-form formula tokens (`checking.fee`) against
//! the headers of loosely structured delimited text, binds them row by row,
//! evaluates one accumulated expression per group and computes descriptive
//! statistics for every numeric field.
//!
//! # Features
//!
//! - Lenient CSV parsing with quoted fields and numeric coercion
//! - Header resolution by Porter-style stemming and a synonym library
//! - Conditional `{{ }}` blocks with truth propagation, `tally` and `units`
//! - Built-in and declarative (YAML) function libraries
//! - Field analytics: σ-bands, mode, convex probability model
//!
//! # Example
//!
//! ```no_run
//! use pipeforge::core::{execute, RunRequest};
//!
//! # async fn demo() -> pipeforge::error::PipeResult<()> {
//! let request = RunRequest::new("{{ checking.balance > 1000 }} * checking.fee", "account")
//!     .with_source_path("checking", "data/checking.csv");
//! let output = execute(request).await?;
//!
//! for (group, result) in &output.results {
//!     println!("{}: {} ({} addends)", group, result.result, result.tally);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cli;
pub mod core;
pub mod error;
pub mod mapping;
pub mod parser;
pub mod pipes;
pub mod report;
pub mod resolver;
pub mod types;

// Re-export commonly used types
pub use error::{PipeError, PipeResult};
pub use types::{Cell, PresentationColumn, PresentationConfig, Record, SourceTable};

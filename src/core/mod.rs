//! Core pipeline: analytics, binding, classification, the expression engine,
//! function libraries and the run driver

pub mod analytics;
pub mod binding;
pub mod classify;
pub mod engine;
pub mod library;
pub mod run;

pub use analytics::{compute_analytics, AnalyticsReport, ConvexParams, FieldAnalytics};
pub use binding::{Binder, GroupResult, PresentationValues};
pub use engine::{Evaluation, ExpressionEngine};
pub use library::{FunctionLibrary, LibrarySet};
pub use run::{execute, run_tables, RunOutput, RunRequest, SourceSpec};

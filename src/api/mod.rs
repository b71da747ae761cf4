//! Pipeforge API server module
//!
//! HTTP surface for collaborators that hold source text in memory.
//! Run with `pipeforge-server`.

pub mod handlers;
pub mod server;

pub use server::{router, run_api_server};

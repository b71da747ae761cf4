//! CLI command handlers

pub mod commands;

pub use commands::{analyze, classify, eval, init_logging, pipes, resolve, run, stem_words};

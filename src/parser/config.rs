//! Run-file loading
//!
//! A run file describes one formula run: the formula, the group-by field, the
//! presentation columns, where each source lives, user inputs and libraries.
//! YAML is the native format; JSON parses as well since it is a YAML subset.

use crate::core::analytics::ConvexParams;
use crate::error::{PipeError, PipeResult};
use crate::types::PresentationConfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A parsed run file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Formula text with `{{ }}` blocks and `source.field` references
    pub formula: String,

    /// Field whose value buckets rows into groups
    #[serde(alias = "groupBy")]
    pub group_by: String,

    #[serde(default)]
    pub presentation: PresentationConfig,

    /// Source name -> file path (relative paths resolve against the run file)
    #[serde(default)]
    pub sources: IndexMap<String, String>,

    /// Input name -> value
    #[serde(default)]
    pub inputs: IndexMap<String, serde_yaml::Value>,

    /// Built-in library names or declarative library file paths
    #[serde(default)]
    pub libraries: Vec<String>,

    #[serde(default)]
    pub convex: ConvexParams,
}

impl RunConfig {
    /// Parse run-file text
    pub fn parse(content: &str) -> PipeResult<Self> {
        let config: RunConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> PipeResult<()> {
        if self.formula.trim().is_empty() {
            return Err(PipeError::Config("formula must not be empty".to_string()));
        }
        if self.group_by.trim().is_empty() {
            return Err(PipeError::Config("group_by must not be empty".to_string()));
        }
        self.convex.validate()?;
        Ok(())
    }

    /// Inputs flattened to text, the way a user would have typed them
    pub fn input_values(&self) -> IndexMap<String, String> {
        self.inputs
            .iter()
            .map(|(name, value)| (name.clone(), scalar_to_string(value)))
            .collect()
    }

    /// Source paths resolved against a base directory
    pub fn source_paths(&self, base_dir: &Path) -> IndexMap<String, PathBuf> {
        self.sources
            .iter()
            .map(|(name, path)| (name.clone(), resolve_path(base_dir, path)))
            .collect()
    }
}

/// Load and validate a run file
pub fn load_run_config(path: &Path) -> PipeResult<RunConfig> {
    let content = std::fs::read_to_string(path)?;
    RunConfig::parse(&content)
}

/// Resolve a possibly relative path against a base directory
pub fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let candidate = PathBuf::from(path);
    if candidate.is_absolute() {
        candidate
    } else {
        base_dir.join(candidate)
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Null => String::new(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

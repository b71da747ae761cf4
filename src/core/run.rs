//! One formula run, end to end: validate pipes, load sources concurrently,
//! compute analytics, bind every row and evaluate each group.

use crate::core::analytics::{compute_analytics, AnalyticsReport, ConvexParams};
use crate::core::binding::{Binder, GroupAccumulator, GroupResult};
use crate::core::engine::ExpressionEngine;
use crate::core::library::LibrarySet;
use crate::error::{PipeError, PipeResult};
use crate::parser::{parse_table, read_table, RunConfig};
use crate::pipes::{extract_pipes, Pipes};
use crate::types::{Cell, PresentationConfig, Record, SourceTable};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;

/// Where a source's delimited text comes from
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    /// Inline text
    Text(String),
    /// A file read on the async runtime
    Path(PathBuf),
}

/// Everything a run needs
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub formula: String,
    pub group_by: String,
    pub presentation: PresentationConfig,
    pub sources: IndexMap<String, SourceSpec>,
    pub inputs: IndexMap<String, String>,
    pub libraries: LibrarySet,
    pub convex: ConvexParams,
    /// Reference instant for date offsets; the wall clock when unset
    pub now: Option<DateTime<Utc>>,
}

impl RunRequest {
    pub fn new(formula: impl Into<String>, group_by: impl Into<String>) -> Self {
        Self {
            formula: formula.into(),
            group_by: group_by.into(),
            presentation: PresentationConfig::default(),
            sources: IndexMap::new(),
            inputs: IndexMap::new(),
            libraries: LibrarySet::new(),
            convex: ConvexParams::default(),
            now: None,
        }
    }

    pub fn with_source_text(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.sources.insert(name.into(), SourceSpec::Text(text.into()));
        self
    }

    pub fn with_source_path(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.sources.insert(name.into(), SourceSpec::Path(path.into()));
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    pub fn with_presentation(mut self, presentation: PresentationConfig) -> Self {
        self.presentation = presentation;
        self
    }

    pub fn with_libraries(mut self, libraries: LibrarySet) -> Self {
        self.libraries = libraries;
        self
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Build a request from a run file; relative paths resolve against `base_dir`
    pub fn from_config(config: &RunConfig, base_dir: &Path) -> PipeResult<Self> {
        let libraries = LibrarySet::from_specs(&config.libraries, base_dir)?;
        Ok(Self {
            formula: config.formula.clone(),
            group_by: config.group_by.clone(),
            presentation: config.presentation.clone(),
            sources: config
                .source_paths(base_dir)
                .into_iter()
                .map(|(name, path)| (name, SourceSpec::Path(path)))
                .collect(),
            inputs: config.input_values(),
            libraries,
            convex: config.convex.clone(),
            now: None,
        })
    }

    pub fn pipes(&self) -> Pipes {
        extract_pipes(&self.formula, Some(&self.presentation))
    }

    /// Fail with the first referenced source or input that was not supplied
    pub fn validate(&self) -> PipeResult<Pipes> {
        let pipes = self.pipes();
        if let Some(missing) = pipes.sources.iter().find(|s| !self.sources.contains_key(*s)) {
            return Err(PipeError::MissingInput(format!(
                "source '{}' is referenced but not supplied",
                missing
            )));
        }
        if let Some(missing) = pipes.inputs.iter().find(|i| !self.inputs.contains_key(*i)) {
            return Err(PipeError::MissingInput(format!(
                "input '{}' is referenced but not supplied",
                missing
            )));
        }
        self.convex.validate()?;
        Ok(pipes)
    }

    fn input_record(&self) -> Record {
        self.inputs
            .iter()
            .map(|(name, value)| (name.clone(), Cell::from_field(value.trim())))
            .collect()
    }
}

/// Result of a run: per-group results plus per-source analytics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub results: IndexMap<String, GroupResult>,
    pub analytics: AnalyticsReport,
}

/// Load every supplied source concurrently. Any failure fails the whole load.
pub async fn load_sources(sources: &IndexMap<String, SourceSpec>) -> PipeResult<Vec<SourceTable>> {
    let mut set = JoinSet::new();
    for (idx, (name, spec)) in sources.iter().enumerate() {
        let name = name.clone();
        let spec = spec.clone();
        set.spawn(async move {
            let table = match spec {
                SourceSpec::Text(text) => Ok(parse_table(&name, &text)),
                SourceSpec::Path(path) => read_table(name.clone(), path.clone()).await.map_err(|e| {
                    tracing::warn!(source = %name, path = %path.display(), error = %e, "source read failed");
                    e
                }),
            };
            (idx, table)
        });
    }

    let mut loaded: Vec<Option<SourceTable>> = vec![None; sources.len()];
    while let Some(joined) = set.join_next().await {
        let (idx, table) = joined.map_err(|e| PipeError::Io(std::io::Error::other(e)))?;
        loaded[idx] = Some(table?);
    }
    Ok(loaded.into_iter().flatten().collect())
}

/// Validate, then bind and evaluate against already loaded tables
pub fn run_tables(request: &RunRequest, tables: &[SourceTable]) -> PipeResult<RunOutput> {
    let pipes = request.validate()?;
    run_validated(request, &pipes, tables)
}

fn run_validated(request: &RunRequest, pipes: &Pipes, tables: &[SourceTable]) -> PipeResult<RunOutput> {
    let analytics = compute_analytics(tables, &request.convex);

    let mut engine = ExpressionEngine::new();
    if let Some(now) = request.now {
        engine = engine.with_now(now);
    }
    let inputs = request.input_record();

    let binder = Binder {
        libraries: &request.libraries,
        analytics: &analytics,
        engine: &engine,
        inputs: &inputs,
        presentation: &request.presentation,
        group_by: &request.group_by,
    };

    let mut groups: IndexMap<String, GroupAccumulator> = IndexMap::new();
    if pipes.sources.is_empty() {
        binder.accumulate_inputs(&request.formula, &mut groups)?;
    }
    for source in &pipes.sources {
        match tables.iter().find(|t| &t.name == source) {
            Some(table) => binder.accumulate_table(&request.formula, table, &mut groups)?,
            None => {
                return Err(PipeError::MissingInput(format!(
                    "source '{}' is referenced but not loaded",
                    source
                )))
            }
        }
    }

    let results: IndexMap<String, GroupResult> = groups
        .iter()
        .map(|(key, group)| (key.clone(), group.finalize(&engine)))
        .collect();

    tracing::info!(
        sources = pipes.sources.len(),
        groups = results.len(),
        "run complete"
    );
    Ok(RunOutput { results, analytics })
}

/// Validate, load and run
pub async fn execute(request: RunRequest) -> PipeResult<RunOutput> {
    let pipes = request.validate()?;
    let tables = load_sources(&request.sources).await?;
    run_validated(&request, &pipes, &tables)
}

//! Pipe extraction: a static scan of formula text for referenced sources and
//! user inputs.

use crate::types::PresentationConfig;
use indexmap::IndexSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Name of the pseudo-source that carries user inputs
pub const INPUT_SOURCE: &str = "input";

/// Sources and inputs referenced by a formula, in first-appearance order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipes {
    pub sources: Vec<String>,
    pub inputs: Vec<String>,
}

fn source_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Za-z_]\w*)\.\w+").expect("valid source regex"))
}

fn input_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\binput\.\w+\(([^)]*)\)").expect("valid input regex"))
}

/// Extract referenced sources and inputs.
///
/// Every `name.token` whose left side is not `input` names a source.
/// Each argument of `input.fn(a, b)` names an input. Presentation fields
/// of the form `source.column` also contribute their source.
pub fn extract_pipes(formula: &str, presentation: Option<&PresentationConfig>) -> Pipes {
    let mut sources: IndexSet<String> = IndexSet::new();
    let mut inputs: IndexSet<String> = IndexSet::new();

    for caps in source_regex().captures_iter(formula) {
        let name = &caps[1];
        if name != INPUT_SOURCE {
            sources.insert(name.to_string());
        }
    }

    for caps in input_regex().captures_iter(formula) {
        for arg in caps[1].split(',').map(str::trim) {
            if !arg.is_empty() {
                inputs.insert(arg.to_string());
            }
        }
    }

    if let Some(presentation) = presentation {
        for column in &presentation.columns {
            if let Some((source, _)) = column.field.split_once('.') {
                sources.insert(source.to_string());
            }
        }
    }

    Pipes {
        sources: sources.into_iter().collect(),
        inputs: inputs.into_iter().collect(),
    }
}

//! Declarative library files
//!
//! ```yaml
//! name: fees
//! functions:
//!   monthlyFee:
//!     params: [balance, "rate = 0.02"]
//!     expression: "balance * rate"
//! ```
//!
//! The library name defaults to the file name without extension.

use super::{FunctionDef, FunctionLibrary};
use crate::error::{PipeError, PipeResult};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct LibraryFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    functions: IndexMap<String, FunctionFile>,
}

#[derive(Debug, Deserialize)]
struct FunctionFile {
    #[serde(default)]
    params: Vec<String>,
    expression: String,
}

/// Parse library text; `fallback_name` is used when the file names none
pub fn parse_library(content: &str, fallback_name: &str) -> PipeResult<FunctionLibrary> {
    let file: LibraryFile = serde_yaml::from_str(content)?;
    let name = file.name.unwrap_or_else(|| fallback_name.to_string());

    let mut library = FunctionLibrary::new(name);
    for (fn_name, def) in file.functions {
        if def.expression.trim().is_empty() {
            return Err(PipeError::Library(format!(
                "function '{}' in library '{}' has an empty expression",
                fn_name, library.name
            )));
        }
        library = library.with_function(FunctionDef::expression(&fn_name, &def.params, def.expression));
    }

    if library.functions.is_empty() {
        tracing::warn!(library = %library.name, "library declares no functions");
    }
    Ok(library)
}

/// Load a library file
pub fn load_library(path: &Path) -> PipeResult<FunctionLibrary> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PipeError::Library(format!("cannot read library '{}': {}", path.display(), e))
    })?;
    let fallback = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    parse_library(&content, &fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FEES: &str = r#"
functions:
  monthlyFee:
    params: [balance, "rate = 0.02"]
    expression: "balance * rate"
  flat:
    expression: "5"
"#;

    #[test]
    fn test_parse_library() {
        let lib = parse_library(FEES, "fees").unwrap();
        assert_eq!(lib.name, "fees");
        let fee = lib.get("monthlyFee").unwrap();
        assert_eq!(fee.params.len(), 2);
        assert!(!fee.params[0].optional);
        assert!(fee.params[1].optional);
        assert!(lib.get("flat").unwrap().params.is_empty());
    }

    #[test]
    fn test_empty_expression_rejected() {
        let result = parse_library("functions:\n  bad:\n    expression: ' '\n", "x");
        assert!(matches!(result, Err(PipeError::Library(_))));
    }

    #[test]
    fn test_load_library_names_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(FEES.as_bytes()).unwrap();
        let lib = load_library(file.path()).unwrap();
        let expected = file.path().file_stem().unwrap().to_string_lossy().into_owned();
        assert_eq!(lib.name, expected);
    }

    #[test]
    fn test_missing_file() {
        let result = load_library(Path::new("/nonexistent/lib.yaml"));
        assert!(matches!(result, Err(PipeError::Library(_))));
    }
}

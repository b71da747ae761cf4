//! Function libraries
//!
//! A formula token like `checking.interestIncome` is bound to a library
//! function when some loaded library declares a function of exactly that
//! name. Each function carries an explicit parameter schema; the binding
//! layer resolves every parameter name against the current row's headers.

pub mod builtins;
pub mod declarative;

use crate::core::analytics::AnalyticsReport;
use crate::core::engine::{ExpressionEngine, Value};
use crate::error::{PipeError, PipeResult};
use indexmap::IndexMap;
use std::path::Path;

/// Name of the implicit parameter carrying the current source name
pub const SOURCE_PARAM: &str = "source";

/// One declared parameter: `name` or `name = default`
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub optional: bool,
    pub default: Option<String>,
}

impl ParamSpec {
    /// Classify a declaration syntactically: a default makes it optional
    pub fn parse(declaration: &str) -> Self {
        match declaration.split_once('=') {
            Some((name, default)) => Self {
                name: name.trim().to_string(),
                optional: true,
                default: Some(default.trim().to_string()).filter(|d| !d.is_empty()),
            },
            None => Self {
                name: declaration.trim().to_string(),
                optional: false,
                default: None,
            },
        }
    }

    pub fn is_source(&self) -> bool {
        self.name == SOURCE_PARAM
    }

    /// Default value, numeric when it reads as a number
    pub fn default_value(&self) -> Option<Value> {
        self.default.as_deref().map(literal_value)
    }
}

/// Read a literal the way a default or a user input is typed
pub fn literal_value(text: &str) -> Value {
    let trimmed = text.trim().trim_matches(|c| c == '"' || c == '\'');
    if crate::types::is_numeric_text(trimmed) {
        if let Ok(n) = trimmed.parse() {
            return Value::Number(n);
        }
    }
    match trimmed {
        "true" => Value::Boolean(true),
        "false" => Value::Boolean(false),
        "null" => Value::Null,
        other => Value::Text(other.to_string()),
    }
}

/// Run-scoped context handed to every function call
pub struct CallContext<'a> {
    /// Source whose row is being bound
    pub source: &'a str,
    pub analytics: &'a AnalyticsReport,
    pub engine: &'a ExpressionEngine,
}

/// Bound argument values by parameter name; absent optionals are missing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionArgs {
    values: IndexMap<String, Value>,
}

impl FunctionArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Numeric coercion of a present argument
    pub fn number(&self, name: &str) -> PipeResult<f64> {
        self.get(name).map(Value::as_number).ok_or_else(|| {
            PipeError::InvalidParameter(format!("missing argument '{}'", name))
        })
    }

    /// An argument that must already be a number
    pub fn strict_number(&self, name: &str) -> PipeResult<f64> {
        match self.get(name) {
            Some(Value::Number(n)) if n.is_finite() => Ok(*n),
            Some(other) => Err(PipeError::InvalidParameter(format!(
                "'{}' must be a number, got {}",
                name,
                other.as_text()
            ))),
            None => Err(PipeError::InvalidParameter(format!(
                "missing argument '{}'",
                name
            ))),
        }
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).map(Value::as_text)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

pub type NativeFn = fn(&CallContext, &FunctionArgs) -> PipeResult<Value>;

#[derive(Clone)]
pub enum Implementation {
    Native(NativeFn),
    /// Expression body evaluated with parameters bound as scalars
    Expression(String),
}

impl std::fmt::Debug for Implementation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Implementation::Native(_) => write!(f, "Native"),
            Implementation::Expression(body) => write!(f, "Expression({:?})", body),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<ParamSpec>,
    pub implementation: Implementation,
}

impl FunctionDef {
    pub fn native(name: &str, params: &[&str], f: NativeFn) -> Self {
        Self {
            name: name.to_string(),
            params: params.iter().map(|p| ParamSpec::parse(p)).collect(),
            implementation: Implementation::Native(f),
        }
    }

    pub fn expression(name: &str, params: &[String], body: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            params: params.iter().map(|p| ParamSpec::parse(p)).collect(),
            implementation: Implementation::Expression(body.into()),
        }
    }

    /// Parameters other than the implicit `source`
    pub fn row_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(|p| !p.is_source())
    }

    pub fn call(&self, ctx: &CallContext, args: &FunctionArgs) -> PipeResult<Value> {
        match &self.implementation {
            Implementation::Native(f) => f(ctx, args),
            Implementation::Expression(body) => {
                let mut scalars: Vec<(String, Value)> = self
                    .row_params()
                    .map(|p| {
                        let value = args.get(&p.name).cloned().unwrap_or(Value::Null);
                        (p.name.clone(), value)
                    })
                    .collect();
                scalars.push((SOURCE_PARAM.to_string(), Value::Text(ctx.source.to_string())));
                ctx.engine.evaluate_value(body, scalars).map_err(|e| {
                    PipeError::Library(format!("function '{}' failed: {}", self.name, e))
                })
            }
        }
    }
}

/// A named set of functions
#[derive(Debug, Clone)]
pub struct FunctionLibrary {
    pub name: String,
    pub functions: IndexMap<String, FunctionDef>,
}

impl FunctionLibrary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: IndexMap::new(),
        }
    }

    pub fn with_function(mut self, function: FunctionDef) -> Self {
        self.functions.insert(function.name.clone(), function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name)
    }
}

/// Libraries loaded for one run, searched in load order
#[derive(Debug, Clone, Default)]
pub struct LibrarySet {
    libraries: Vec<FunctionLibrary>,
}

impl LibrarySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, library: FunctionLibrary) {
        tracing::debug!(library = %library.name, functions = library.functions.len(), "library loaded");
        self.libraries.push(library);
    }

    /// Load a built-in library by name, or a declarative library file
    pub fn load(&mut self, spec: &str, base_dir: &Path) -> PipeResult<()> {
        let library = match builtins::builtin(spec) {
            Some(library) => library,
            None => declarative::load_library(&crate::parser::config::resolve_path(base_dir, spec))?,
        };
        self.add(library);
        Ok(())
    }

    /// Load every library spec in order
    pub fn from_specs(specs: &[String], base_dir: &Path) -> PipeResult<Self> {
        let mut set = Self::new();
        for spec in specs {
            set.load(spec, base_dir)?;
        }
        Ok(set)
    }

    /// First function with exactly this name across libraries
    pub fn find(&self, name: &str) -> Option<&FunctionDef> {
        self.libraries.iter().find_map(|lib| lib.get(name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.libraries.iter().map(|l| l.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

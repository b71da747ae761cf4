//! API request handlers

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::analytics::{analyze_table, ConvexParams, SourceAnalytics};
use crate::core::engine::{Evaluation, ExpressionEngine};
use crate::core::library::{builtins, LibrarySet};
use crate::core::run::{execute, RunOutput, RunRequest};
use crate::error::{PipeError, PipeResult};
use crate::parser::parse_table;
use crate::resolver::{resolve_header, synonym_keys};
use crate::types::PresentationConfig;

use super::server::AppState;

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4().to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            request_id: Uuid::new_v4().to_string(),
            data: None,
            error: Some(message.into()),
        }
    }
}

fn status_for(error: &PipeError) -> StatusCode {
    match error {
        PipeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn respond<T: Serialize>(result: PipeResult<T>) -> Response {
    match result {
        Ok(data) => Json(ApiResponse::ok(data)).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "request failed");
            (status_for(&e), Json(ApiResponse::<T>::err(e.to_string()))).into_response()
        }
    }
}

/// Root endpoint response
#[derive(Serialize)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Serialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

fn endpoint(method: &str, path: &str, description: &str) -> EndpointInfo {
    EndpointInfo {
        path: path.to_string(),
        method: method.to_string(),
        description: description.to_string(),
    }
}

/// GET / - Root info
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(RootResponse {
        name: "Pipeforge API Server".to_string(),
        version: state.version.clone(),
        description: "Formulas over CSV sources with unknown headers".to_string(),
        endpoints: vec![
            endpoint("GET", "/health", "Health check endpoint"),
            endpoint("GET", "/version", "Get server version"),
            endpoint("POST", "/api/v1/run", "Run a formula over inline sources"),
            endpoint("POST", "/api/v1/analyze", "Field analytics of one source"),
            endpoint("POST", "/api/v1/resolve", "Resolve a token against headers"),
            endpoint("POST", "/api/v1/evaluate", "Evaluate a bound expression"),
        ],
    }))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /health - Health check
pub async fn health() -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
    }))
}

/// Version response
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub libraries: Vec<String>,
}

/// GET /version - Server version
pub async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(VersionResponse {
        version: state.version.clone(),
        libraries: vec![builtins::FINANCIAL.to_string(), builtins::AI.to_string()],
    }))
}

/// Run request: sources carry raw CSV text
#[derive(Debug, Deserialize)]
pub struct RunApiRequest {
    pub formula: String,
    #[serde(alias = "groupBy")]
    pub group_by: String,
    #[serde(default)]
    pub presentation: PresentationConfig,
    #[serde(default)]
    pub sources: IndexMap<String, String>,
    #[serde(default)]
    pub inputs: IndexMap<String, serde_json::Value>,
    /// Built-in library names only
    #[serde(default)]
    pub libraries: Vec<String>,
    #[serde(default)]
    pub convex: ConvexParams,
}

fn json_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl RunApiRequest {
    fn into_run_request(self) -> PipeResult<RunRequest> {
        let mut libraries = LibrarySet::new();
        for name in &self.libraries {
            let library = builtins::builtin(name).ok_or_else(|| {
                PipeError::Library(format!("unknown built-in library '{}'", name))
            })?;
            libraries.add(library);
        }

        let mut request = RunRequest::new(self.formula, self.group_by)
            .with_presentation(self.presentation)
            .with_libraries(libraries);
        request.convex = self.convex;
        for (name, text) in self.sources {
            request = request.with_source_text(name, text);
        }
        for (name, value) in &self.inputs {
            request = request.with_input(name.clone(), json_scalar(value));
        }
        Ok(request)
    }
}

/// POST /api/v1/run - Run a formula over inline sources
pub async fn run(Json(req): Json<RunApiRequest>) -> Response {
    let result: PipeResult<RunOutput> = match req.into_run_request() {
        Ok(request) => execute(request).await,
        Err(e) => Err(e),
    };
    respond(result)
}

/// Analyze request
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub name: String,
    pub csv: String,
}

/// POST /api/v1/analyze - Field analytics of one source
pub async fn analyze(Json(req): Json<AnalyzeRequest>) -> Response {
    let table = parse_table(&req.name, &req.csv);
    let analytics: SourceAnalytics = analyze_table(&table, &ConvexParams::default());
    respond(Ok(analytics))
}

/// Resolve request
#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub headers: Vec<String>,
    pub token: String,
}

/// Resolve response; `header` is absent when nothing matches
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ResolveResponse {
    pub token: String,
    pub header: Option<String>,
    pub synonym_keys: Vec<String>,
}

/// POST /api/v1/resolve - Resolve a token against headers
pub async fn resolve(Json(req): Json<ResolveRequest>) -> Response {
    let header = resolve_header(&req.headers, &req.token);
    respond(Ok(ResolveResponse {
        synonym_keys: synonym_keys(&req.token)
            .into_iter()
            .map(str::to_string)
            .collect(),
        token: req.token,
        header,
    }))
}

/// Evaluate request
#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub expression: String,
}

/// POST /api/v1/evaluate - Evaluate a bound expression
pub async fn evaluate(Json(req): Json<EvaluateRequest>) -> Response {
    let evaluation: Evaluation = ExpressionEngine::new().evaluate(&req.expression);
    respond(Ok(evaluation))
}

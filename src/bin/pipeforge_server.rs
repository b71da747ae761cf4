//! Pipeforge API server binary

use clap::Parser;
use pipeforge::api::{run_api_server, server::ApiConfig};

#[derive(Parser, Debug)]
#[command(name = "pipeforge-server")]
#[command(version)]
#[command(about = "Pipeforge API Server - HTTP API for formula runs over inline CSV sources")]
#[command(long_about = r#"
Pipeforge API Server

Endpoints:
  - POST /api/v1/run       - Run a formula over inline CSV sources
  - POST /api/v1/analyze   - Field analytics of one CSV source
  - POST /api/v1/resolve   - Resolve a token against a header list
  - POST /api/v1/evaluate  - Evaluate a bound expression
  - GET  /health           - Health check
  - GET  /version          - Server version info
  - GET  /                 - Endpoint list

Example usage:
  pipeforge-server --host 0.0.0.0 --port 3000

  curl -X POST http://localhost:8080/api/v1/evaluate \
    -H "Content-Type: application/json" \
    -d '{"expression": "{{ 1 > 2 }} + {{ 3 > 2 }}"}'
"#)]
struct Args {
    /// Host address to bind to (use 0.0.0.0 for all interfaces)
    #[arg(short = 'H', long, default_value = "127.0.0.1", env = "PIPEFORGE_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "PIPEFORGE_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ApiConfig {
        host: args.host,
        port: args.port,
    };

    run_api_server(config).await
}

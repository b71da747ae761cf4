use clap::{Parser, Subcommand};
use pipeforge::cli;
use pipeforge::error::PipeResult;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pipeforge")]
#[command(about = "Resolve formulas against unknown CSV headers and evaluate them per group.")]
#[command(long_about = "Pipeforge - formulas over CSV sources with unknown headers

A formula references fields as source.token. Each token is matched to a
header of its source by stem, falling back to a synonym library, so
checking.fee finds Late_Charges. Rows are grouped by a field, every row's
bound formula is summed into its group and evaluated once per group.

COMMANDS:
  run       - Execute a run file and print the report
  analyze   - Field analytics for one CSV file
  resolve   - Show which header a token resolves to
  stem      - Show word stems
  pipes     - List the sources and inputs a formula references
  eval      - Evaluate a bound expression
  classify  - Business/consumer classification against a file's analytics

EXAMPLES:
  pipeforge run fees.yaml -s checking=data/checking.csv
  pipeforge resolve fee --headers Account,Late_Charges
  pipeforge eval '{{ 1 > 2 }} + {{ 3 > 2 }}'")]
#[command(version)]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Execute a run file.

The run file (YAML or JSON) names the formula, the group-by field, the
presentation columns, the sources and inputs, and the libraries to load.
Relative paths in the file resolve against the file's directory.

OVERRIDES:
  -s name=path   replace or add a source
  -i name=value  replace or add an input")]
    /// Execute a run file and print the report
    Run {
        /// Path to the run file
        config: PathBuf,

        /// Source override, name=path
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// Input override, name=value
        #[arg(short, long = "input")]
        inputs: Vec<String>,

        /// Print the raw run output as JSON
        #[arg(long)]
        json: bool,

        /// Two-column CSV mapping group keys to labels
        #[arg(long)]
        labels: Option<PathBuf>,
    },

    /// Field analytics for one CSV file
    Analyze {
        /// Path to the CSV file
        file: PathBuf,

        /// Source name (defaults to the file stem)
        #[arg(long)]
        name: Option<String>,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which header a token resolves to
    Resolve {
        /// Field token, with or without a source prefix
        token: String,

        /// Comma-separated header list
        #[arg(long)]
        headers: Option<String>,

        /// CSV file whose header row is used
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show word stems
    Stem {
        #[arg(required = true)]
        words: Vec<String>,
    },

    /// List the sources and inputs a formula references
    Pipes {
        formula: String,

        /// Presentation field, source.column
        #[arg(long = "column")]
        columns: Vec<String>,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluate a bound expression
    Eval {
        expression: String,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Business/consumer classification against a file's balance analytics
    Classify {
        /// Path to the CSV file
        file: PathBuf,

        /// Source name (defaults to the file stem)
        #[arg(long)]
        name: Option<String>,

        #[arg(long, allow_hyphen_values = true)]
        balance: f64,

        #[arg(long)]
        consumer_maximum: f64,

        #[arg(long)]
        annual_deposits: f64,
    },
}

fn main() -> PipeResult<()> {
    let cli = Cli::parse();
    cli::init_logging(cli.verbose)?;

    match cli.command {
        Commands::Run {
            config,
            sources,
            inputs,
            json,
            labels,
        } => cli::run(config, sources, inputs, json, labels),

        Commands::Analyze { file, name, json } => cli::analyze(file, name, json),

        Commands::Resolve {
            token,
            headers,
            file,
        } => cli::resolve(token, headers, file),

        Commands::Stem { words } => cli::stem_words(words),

        Commands::Pipes {
            formula,
            columns,
            json,
        } => cli::pipes(formula, columns, json),

        Commands::Eval { expression, json } => cli::eval(expression, json),

        Commands::Classify {
            file,
            name,
            balance,
            consumer_maximum,
            annual_deposits,
        } => cli::classify(file, name, balance, consumer_maximum, annual_deposits),
    }
}

use crate::core::analytics::{analyze_table, ConvexParams, FieldAnalytics};
use crate::core::classify::{self, Thresholds};
use crate::core::engine::ExpressionEngine;
use crate::core::run::{execute, RunRequest};
use crate::error::{PipeError, PipeResult};
use crate::mapping::label_mapping;
use crate::parser::{self, load_run_config};
use crate::pipes::extract_pipes;
use crate::report::{build_report, format_currency, ColumnKind, Report};
use crate::resolver::{resolve_header, stem, synonym_keys};
use crate::types::{format_number, PresentationColumn, PresentationConfig};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Install the tracing subscriber; `RUST_LOG` wins over `--verbose`
pub fn init_logging(verbose: bool) -> PipeResult<()> {
    let default = if verbose { "pipeforge=debug" } else { "pipeforge=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| PipeError::Config(format!("logging setup failed: {}", e)))
}

/// Split a `name=value` command-line assignment
pub fn parse_assignment(text: &str) -> PipeResult<(String, String)> {
    match text.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(PipeError::InvalidParameter(format!(
            "expected name=value, got '{}'",
            text
        ))),
    }
}

fn source_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "source".to_string())
}

fn print_json<T: serde::Serialize>(value: &T) -> PipeResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//==============================================================================
// run
//==============================================================================

/// Execute the run command
pub fn run(
    config: PathBuf,
    sources: Vec<String>,
    inputs: Vec<String>,
    json: bool,
    labels: Option<PathBuf>,
) -> PipeResult<()> {
    let run_config = load_run_config(&config)?;
    let base_dir = config
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut request = RunRequest::from_config(&run_config, &base_dir)?;
    for assignment in &sources {
        let (name, path) = parse_assignment(assignment)?;
        request = request.with_source_path(name, path);
    }
    for assignment in &inputs {
        let (name, value) = parse_assignment(assignment)?;
        request = request.with_input(name, value);
    }

    if !json {
        println!("{}", "🔥 Pipeforge - Running formula".bold().green());
        println!("   File: {}", config.display());
        println!("   Formula: {}", request.formula.bright_blue());
        println!();
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let presentation = request.presentation.clone();
    let output = runtime.block_on(execute(request))?;

    if json {
        return print_json(&output);
    }

    let label_map = match labels {
        Some(path) => Some(label_mapping(&parser::load_table("labels", &path)?.records)),
        None => None,
    };
    let report = build_report(
        &output.results,
        &presentation,
        &run_config.group_by,
        label_map.as_ref(),
    );
    print_report(&report);
    Ok(())
}

fn print_report(report: &Report) {
    if report.rows.is_empty() {
        println!("{}", "⚠️  No group produced a non-zero result".yellow());
        return;
    }

    let mut header = vec![report.group_heading.clone()];
    header.extend(report.columns.iter().map(|c| c.heading.clone()));
    header.push("Result".to_string());

    let mut body: Vec<Vec<String>> = report
        .rows
        .iter()
        .map(|row| {
            let mut line = vec![row.label.clone()];
            line.extend(row.cells.iter().cloned());
            line.push(format_currency(row.result));
            line
        })
        .collect();

    let mut totals = vec![format!("Total Count: {}", report.totals.tally)];
    totals.extend(
        report
            .totals
            .columns
            .iter()
            .map(|sum| sum.map(format_currency).unwrap_or_default()),
    );
    totals.push(format_currency(report.totals.result));
    body.push(totals);

    let widths: Vec<usize> = (0..header.len())
        .map(|i| {
            body.iter()
                .chain(std::iter::once(&header))
                .map(|line| line.get(i).map_or(0, |s| s.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let render = |line: &[String]| -> String {
        line.iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:<width$}", cell, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
    };

    println!("{}", render(&header).bold().cyan());
    let last = body.len() - 1;
    for (i, line) in body.iter().enumerate() {
        if i == last {
            println!("{}", render(line).bold());
        } else {
            println!("{}", render(line));
        }
    }

    let currency = report
        .columns
        .iter()
        .filter(|c| c.kind == ColumnKind::Currency)
        .count();
    println!(
        "\n{} {} groups, {} currency column(s)",
        "✅".green(),
        report.rows.len(),
        currency
    );
}

//==============================================================================
// analyze
//==============================================================================

/// Execute the analyze command
pub fn analyze(file: PathBuf, name: Option<String>, json: bool) -> PipeResult<()> {
    let name = name.unwrap_or_else(|| source_name(&file));
    let table = parser::load_table(&name, &file)?;
    let analytics = analyze_table(&table, &ConvexParams::default());

    if json {
        return print_json(&analytics);
    }

    println!("{}", "📊 Pipeforge - Field analytics".bold().green());
    println!("   Source: {} ({} rows)\n", name.bright_blue().bold(), table.row_count());

    if analytics.is_empty() {
        println!("{}", "   No numeric fields".yellow());
        return Ok(());
    }
    for (field, stats) in &analytics {
        print_field(field, stats);
    }
    Ok(())
}

fn print_field(field: &str, stats: &FieldAnalytics) {
    println!("   {}", field.cyan().bold());
    println!(
        "      min {}  max {}  mean {}  median {}  mode {}",
        format_number(stats.min),
        format_number(stats.max),
        format_number(stats.mean),
        format_number(stats.median),
        format_number(stats.mode.primary()),
    );
    println!(
        "      σ {}  sum {}  count {}  unique {}  ytd x{}  {:?}",
        format_number(stats.std_deviation),
        format_number(stats.sum),
        stats.count,
        stats.unique,
        stats.ytd_factor,
        stats.format,
    );
    if let Some(probabilities) = &stats.convex_probability {
        let rendered: Vec<String> = probabilities
            .iter()
            .map(|(value, p)| format!("{}={}", value, format_number(*p)))
            .collect();
        println!("      convex {}", rendered.join(" "));
    }
}

//==============================================================================
// resolve / stem / pipes
//==============================================================================

/// Execute the resolve command
pub fn resolve(token: String, headers: Option<String>, file: Option<PathBuf>) -> PipeResult<()> {
    let headers: Vec<String> = match (headers, file) {
        (Some(list), _) => list.split(',').map(|h| h.trim().to_string()).collect(),
        (None, Some(path)) => parser::load_table(&source_name(&path), &path)?.headers,
        (None, None) => {
            return Err(PipeError::InvalidParameter(
                "either --headers or --file is required".to_string(),
            ))
        }
    };

    match resolve_header(&headers, &token) {
        Some(header) => {
            println!("{} {} {}", token.bright_blue(), "->".dimmed(), header.green().bold());
            let keys = synonym_keys(&token);
            if !keys.is_empty() {
                println!("   synonym keys: {}", keys.join(", "));
            }
            Ok(())
        }
        None => Err(PipeError::InvalidParameter(format!(
            "no header matches '{}'",
            token
        ))),
    }
}

/// Execute the stem command
pub fn stem_words(words: Vec<String>) -> PipeResult<()> {
    for word in &words {
        println!("{} {} {}", word, "->".dimmed(), stem(word).green());
    }
    Ok(())
}

/// Execute the pipes command
pub fn pipes(formula: String, columns: Vec<String>, json: bool) -> PipeResult<()> {
    let presentation = PresentationConfig {
        columns: columns
            .iter()
            .map(|field| PresentationColumn::new(field.as_str(), field.as_str()))
            .collect(),
    };
    let pipes = extract_pipes(&formula, Some(&presentation));

    if json {
        return print_json(&pipes);
    }
    println!("{} {}", "Sources:".bold(), pipes.sources.join(", ").bright_blue());
    println!("{} {}", "Inputs: ".bold(), pipes.inputs.join(", ").bright_blue());
    Ok(())
}

//==============================================================================
// eval / classify
//==============================================================================

/// Execute the eval command
pub fn eval(expression: String, json: bool) -> PipeResult<()> {
    let evaluation = ExpressionEngine::new().evaluate(&expression);
    if json {
        return print_json(&evaluation);
    }
    println!(
        "{} {}  {} {}",
        "result".bold(),
        format_number(evaluation.result).green().bold(),
        "tally".bold(),
        evaluation.non_null_count
    );
    Ok(())
}

/// Execute the classify command
pub fn classify(
    file: PathBuf,
    name: Option<String>,
    balance: f64,
    consumer_maximum: f64,
    annual_deposits: f64,
) -> PipeResult<()> {
    let name = name.unwrap_or_else(|| source_name(&file));
    let table = parser::load_table(&name, &file)?;
    let analytics = analyze_table(&table, &ConvexParams::default());

    let business =
        classify::is_business(&analytics, &name, balance, consumer_maximum, annual_deposits)?;
    let thresholds =
        Thresholds::from_balance(classify::balance_field(&analytics, &name)?, consumer_maximum);

    println!(
        "   high {}  low {}",
        format_number(thresholds.high),
        format_number(thresholds.low)
    );
    if business {
        println!("{}", "business".bold().yellow());
    } else {
        println!("{}", "consumer".bold().green());
    }
    Ok(())
}

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use repopulse_core::{MetricParams, OutputFormat, ParamValue, PulseConfig, PulseError};
use repopulse_git::GitSource;
use repopulse_metrics::{AnalysisResult, MemorySource, MetricAnalyzer, Outcome, Registry};
use serde_json::{json, Value};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CONFIG_FILE: &str = ".repopulse.toml";

#[derive(Parser)]
#[command(
    name = "repopulse",
    version,
    about = "Repository health metrics from git history",
    long_about = "Repopulse reads a local git repository and reports on its health:\n\
                   knowledge concentration, risky files, branch flow and delivery speed.\n\n\
                   Examples:\n  \
                     repopulse metrics                          List the available metrics\n  \
                     repopulse analyze bus_factor               Bus factor of the current repository\n  \
                     repopulse analyze all --format json        Every metric as JSON\n  \
                     repopulse analyze velocity_trend --param weeks_lookback=8\n  \
                     repopulse init                             Write a default .repopulse.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .repopulse.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format: text, json or markdown (default: from config, else text)
    #[arg(long, global = true)]
    format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List the registered metrics
    Metrics,
    /// Run one metric, or all of them, against a repository
    #[command(long_about = "Run one metric, or all of them, against a repository.\n\n\
        Parameters come from --param flags, then the [metrics.<name>] table of the\n\
        configuration file, then each metric's defaults. A plain key=value applies to\n\
        every selected metric that accepts the key; prefix the key with a metric name\n\
        to target one.\n\n\
        Examples:\n  repopulse analyze cycle_time --param lookback_months=3\n  \
        repopulse analyze all --param bus_factor.knowledge_threshold=0.5\n  \
        repopulse analyze flow_efficiency --param branch_patterns=feature/*,release/*")]
    Analyze {
        /// Metric name, or `all`
        metric: String,

        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Analyzer parameter as key=value or metric.key=value (repeatable)
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Anchor time for every window, RFC 3339 (default: now)
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Create default configuration
    Init,
}

const DEFAULT_CONFIG: &str = r#"# Repopulse Configuration
# See: https://github.com/Meru143/repopulse

[output]
# format = "text"   # text | json | markdown

[source]
# Skip commits touching more files than this (bulk renames, vendoring)
# max_files_per_commit = 50

# Per-metric parameters. --param flags override these.

[metrics.bus_factor]
# lookback_months = 6
# knowledge_threshold = 0.8
# decay_half_life = 90.0

[metrics.knowledge_distribution]
# lookback_months = 6
# decay_half_life = 90.0

[metrics.critical_files]
# lookback_months = 6
# critical_threshold_percentile = 0.8

[metrics.single_point_failure]
# lookback_months = 6
# dominance_threshold = 0.9
# min_contributor_threshold = 3

[metrics.flow_efficiency]
# branch_patterns = ["feature/*", "bugfix/*", "hotfix/*"]

[metrics.branch_lifecycle]
# include_active_branches = false

[metrics.velocity_trend]
# weeks_lookback = 12

[metrics.cycle_time]
# lookback_months = 6
# branch_patterns = ["feature/*", "bugfix/*", "hotfix/*"]
"#;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PulseConfig> {
    match path {
        Some(path) => Ok(PulseConfig::from_file(path)?),
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                Ok(PulseConfig::from_file(default_path)?)
            } else {
                Ok(PulseConfig::default())
            }
        }
    }
}

/// Split `--param` flags into parameters for every metric and parameters
/// scoped to one metric.
fn cli_params(
    registry: &Registry,
    assignments: &[String],
    as_of: Option<&str>,
) -> Result<(MetricParams, Vec<(String, MetricParams)>)> {
    let mut shared = MetricParams::new();
    let mut scoped: Vec<(String, MetricParams)> = Vec::new();
    for assignment in assignments {
        let scope = assignment
            .split_once('=')
            .and_then(|(key, _)| key.split_once('.'))
            .filter(|(metric, _)| registry.contains(metric));
        match scope {
            Some((metric, _)) => {
                let rest = &assignment[metric.len() + 1..];
                let index = match scoped.iter().position(|(name, _)| name == metric) {
                    Some(index) => index,
                    None => {
                        scoped.push((metric.to_string(), MetricParams::new()));
                        scoped.len() - 1
                    }
                };
                scoped[index].1.set_assignment(rest)?;
            }
            None => shared.set_assignment(assignment)?,
        }
    }
    if let Some(raw) = as_of {
        match ParamValue::parse(raw) {
            time @ ParamValue::Time(_) => shared.insert("as_of", time),
            _ => miette::bail!(miette::miette!(
                help = "use an RFC 3339 time such as 2024-06-01T00:00:00Z",
                "invalid --as-of value: {raw}"
            )),
        }
    }
    Ok((shared, scoped))
}

/// Narrow unscoped parameters to what each selected metric accepts, in
/// `accepted` order.
///
/// A single metric gets everything so it reports unknown keys itself. Across
/// several metrics a key that none of them accepts is an error.
fn distribute_shared(
    shared: &MetricParams,
    accepted: &[(&str, &[&str])],
) -> Result<Vec<MetricParams>, PulseError> {
    if let [_] = accepted {
        return Ok(vec![shared.clone()]);
    }
    if let Some((key, _)) = shared
        .iter()
        .find(|(key, _)| !accepted.iter().any(|(_, keys)| keys.contains(key)))
    {
        let metrics: Vec<&str> = accepted.iter().map(|(name, _)| *name).collect();
        return Err(PulseError::invalid_parameter(
            &metrics.join(", "),
            format!("none of these metrics accepts '{key}'"),
        ));
    }
    Ok(accepted.iter().map(|(_, keys)| shared.only(keys)).collect())
}

struct MetricRun {
    key: String,
    name: &'static str,
    result: AnalysisResult,
    recommendations: Vec<String>,
}

fn to_json(run: &MetricRun) -> Result<Value> {
    let status = if run.result.is_complete() { "complete" } else { "no_data" };
    Ok(json!({
        "metric": run.key,
        "name": run.name,
        "status": status,
        "result": serde_json::to_value(&run.result).into_diagnostic()?,
        "recommendations": run.recommendations,
    }))
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some("-".to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(match n.as_f64() {
            Some(f) if n.is_f64() => format!("{f:.3}"),
            _ => n.to_string(),
        }),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn summary_lines(value: &Value, indent: usize, lines: &mut Vec<(usize, String, String)>) {
    let Value::Object(map) = value else {
        return;
    };
    for (key, field) in map {
        if key == "recommendations" {
            continue;
        }
        match field {
            Value::Array(items) => lines.push((indent, key.clone(), format!("{} entries", items.len()))),
            Value::Object(_) => {
                lines.push((indent, key.clone(), String::new()));
                summary_lines(field, indent + 1, lines);
            }
            other => lines.push((indent, key.clone(), scalar(other).unwrap_or_default())),
        }
    }
}

fn print_text(run: &MetricRun) -> Result<()> {
    println!("{} ({})", run.name, run.key);
    println!("{}", "=".repeat(run.name.len() + run.key.len() + 3));
    match &run.result {
        Outcome::NoData(no_data) => {
            println!("No data: {}", no_data.error);
            for item in &no_data.skipped {
                println!("  skipped {}: {}", item.item, item.error);
            }
        }
        Outcome::Complete(report) => {
            let value = serde_json::to_value(report).into_diagnostic()?;
            let mut lines = Vec::new();
            summary_lines(&value, 0, &mut lines);
            for (indent, key, text) in lines {
                let pad = "  ".repeat(indent);
                if text.is_empty() {
                    println!("{pad}{key}:");
                } else {
                    println!("{pad}{key}: {text}");
                }
            }
        }
    }
    if !run.recommendations.is_empty() {
        println!("\nRecommendations:");
        for rec in &run.recommendations {
            println!("  - {rec}");
        }
    }
    println!();
    Ok(())
}

fn print_markdown(run: &MetricRun) -> Result<()> {
    println!("## {}\n", run.name);
    match &run.result {
        Outcome::NoData(no_data) => {
            println!("_No data: {}_\n", no_data.error);
            for item in &no_data.skipped {
                println!("- skipped `{}`: {}", item.item, item.error);
            }
        }
        Outcome::Complete(report) => {
            let value = serde_json::to_value(report).into_diagnostic()?;
            let mut lines = Vec::new();
            summary_lines(&value, 0, &mut lines);
            println!("| Field | Value |");
            println!("|-------|-------|");
            for (indent, key, text) in lines {
                let key = if indent == 0 {
                    format!("**{key}**")
                } else {
                    format!("{}{key}", "&nbsp;&nbsp;".repeat(indent))
                };
                println!("| {key} | {text} |");
            }
        }
    }
    if !run.recommendations.is_empty() {
        println!("\n### Recommendations\n");
        for rec in &run.recommendations {
            println!("- {rec}");
        }
    }
    println!();
    Ok(())
}

fn main() -> Result<()> {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let format = cli.format.unwrap_or(config.output.format);
    tracing::debug!(%format, "configuration loaded");

    let registry = Registry::default();

    match cli.command {
        None | Some(Command::Metrics) => {
            let empty = MemorySource::new();
            let mut entries = Vec::new();
            for key in registry.names() {
                let analyzer = registry.create(key, &empty)?;
                entries.push((key, analyzer.metric_name(), analyzer.description()));
            }
            match format {
                OutputFormat::Json => {
                    let list: Vec<Value> = entries
                        .iter()
                        .map(|(key, name, description)| {
                            json!({ "metric": key, "name": name, "description": description })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&list).into_diagnostic()?);
                }
                OutputFormat::Markdown => {
                    println!("| Metric | Name | Description |");
                    println!("|--------|------|-------------|");
                    for (key, name, description) in &entries {
                        println!("| `{key}` | {name} | {description} |");
                    }
                }
                OutputFormat::Text => {
                    let width = entries.iter().map(|(key, ..)| key.len()).max().unwrap_or(0);
                    for (key, name, description) in &entries {
                        println!("{key:<width$}  {name}: {description}");
                    }
                }
            }
        }
        Some(Command::Analyze {
            ref metric,
            ref path,
            ref params,
            ref as_of,
        }) => {
            let selected: Vec<&'static str> = if metric == "all" {
                registry.names()
            } else {
                match registry.names().into_iter().find(|name| name == metric) {
                    Some(name) => vec![name],
                    None => {
                        return Err(PulseError::UnknownMetric {
                            name: metric.clone(),
                            available: registry.names().join(", "),
                        }
                        .into())
                    }
                }
            };

            if git2::Repository::discover(path).is_err() {
                miette::bail!(miette::miette!(
                    help = "Run repopulse from inside a git repository, or specify --path to one",
                    "Not a git repository: {}",
                    path.display()
                ));
            }
            let source = GitSource::open(path)?.with_max_files_per_commit(config.source.max_files_per_commit);
            let (shared, scoped) = cli_params(&registry, params, as_of.as_deref())?;

            let mut analyzers = Vec::with_capacity(selected.len());
            for key in selected {
                analyzers.push((key, registry.create(key, &source)?));
            }
            let accepted: Vec<_> = analyzers.iter().map(|(key, a)| (*key, a.parameters())).collect();
            let shared = distribute_shared(&shared, &accepted)?;

            let mut runs = Vec::new();
            for ((key, analyzer), shared) in analyzers.into_iter().zip(shared) {
                let mut metric_params = config.metric_params(key);
                metric_params.merge(&shared);
                if let Some((_, own)) = scoped.iter().find(|(name, _)| name == key) {
                    metric_params.merge(own);
                }

                eprintln!("Running {} on {} ...", analyzer.metric_name(), path.display());
                let result = analyzer.calculate(&metric_params)?;
                let recommendations = analyzer.recommendations(&result);
                runs.push(MetricRun {
                    key: key.to_string(),
                    name: analyzer.metric_name(),
                    result,
                    recommendations,
                });
            }

            match format {
                OutputFormat::Json => {
                    let value = if let [run] = runs.as_slice() {
                        to_json(run)?
                    } else {
                        Value::Array(runs.iter().map(to_json).collect::<Result<_>>()?)
                    };
                    println!("{}", serde_json::to_string_pretty(&value).into_diagnostic()?);
                }
                OutputFormat::Markdown => {
                    println!("# Repository health: {}\n", path.display());
                    for run in &runs {
                        print_markdown(run)?;
                    }
                }
                OutputFormat::Text => {
                    for run in &runs {
                        print_text(run)?;
                    }
                }
            }
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
    }

    Ok(())
}

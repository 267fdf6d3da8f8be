#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use kr_conformance::{DemoSpec, generate_demo_datasets};
use kr_frame::Dataset;
use kr_io::{read_path, write_reconciliation_json};
use kr_join::{
    DuplicateKeyPolicy, MissingKeyPolicy, ReconcileOptions, Reconciliation, reconcile_datasets,
};
use kr_runtime::{EvidenceLedger, RuntimeMode, RuntimePolicy};
use kr_types::KeyComparison;
use serde::Deserialize;

/// Shape of an `--options` file. Every field is optional, e.g.
/// `{"key_comparison": "text", "mode": "hardened", "row_cap": 100000}`.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
struct RunConfig {
    #[serde(flatten)]
    options: ReconcileOptions,
    #[serde(flatten)]
    policy: RuntimePolicy,
    /// Keys neither of the above claimed.
    #[serde(flatten)]
    unknown: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct CliArgs {
    left: Option<PathBuf>,
    left_key: Option<String>,
    right: Option<PathBuf>,
    right_key: Option<String>,
    compare: Option<KeyComparison>,
    duplicates: Option<DuplicateKeyPolicy>,
    missing_keys: Option<MissingKeyPolicy>,
    mode: Option<RuntimeMode>,
    row_cap: Option<usize>,
    options_file: Option<PathBuf>,
    output: Option<PathBuf>,
    show_evidence: bool,
    demo: bool,
}

#[derive(Debug, PartialEq)]
enum Command {
    Help,
    Run(CliArgs),
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let outcome = parse_args(std::env::args().skip(1)).and_then(|command| match command {
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Run(cli) => run(&cli),
    });

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Command, String> {
    let mut cli = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--left" => cli.left = Some(PathBuf::from(flag_value(&mut args, "--left")?)),
            "--left-key" => cli.left_key = Some(flag_value(&mut args, "--left-key")?),
            "--right" => cli.right = Some(PathBuf::from(flag_value(&mut args, "--right")?)),
            "--right-key" => cli.right_key = Some(flag_value(&mut args, "--right-key")?),
            "--compare" => {
                cli.compare = Some(match flag_value(&mut args, "--compare")?.as_str() {
                    "scalar" => KeyComparison::Scalar,
                    "text" => KeyComparison::Text,
                    other => return Err(format!("--compare expects scalar or text, got {other}")),
                });
            }
            "--duplicates" => {
                cli.duplicates = Some(match flag_value(&mut args, "--duplicates")?.as_str() {
                    "last-wins" | "last_wins" => DuplicateKeyPolicy::LastWins,
                    "all-pairs" | "all_pairs" => DuplicateKeyPolicy::AllPairs,
                    other => {
                        return Err(format!(
                            "--duplicates expects last-wins or all-pairs, got {other}"
                        ));
                    }
                });
            }
            "--missing-keys" => {
                cli.missing_keys = Some(match flag_value(&mut args, "--missing-keys")?.as_str() {
                    "shared-absence" | "shared_absence" => MissingKeyPolicy::SharedAbsence,
                    "never-match" | "never_match" => MissingKeyPolicy::NeverMatch,
                    other => {
                        return Err(format!(
                            "--missing-keys expects shared-absence or never-match, got {other}"
                        ));
                    }
                });
            }
            "--mode" => {
                cli.mode = Some(match flag_value(&mut args, "--mode")?.as_str() {
                    "strict" => RuntimeMode::Strict,
                    "hardened" => RuntimeMode::Hardened,
                    other => return Err(format!("--mode expects strict or hardened, got {other}")),
                });
            }
            "--row-cap" => {
                let value = flag_value(&mut args, "--row-cap")?;
                cli.row_cap = Some(
                    value
                        .parse()
                        .map_err(|_| format!("--row-cap must be a non-negative integer, got {value}"))?,
                );
            }
            "--options" => {
                cli.options_file = Some(PathBuf::from(flag_value(&mut args, "--options")?));
            }
            "--output" => cli.output = Some(PathBuf::from(flag_value(&mut args, "--output")?)),
            "--show-evidence" => cli.show_evidence = true,
            "--demo" => cli.demo = true,
            "--help" | "-h" => return Ok(Command::Help),
            other => return Err(format!("unknown argument: {other} (see --help)")),
        }
    }

    Ok(Command::Run(cli))
}

fn flag_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    args.next().ok_or_else(|| format!("{flag} requires a value"))
}

/// File values first, then flags on top.
fn resolve_config(cli: &CliArgs) -> Result<RunConfig, String> {
    let mut config = match &cli.options_file {
        Some(path) => {
            let body = std::fs::read_to_string(path)
                .map_err(|err| format!("options file {}: {err}", path.display()))?;
            let config = serde_json::from_str::<RunConfig>(&body)
                .map_err(|err| format!("options file {}: {err}", path.display()))?;
            if !config.unknown.is_empty() {
                let keys = config.unknown.keys().cloned().collect::<Vec<_>>();
                return Err(format!(
                    "options file {}: unknown setting(s): {}",
                    path.display(),
                    keys.join(", ")
                ));
            }
            config
        }
        None => RunConfig::default(),
    };

    if let Some(compare) = cli.compare {
        config.options.key_comparison = compare;
    }
    if let Some(duplicates) = cli.duplicates {
        config.options.duplicates = duplicates;
    }
    if let Some(missing_keys) = cli.missing_keys {
        config.options.missing_keys = missing_keys;
    }
    if let Some(mode) = cli.mode {
        config.policy.mode = mode;
    }
    if cli.row_cap.is_some() {
        config.policy.row_cap = cli.row_cap;
    }
    Ok(config)
}

fn run(cli: &CliArgs) -> Result<(), String> {
    let config = resolve_config(cli)?;
    let (left, left_key, right, right_key) = prepare_inputs(cli)?;

    tracing::info!(
        left = left.name(),
        left_key = %left_key,
        right = right.name(),
        right_key = %right_key,
        mode = ?config.policy.mode,
        "reconciling"
    );

    let mut ledger = EvidenceLedger::new();
    let result = reconcile_datasets(
        &left,
        &left_key,
        &right,
        &right_key,
        &config.options,
        &config.policy,
        &mut ledger,
    )
    .map_err(|err| err.to_string())?;

    print_summary(&result);
    if cli.show_evidence {
        for record in ledger.records() {
            println!("evidence {}", record.render_plain());
        }
    }

    if let Some(path) = &cli.output {
        let json = write_reconciliation_json(&result).map_err(|err| err.to_string())?;
        if path == Path::new("-") {
            println!("{json}");
        } else {
            std::fs::write(path, json)
                .map_err(|err| format!("output file {}: {err}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote reconciliation");
        }
    }
    Ok(())
}

/// Both datasets must load before anything is reconciled. Problems are
/// reported for each side together; a missing key flag lists that side's
/// columns once its file has loaded.
fn prepare_inputs(cli: &CliArgs) -> Result<(Dataset, String, Dataset, String), String> {
    if cli.demo {
        if cli.left.is_some() || cli.right.is_some() {
            return Err("--demo cannot be combined with --left or --right".to_owned());
        }
        let spec = DemoSpec::default();
        let (left, right) = generate_demo_datasets(&spec).map_err(|err| err.to_string())?;
        let left_key = cli.left_key.clone().unwrap_or(spec.left_key);
        let right_key = cli.right_key.clone().unwrap_or(spec.right_key);
        return Ok((left, left_key, right, right_key));
    }

    let left_path = cli.left.as_deref().ok_or("--left is required (or use --demo)")?;
    let right_path = cli.right.as_deref().ok_or("--right is required (or use --demo)")?;

    let (left, right) = match (load_side("left", left_path), load_side("right", right_path)) {
        (Ok(left), Ok(right)) => (left, right),
        (left, right) => return Err(not_ready([left.err(), right.err()])),
    };

    match (&cli.left_key, &cli.right_key) {
        (Some(left_key), Some(right_key)) => Ok((left, left_key.clone(), right, right_key.clone())),
        (left_key, right_key) => Err(not_ready([
            left_key.is_none().then(|| key_hint("--left-key", &left)),
            right_key.is_none().then(|| key_hint("--right-key", &right)),
        ])),
    }
}

fn not_ready(problems: [Option<String>; 2]) -> String {
    let problems = problems.into_iter().flatten().collect::<Vec<_>>();
    format!("not ready to reconcile:\n  {}", problems.join("\n  "))
}

fn key_hint(flag: &str, dataset: &Dataset) -> String {
    let columns = if dataset.header().is_empty() {
        "(none)".to_owned()
    } else {
        dataset.header().join(", ")
    };
    format!("{flag} is required; {} has columns: {columns}", dataset.name())
}

fn load_side(side: &str, path: &Path) -> Result<Dataset, String> {
    let dataset =
        read_path(path).map_err(|err| format!("{side} file {}: {err}", path.display()))?;
    tracing::info!(
        side,
        path = %path.display(),
        rows = dataset.len(),
        columns = dataset.header().len(),
        "loaded dataset"
    );
    Ok(dataset)
}

fn print_summary(result: &Reconciliation) {
    let summary = result.summary();
    println!(
        "matches={} only_in_left={} only_in_right={}",
        summary.matched, summary.only_in_left, summary.only_in_right
    );
    println!(
        "left_rows={} right_rows={} left_rows_without_key={} right_rows_without_key={} shadowed_right_rows={} absorbed_right_rows={}",
        summary.left_rows,
        summary.right_rows,
        summary.left_rows_without_key,
        summary.right_rows_without_key,
        summary.shadowed_right_rows,
        summary.absorbed_right_rows
    );
}

fn print_help() {
    println!(
        "keyrecon\n\
         Usage:\n\
         \tkeyrecon --left <file> --left-key <col> --right <file> --right-key <col> [options]\n\
         \tkeyrecon --demo [options]\n\
         Inputs are .json (array of objects), .jsonl/.ndjson or .csv.\n\
         Options:\n\
         \t--compare <mode>      scalar (default) or text\n\
         \t--duplicates <policy> last-wins (default) or all-pairs\n\
         \t--missing-keys <p>    shared-absence (default) or never-match\n\
         \t--mode <mode>         strict (default) or hardened\n\
         \t--row-cap <n>         Reject runs with more than n rows in total\n\
         \t--options <file>      JSON file with the settings above; flags win\n\
         \t--output <file>       Write the full result as JSON (\"-\" for stdout)\n\
         \t--show-evidence       Print the runtime decision ledger\n\
         \t--demo                Reconcile the generated employee demo pair\n\
         \t-h, --help            Show this help\n\
         Logging follows RUST_LOG (e.g. RUST_LOG=info)."
    );
}

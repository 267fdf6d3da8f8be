#![forbid(unsafe_code)]

use std::path::PathBuf;

use kr_conformance::{DemoSpec, HarnessConfig, run_fixture_suite_filtered, write_demo_csv};

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    case_filter: Option<String>,
    fixture_root: Option<PathBuf>,
    require_green: bool,
    write_demo: Option<PathBuf>,
    seed: Option<u64>,
    help: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut cli = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--case" => {
                let value = args
                    .next()
                    .ok_or("--case requires a value (e.g. duplicate_shadowing)")?;
                cli.case_filter = Some(value);
            }
            "--fixtures" => {
                let value = args.next().ok_or("--fixtures requires a directory")?;
                cli.fixture_root = Some(PathBuf::from(value));
            }
            "--require-green" => {
                cli.require_green = true;
            }
            "--write-demo" => {
                let value = args.next().ok_or("--write-demo requires a directory")?;
                cli.write_demo = Some(PathBuf::from(value));
            }
            "--seed" => {
                let value = args.next().ok_or("--seed requires an integer")?;
                cli.seed = Some(
                    value
                        .parse()
                        .map_err(|_| format!("--seed must be an integer, got {value}"))?,
                );
            }
            "--help" | "-h" => {
                cli.help = true;
                return Ok(cli);
            }
            other => {
                return Err(format!("unknown argument: {other}"));
            }
        }
    }

    if cli.seed.is_some() && cli.write_demo.is_none() {
        return Err("--seed only applies together with --write-demo".to_owned());
    }
    Ok(cli)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let CliArgs {
        case_filter,
        fixture_root,
        require_green,
        write_demo,
        seed,
        help,
    } = parse_args(std::env::args().skip(1))?;
    if help {
        print_help();
        return Ok(());
    }

    if let Some(dir) = write_demo {
        let mut spec = DemoSpec::default();
        if let Some(seed) = seed {
            spec.seed = seed;
        }
        let (left, right) = write_demo_csv(&spec, &dir)?;
        println!("wrote left={} right={}", left.display(), right.display());
        return Ok(());
    }

    let mut config = HarnessConfig::default_paths();
    if let Some(root) = fixture_root {
        config.fixture_root = root;
    }

    let report = run_fixture_suite_filtered(&config, case_filter.as_deref())?;
    for result in &report.results {
        match &result.mismatch {
            Some(mismatch) => println!("FAIL case={} {mismatch}", result.case_id),
            None => println!("ok   case={} evidence={}", result.case_id, result.evidence_records),
        }
    }
    println!(
        "suite={} fixtures={} passed={} failed={} green={}",
        report.suite,
        report.fixture_count,
        report.passed,
        report.failed,
        report.is_green()
    );

    if require_green && !report.is_green() {
        return Err(format!("{} fixture case(s) failed", report.failed).into());
    }
    Ok(())
}

fn print_help() {
    println!(
        "kr-conformance-cli\n\
         Usage:\n\
         \tkr-conformance-cli [--case <id>] [--fixtures <dir>] [--require-green]\n\
         \tkr-conformance-cli --write-demo <dir> [--seed <n>]\n\
         Options:\n\
         \t--case <id>          Run only one fixture case\n\
         \t--fixtures <dir>     Fixture root (default: crates/kr-conformance/fixtures)\n\
         \t--require-green      Exit non-zero when any case fails or none ran\n\
         \t--write-demo <dir>   Write the employee demo pair as file_A.csv and file_B.csv\n\
         \t--seed <n>           Filler seed for --write-demo\n\
         \t-h, --help           Show this help"
    );
}

//! Runs one grid search or final fit described by a TOML config.

use std::path::PathBuf;

use cohortfit::config::RunConfig;
use cohortfit::logging;
use cohortfit::run::{RunMode, execute, prepare};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let config = RunConfig::load(&options.config_path).map_err(|err| err.to_string())?;
    let run_dir = prepare(&config).map_err(|err| err.to_string())?;
    if let Err(err) = logging::init(&run_dir) {
        eprintln!("Logging disabled: {err}");
    }

    let summary = execute(&config, &run_dir).map_err(|err| err.to_string())?;
    let label = match summary.mode {
        RunMode::Search => "best cv score",
        RunMode::Final => "test accuracy",
    };
    println!("{}: {label} {:.4}", summary.name, summary.score);
    println!("held-out weighted f1: {:.4}", summary.test_f1);
    println!("artifacts in {}", summary.run_dir.display());
    for path in &summary.artifacts {
        println!("  {}", path.display());
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct CliOptions {
    config_path: PathBuf,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut config_path: Option<PathBuf> = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    let config_path = config_path.ok_or_else(help_text)?;
    Ok(CliOptions { config_path })
}

fn help_text() -> String {
    [
        "cohortfit",
        "",
        "Assembles group feature tables and runs a cross-validated grid search or a final fit.",
        "",
        "Usage:",
        "  cohortfit --config <run.toml>",
        "",
        "Options:",
        "  --config <file>   Run configuration (required).",
    ]
    .join("\n")
}

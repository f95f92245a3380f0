//! Applies a persisted model to another phase of the same groups.

use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;

use cohortfit::config::{Phase, RunConfig};
use cohortfit::dataset::{assemble, load_groups};
use cohortfit::inference::{evaluate_bundle, write_daily_csv};
use cohortfit::model_bundle::ModelBundle;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let bundle = ModelBundle::load(&options.model_path).map_err(|err| err.to_string())?;
    let config = RunConfig::load(&options.config_path).map_err(|err| err.to_string())?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let tables = load_groups(
        &config.input_dir,
        &config.groups,
        options.phase.as_str(),
        config.subsample.as_ref(),
        &mut rng,
    )
    .map_err(|err| err.to_string())?;
    let dataset = assemble(tables, &config.groups, &config.assembly_options(), &mut rng)
        .map_err(|err| err.to_string())?;
    println!(
        "Evaluating {} on {} rows of phase {}",
        bundle.name,
        dataset.n_rows(),
        options.phase
    );

    let evaluation = evaluate_bundle(&bundle, &dataset).map_err(|err| err.to_string())?;
    println!("accuracy: {:.4}", evaluation.report.accuracy());
    print!("{}", evaluation.report.render_text());

    let out_path = options.out_path.unwrap_or_else(|| {
        options
            .model_path
            .with_file_name(format!("{}_daily_{}.csv", bundle.name, options.phase))
    });
    write_daily_csv(&evaluation.daily, &out_path).map_err(|err| err.to_string())?;
    let measure = if evaluation.probabilistic {
        "mean own-group probability"
    } else {
        "hit rate"
    };
    println!("wrote per-group daily {measure} to {}", out_path.display());
    Ok(())
}

#[derive(Debug, Clone)]
struct CliOptions {
    model_path: PathBuf,
    config_path: PathBuf,
    phase: Phase,
    out_path: Option<PathBuf>,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut model_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut phase = Phase::Post;
    let mut out_path: Option<PathBuf> = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--model" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--model requires a value".to_string())?;
                model_path = Some(PathBuf::from(value));
            }
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            "--phase" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--phase requires a value".to_string())?;
                phase = value.parse::<Phase>().map_err(|err| err.to_string())?;
            }
            "--out" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--out requires a value".to_string())?;
                out_path = Some(PathBuf::from(value));
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    let model_path = model_path.ok_or_else(help_text)?;
    let config_path = config_path.ok_or_else(help_text)?;
    Ok(CliOptions {
        model_path,
        config_path,
        phase,
        out_path,
    })
}

fn help_text() -> String {
    [
        "cohortfit-eval",
        "",
        "Evaluates a saved model on another phase and writes a per-group daily score table.",
        "",
        "Usage:",
        "  cohortfit-eval --model <model.json> --config <run.toml> [--phase post] [--out daily.csv]",
        "",
        "Options:",
        "  --model <file>    Model written by a cohortfit run (required).",
        "  --config <file>   Run configuration naming the input directory and groups (required).",
        "  --phase <tag>     Feature-table phase to evaluate: pre or post (default post).",
        "  --out <file>      Daily score CSV (default next to the model).",
    ]
    .join("\n")
}

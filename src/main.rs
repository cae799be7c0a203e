use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand, ValueHint};

use galvanalyze::config::{AnalysisConfig, CurrentMode};
use galvanalyze::cycling::table::CycleTable;
use galvanalyze::data::columns::resolve_channels;
use galvanalyze::data::loader::load_file;
use galvanalyze::data::model::{ActiveMass, Threshold};
use galvanalyze::export::{cycle_number_from_path, write_hysteresis, ExportFormat, RunOutputs};
use galvanalyze::pipeline::{analyze_series, cycle_hysteresis};

#[derive(Parser, Debug)]
#[command(author, version, about = "Galvanostatic cycling analysis", long_about = None)]
struct Cli {
    /// Write log output to this file instead of stderr
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Segment a raw cycling file and export cycles, capacities and efficiency
    Run(RunArgs),
    /// Build the hysteresis loop from a saved Cycle_<n> file
    Hysteresis(HysteresisArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Raw instrument export (.txt, .csv, .json, .parquet)
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// JSON run configuration; flags below override it
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Active mass in mg
    #[arg(short, long)]
    mass_mg: Option<String>,

    /// Whether the applied current is constant or varies between cycles
    #[arg(long, value_enum)]
    mode: Option<CurrentMode>,

    /// Plateau fraction of the current extremum (constant mode)
    #[arg(long)]
    rel_cutoff: Option<f64>,

    /// Confirmed current-derivative threshold in mA (variable mode)
    #[arg(long)]
    threshold: Option<String>,

    /// Use the suggested threshold without giving one explicitly
    #[arg(long, action = ArgAction::SetTrue)]
    accept_suggested_threshold: bool,

    /// Each cycle starts with its discharge half
    #[arg(long, action = ArgAction::SetTrue)]
    discharge_first: bool,

    /// Output file format
    #[arg(long, value_enum)]
    format: Option<ExportFormat>,

    /// Also save one file per charge/discharge pair
    #[arg(long, action = ArgAction::SetTrue)]
    separate_cycles: bool,

    /// Output directory (defaults to `<input stem>_cycling` next to the input)
    #[arg(short, long, value_hint = ValueHint::DirPath)]
    output_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct HysteresisArgs {
    /// A Cycle_<n>.csv or Cycle_<n>.parquet file written by `run --separate-cycles`
    #[arg(value_hint = ValueHint::FilePath)]
    cycle_file: PathBuf,

    /// The cycle starts with its discharge half
    #[arg(long, action = ArgAction::SetTrue)]
    discharge_first: bool,

    /// Output file format
    #[arg(long, value_enum, default_value = "csv")]
    format: ExportFormat,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let result = match cli.command {
        Command::Run(args) => run(args),
        Command::Hysteresis(args) => hysteresis(args),
    };
    if let Err(e) = &result {
        log::error!("{e:#}");
    }
    result
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(path) = log_file {
        let file = File::create(path)
            .with_context(|| format!("creating log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

fn build_config(args: &RunArgs) -> Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_json_file(path)?,
        None => AnalysisConfig::default(),
    };

    if let Some(text) = &args.mass_mg {
        config.active_mass_mg = Some(ActiveMass::parse_milligrams(text)?.milligrams());
    }
    if let Some(mode) = args.mode {
        config.current_mode = mode;
    }
    if let Some(cutoff) = args.rel_cutoff {
        config.rel_cutoff = cutoff;
    }
    if let Some(text) = &args.threshold {
        config.threshold = Some(Threshold::parse(text)?.value());
    }
    if args.accept_suggested_threshold {
        config.accept_suggested_threshold = true;
    }
    if args.discharge_first {
        config.charge_first = false;
    }
    if let Some(format) = args.format {
        config.format = format;
    }
    if args.separate_cycles {
        config.save_separate_cycles = true;
    }
    Ok(config)
}

fn default_output_dir(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("cycling");
    input
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{stem}_cycling"))
}

fn run(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;

    let table = load_file(&args.input)?;
    let series = resolve_channels(&table)?.into_series()?;
    let options = config.to_options(&series.current)?;
    if config.current_mode == CurrentMode::Variable {
        log::info!("Applied current assumed to vary: {:?}", options.mode);
    }
    log::info!(
        "Assuming first half-cycle is {}",
        if options.charge_first { "charge" } else { "discharge" }
    );

    let report = analyze_series(&series, &options)?;

    let stem = args
        .input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("cycling");
    let dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| default_output_dir(&args.input));
    let outputs = RunOutputs::new(&dir, stem, config.format, config.save_separate_cycles);
    outputs.write_all(&report)?;

    println!(
        "{:>5}  {:>14}  {:>17}  {:>9}",
        "cycle", "charge mAh/g", "discharge mAh/g", "CE %"
    );
    for row in &report.summary {
        println!(
            "{:>5}  {:>14.3}  {:>17.3}  {:>9.2}",
            row.cycle, row.max_charge_capacity, row.max_discharge_capacity, row.coulombic_efficiency
        );
    }
    println!("Results written to {}", dir.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// hysteresis
// ---------------------------------------------------------------------------

fn hysteresis(args: HysteresisArgs) -> Result<()> {
    let Some(cycle) = cycle_number_from_path(&args.cycle_file) else {
        bail!(
            "{} is not a cycle file; generate separate cycle files with `run --separate-cycles`",
            args.cycle_file.display()
        );
    };
    log::info!("Generating hysteresis loop for cycle {cycle}");

    let raw = load_file(&args.cycle_file)?;
    let table = CycleTable::from_raw(&raw)?;
    let loop_ = cycle_hysteresis(&table, cycle, !args.discharge_first)?;

    let dir = args.cycle_file.parent().unwrap_or_else(|| Path::new("."));
    let path = dir.join(format!("Hysteresis (Cycle {cycle}).{}", args.format.extension()));
    write_hysteresis(&loop_, cycle, &path, args.format)?;
    println!("Hysteresis loop written to {}", path.display());
    Ok(())
}

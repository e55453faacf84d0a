//! HVAC co-simulation entry point: CLI wiring and config-driven session runs.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use log::{Level, Log, Metadata, Record};

use hvac_cosim::config::ScenarioConfig;
use hvac_cosim::io::export::{export_csv, session_file_name};
use hvac_cosim::runner::run_scenario;
use hvac_cosim::sim::kpi::RunSummary;
use hvac_cosim::sim::record::HistoricalRecord;

/// Writes log records to stderr as `[LEVEL target] message`.
struct StderrLogger {
    level: Level,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

fn init_logger(verbose: bool) {
    let level = if verbose { Level::Debug } else { Level::Info };
    let logger = Box::new(StderrLogger { level });
    if log::set_boxed_logger(logger).is_ok() {
        log::set_max_level(level.to_level_filter());
    }
}

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    seed_override: Option<u64>,
    steps_override: Option<usize>,
    telemetry_out: Option<String>,
    verbose: bool,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: u16,
}

fn print_help() {
    eprintln!("hvac-cosim: setpoint-decision engine for building HVAC co-simulation");
    eprintln!();
    eprintln!("Usage: hvac-cosim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>        Load scenario from TOML config file");
    eprintln!(
        "  --preset <name>          Use a built-in preset ({})",
        ScenarioConfig::PRESETS.join(", ")
    );
    eprintln!("  --seed <u64>             Override random seed");
    eprintln!("  --steps <usize>          Override steps per session");
    eprintln!("  --telemetry-out <dir>    Export one CSV record per session");
    eprintln!("  --verbose                Log every control decision");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                  Start REST API server after the run");
        eprintln!("  --port <u16>             API server port (default: 3000)");
    }
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the baseline preset is used.");
}

fn value_of<'a>(args: &'a [String], i: usize, flag: &str, what: &str) -> &'a str {
    match args.get(i) {
        Some(v) => v,
        None => {
            eprintln!("error: {flag} requires {what}");
            process::exit(1);
        }
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, flag: &str, ty: &str) -> T {
    raw.parse().unwrap_or_else(|_| {
        eprintln!("error: {flag} value \"{raw}\" is not a valid {ty}");
        process::exit(1);
    })
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        seed_override: None,
        steps_override: None,
        telemetry_out: None,
        verbose: false,
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        port: 3000,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => {
                i += 1;
                cli.scenario_path = Some(value_of(&args, i, "--scenario", "a path argument").to_string());
            }
            "--preset" => {
                i += 1;
                cli.preset = Some(value_of(&args, i, "--preset", "a name argument").to_string());
            }
            "--seed" => {
                i += 1;
                let raw = value_of(&args, i, "--seed", "a u64 argument");
                cli.seed_override = Some(parse_number(raw, "--seed", "u64"));
            }
            "--steps" => {
                i += 1;
                let raw = value_of(&args, i, "--steps", "a usize argument");
                cli.steps_override = Some(parse_number(raw, "--steps", "usize"));
            }
            "--telemetry-out" => {
                i += 1;
                cli.telemetry_out =
                    Some(value_of(&args, i, "--telemetry-out", "a directory argument").to_string());
            }
            "--verbose" | "-v" => {
                cli.verbose = true;
            }
            #[cfg(feature = "api")]
            "--serve" => {
                cli.serve = true;
            }
            #[cfg(feature = "api")]
            "--port" => {
                i += 1;
                let raw = value_of(&args, i, "--port", "a u16 argument");
                cli.port = parse_number(raw, "--port", "u16");
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn load_scenario(cli: &CliArgs) -> ScenarioConfig {
    // --scenario takes priority, then --preset, then baseline default
    let loaded = if let Some(ref path) = cli.scenario_path {
        ScenarioConfig::from_toml_file(Path::new(path))
    } else if let Some(ref name) = cli.preset {
        ScenarioConfig::from_preset(name)
    } else {
        Ok(ScenarioConfig::baseline())
    };
    let mut scenario = loaded.unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    if let Some(seed) = cli.seed_override {
        scenario.simulation.seed = seed;
    }
    if let Some(steps) = cli.steps_override {
        scenario.simulation.steps = steps;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    scenario
}

fn export_records(dir: &str, records: &[HistoricalRecord]) {
    let dir = PathBuf::from(dir);
    if let Err(e) = fs::create_dir_all(&dir) {
        eprintln!("error: cannot create \"{}\": {e}", dir.display());
        process::exit(1);
    }
    for record in records {
        let path = dir.join(session_file_name(&record.alias));
        if let Err(e) = export_csv(record, &path) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Record for {} written to {}", record.alias, path.display());
    }
}

fn main() {
    let cli = parse_args();
    init_logger(cli.verbose);
    let scenario = load_scenario(&cli);

    let outcomes = run_scenario(&scenario).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    });

    let control_zone = scenario
        .building
        .conditioned_zones
        .first()
        .cloned()
        .unwrap_or_default();
    let mut records = Vec::with_capacity(outcomes.len());
    let mut failed = 0;
    for outcome in outcomes {
        match outcome.result {
            Ok(record) => {
                println!("\n[{}]", outcome.alias);
                println!("{}", RunSummary::from_record(&record, &control_zone));
                records.push(record);
            }
            Err(e) => {
                eprintln!("error: {e}");
                failed += 1;
            }
        }
    }

    if let Some(ref dir) = cli.telemetry_out {
        export_records(dir, &records);
    }

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        let state = Arc::new(hvac_cosim::api::AppState::from_records(records, &control_zone));
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        });
        if let Err(e) = rt.block_on(hvac_cosim::api::serve(state, addr)) {
            eprintln!("error: server failed: {e}");
            process::exit(1);
        }
    }

    if failed > 0 {
        process::exit(1);
    }
}

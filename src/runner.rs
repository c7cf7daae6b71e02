use std::path::PathBuf;

use crate::context::Simulation;
use crate::error::ModelError;
use crate::log::{info, parse_log_levels, set_log_level, set_module_filters, LevelFilter};
use crate::report::SimulationReportExt;
use crate::scenario::Scenario;
use clap::{ArgAction, Args, Command, FromArgMatches as _};

/// File the state report is written to, inside the output directory.
pub const STATE_REPORT_FILE: &str = "state.csv";
/// File the final generation is saved to with `--save-final`.
pub const FINAL_SCENARIO_FILE: &str = "final_scenario.json";

/// Default cli arguments for the sevirds runner
#[derive(Args, Debug, Clone)]
pub struct BaseArgs {
    /// Path of the scenario file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Number of steps to run
    #[arg(short, long, default_value = "100")]
    pub steps: u64,

    /// Directory for report output
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Log level, either a bare level (`info`) or a list of `module=level` pairs
    #[arg(long)]
    pub log_level: Option<String>,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Number of threads cells are computed on
    #[arg(short, long, default_value = "1")]
    pub threads: usize,

    /// Do not show the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Save the last generation as a scenario that can be run again
    #[arg(long)]
    pub save_final: bool,
}

fn create_sevirds_cli() -> Command {
    let cli = Command::new("sevirds");
    BaseArgs::augment_args(cli)
}

/// Runs a scenario with the default cli arguments
///
/// This function parses command line arguments and allows you to define a setup function that
/// runs after the scenario is loaded and before the first step, for example to install a
/// recovered vaccination uptake.
///
/// # Parameters
/// - `setup_fn`: A function that takes a mutable reference to the `Simulation` and the parsed
///   `BaseArgs`
///
/// # Errors
/// Returns an error if argument parsing, loading the scenario, the setup function or the run
/// fails
#[allow(clippy::missing_errors_doc)]
pub fn run_with_args<F>(setup_fn: F) -> Result<Simulation, Box<dyn std::error::Error>>
where
    F: Fn(&mut Simulation, &BaseArgs) -> Result<(), ModelError>,
{
    let cli = create_sevirds_cli();
    let matches = cli.get_matches();

    let base_args_matches = BaseArgs::from_arg_matches(&matches)?;
    Ok(run_with_args_internal(&base_args_matches, setup_fn)?)
}

fn configure_logging(args: &BaseArgs) -> Result<(), ModelError> {
    match args.verbose {
        0 => {}
        1 => set_log_level(LevelFilter::Info),
        2 => set_log_level(LevelFilter::Debug),
        _ => set_log_level(LevelFilter::Trace),
    }
    if let Some(levels) = &args.log_level {
        let (global, modules) = parse_log_levels(levels)?;
        if let Some(level) = global {
            set_log_level(level);
        }
        let filters: Vec<(&String, LevelFilter)> =
            modules.iter().map(|(module, level)| (module, *level)).collect();
        set_module_filters(&filters);
    }
    Ok(())
}

fn run_with_args_internal<F>(args: &BaseArgs, setup_fn: F) -> Result<Simulation, ModelError>
where
    F: Fn(&mut Simulation, &BaseArgs) -> Result<(), ModelError>,
{
    configure_logging(args)?;

    let mut simulation = Scenario::load(&args.config)?.into_simulation()?;
    simulation.set_parallelism(args.threads);

    // Run the provided Fn
    setup_fn(&mut simulation, args)?;

    simulation.add_state_report(&args.output_dir.join(STATE_REPORT_FILE))?;

    #[cfg(feature = "progress_bar")]
    if !args.no_progress {
        crate::progress::init_step_progress_bar(&mut simulation, args.steps);
    }

    simulation.execute(args.steps)?;

    if args.save_final {
        let path = args.output_dir.join(FINAL_SCENARIO_FILE);
        Scenario::from_simulation(&simulation).save(&path)?;
        info!("saved final generation to {}", path.display());
    }
    Ok(simulation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::tempdir;

    fn test_args(output_dir: PathBuf) -> BaseArgs {
        BaseArgs {
            config: PathBuf::from("tests/data/two_cells.json"),
            steps: 10,
            output_dir,
            log_level: None,
            verbose: 0,
            threads: 1,
            no_progress: true,
            save_final: false,
        }
    }

    #[test]
    fn cli_parses_defaults() {
        let matches = create_sevirds_cli()
            .try_get_matches_from(["sevirds", "--config", "scenario.json"])
            .unwrap();
        let args = BaseArgs::from_arg_matches(&matches).unwrap();
        assert_eq!(args.config, PathBuf::from("scenario.json"));
        assert_eq!(args.steps, 100);
        assert_eq!(args.output_dir, PathBuf::from("."));
        assert_eq!(args.threads, 1);
        assert!(!args.no_progress);
    }

    #[test]
    fn cli_counts_verbosity() {
        let matches = create_sevirds_cli()
            .try_get_matches_from(["sevirds", "-c", "s.json", "-vv", "--threads", "4"])
            .unwrap();
        let args = BaseArgs::from_arg_matches(&matches).unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.threads, 4);
    }

    #[test]
    fn cli_requires_config() {
        assert!(create_sevirds_cli()
            .try_get_matches_from(["sevirds"])
            .is_err());
    }

    #[test]
    fn test_run_with_args() {
        let temp_dir = tempdir().unwrap();
        let args = test_args(temp_dir.path().to_path_buf());
        let calls = Cell::new(0);
        let simulation = run_with_args_internal(&args, |simulation, args| {
            assert_eq!(simulation.clock(), 0);
            assert_eq!(args.steps, 10);
            calls.set(calls.get() + 1);
            Ok(())
        })
        .unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(simulation.clock(), 10);
        assert!(temp_dir.path().join(STATE_REPORT_FILE).exists());
        assert!(!temp_dir.path().join(FINAL_SCENARIO_FILE).exists());
    }

    #[test]
    fn test_run_with_save_final() {
        let temp_dir = tempdir().unwrap();
        let mut args = test_args(temp_dir.path().to_path_buf());
        args.save_final = true;
        args.threads = 2;
        run_with_args_internal(&args, |_, _| Ok(())).unwrap();
        let saved = Scenario::load(&temp_dir.path().join(FINAL_SCENARIO_FILE)).unwrap();
        assert_eq!(saved.cells.len(), 2);
    }

    #[test]
    fn test_run_with_missing_config() {
        let temp_dir = tempdir().unwrap();
        let mut args = test_args(temp_dir.path().to_path_buf());
        args.config = PathBuf::from("tests/data/does_not_exist.json");
        let result = run_with_args_internal(&args, |_, _| Ok(()));
        assert!(matches!(result, Err(ModelError::IoError(_))));
    }

    #[test]
    fn test_run_with_bad_log_level() {
        let temp_dir = tempdir().unwrap();
        let mut args = test_args(temp_dir.path().to_path_buf());
        args.log_level = Some("loudest".to_string());
        assert!(run_with_args_internal(&args, |_, _| Ok(())).is_err());
    }

    #[test]
    fn test_run_with_module_log_levels() {
        let temp_dir = tempdir().unwrap();
        let mut args = test_args(temp_dir.path().to_path_buf());
        args.log_level = Some("sevirds::report=info, sevirds::scenario=warn".to_string());
        let simulation = run_with_args_internal(&args, |_, _| Ok(())).unwrap();
        assert_eq!(simulation.clock(), 10);
    }

    #[test]
    fn setup_errors_stop_the_run() {
        let temp_dir = tempdir().unwrap();
        let args = test_args(temp_dir.path().to_path_buf());
        let result = run_with_args_internal(&args, |_, _| Err("not today".into()));
        assert!(result.is_err());
        assert!(!temp_dir.path().join(STATE_REPORT_FILE).exists());
    }
}

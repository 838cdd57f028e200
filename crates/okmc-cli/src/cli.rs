use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "OKMC CLI - Anneal radiation damage cascades with object kinetic Monte Carlo.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Anneal every cascade file on its own, each in a fresh simulation box.
    Anneal(RunArgs),
    /// Anneal a sequence of randomly chosen cascades implanted into one growing population.
    Cumulative(CumulativeArgs),
}

/// Arguments shared by every annealing subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    // --- Core Arguments ---
    /// Path to the run configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory receiving step/time logs and defect snapshots.
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Cascade descriptor files, replacing `cascade.files` from the config file.
    /// Can be given multiple times.
    #[arg(short, long = "input", value_name = "PATH")]
    pub inputs: Vec<PathBuf>,

    // --- Run Overrides ---
    /// Override the random seed.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Override the annealing temperature in kelvin.
    #[arg(short = 'T', long, value_name = "FLOAT")]
    pub temperature: Option<f64>,

    /// Override the maximum number of kinetic steps per run.
    #[arg(long, value_name = "INT")]
    pub max_steps: Option<u64>,

    /// Override the maximum simulated time per run, in seconds.
    #[arg(long, value_name = "FLOAT")]
    pub max_time: Option<f64>,

    /// Disable elastic interactions between defects, overriding the config file.
    #[arg(long)]
    pub no_elastic: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S run.temperature=800
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `cumulative` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct CumulativeArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Number of cascades to implant, overriding `cascade.count` and `cascade.fluence`.
    #[arg(short = 'n', long, value_name = "INT")]
    pub cascades: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn anneal_accepts_repeated_inputs_and_overrides() {
        let cli = Cli::try_parse_from([
            "okmc", "-vv", "anneal", "-c", "run.toml", "-i", "a.xyz", "-i", "b.xyz", "--seed",
            "7", "-T", "900", "--no-elastic", "-S", "run.max-steps=10",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Anneal(args) = cli.command else {
            panic!("expected the anneal subcommand");
        };
        assert_eq!(args.inputs.len(), 2);
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.temperature, Some(900.0));
        assert!(args.no_elastic);
        assert_eq!(args.set_values, vec!["run.max-steps=10".to_string()]);
    }

    #[test]
    fn cumulative_takes_a_cascade_count() {
        let cli = Cli::try_parse_from(["okmc", "cumulative", "-c", "run.toml", "-n", "25"]).unwrap();
        let Commands::Cumulative(args) = cli.command else {
            panic!("expected the cumulative subcommand");
        };
        assert_eq!(args.cascades, Some(25));
        assert_eq!(args.run.config, Some(PathBuf::from("run.toml")));
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["okmc", "-q", "-v", "anneal"]).is_err());
    }
}

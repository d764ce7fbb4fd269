//! Command-line interface definition using clap.

use clap::{CommandFactory, Parser, Subcommand, ValueEnum, ValueHint};
use clap_complete::{Shell, generate};
use std::io;
use std::path::PathBuf;

/// Dump the tracebacks of a simulated runtime from signal handlers.
#[derive(Parser, Debug)]
#[command(name = "faultdump")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Scenario file describing the threads and their call stacks
    ///
    /// Defaults to `scenario.toml` in the faultdump config directory, then
    /// to a built-in scenario.
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub scenario: Option<PathBuf>,

    /// Host runtime shared library to load instead of a scenario
    #[arg(long, global = true, value_hint = ValueHint::FilePath, conflicts_with = "scenario")]
    pub host_library: Option<PathBuf>,

    /// Write dumps to this file instead of standard error
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Dump every thread, not only the current one
    #[arg(short, long, global = true)]
    pub all_threads: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dump the tracebacks now
    Dump,
    /// Enable the fatal handlers, then crash
    Crash {
        #[arg(value_enum)]
        fault: Fault,
    },
    /// Schedule a dump after a delay and wait for it
    Later {
        /// Delay in seconds
        delay: i64,

        /// Dump again every `delay` seconds
        #[arg(long)]
        repeat: bool,

        /// Seconds to wait before exiting (default: delay + 1)
        #[arg(long)]
        wait: Option<f64>,

        /// Cancel the schedule after this many seconds
        #[arg(long)]
        cancel_after: Option<f64>,
    },
    /// Register a user signal and deliver it
    Signal {
        /// Signal number
        signum: i32,

        /// Wait this many seconds for the signal to come from outside
        /// instead of raising it. Prints `ready` once registered.
        #[arg(long)]
        wait: Option<f64>,

        /// Unregister the signal afterwards and print the result
        #[arg(long)]
        unregister: bool,
    },
    /// Show the fatal signals and toggle the fatal handlers
    Status,
    /// Scenario file management
    Scenario {
        #[command(subcommand)]
        action: ScenarioAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ScenarioAction {
    /// Write the built-in scenario to the config directory
    Init {
        /// Overwrite an existing scenario file
        #[arg(long, short)]
        force: bool,
    },
    /// Print the scenario in effect
    Show,
}

/// Fault to trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Fault {
    /// Segmentation fault (read from an inaccessible page)
    Segv,
    /// Floating point exception
    Fpe,
    /// Bus error
    Bus,
    /// Illegal instruction
    Ill,
}

impl Cli {
    /// Print shell completions to stdout.
    pub fn print_completions(shell: Shell) {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "faultdump", &mut io::stdout());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["faultdump", "crash", "segv", "--all-threads", "-o", "out.txt"])
            .unwrap();
        assert!(cli.all_threads);
        assert_eq!(cli.output, Some(PathBuf::from("out.txt")));
        assert!(matches!(cli.command, Commands::Crash { fault: Fault::Segv }));
    }

    #[test]
    fn test_scenario_conflicts_with_host_library() {
        let result = Cli::try_parse_from([
            "faultdump",
            "--scenario",
            "a.toml",
            "--host-library",
            "libhost.so",
            "dump",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_later_options() {
        let cli = Cli::try_parse_from(["faultdump", "later", "2", "--repeat", "--cancel-after", "1.5"])
            .unwrap();
        match cli.command {
            Commands::Later {
                delay,
                repeat,
                wait,
                cancel_after,
            } => {
                assert_eq!(delay, 2);
                assert!(repeat);
                assert_eq!(wait, None);
                assert_eq!(cancel_after, Some(1.5));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

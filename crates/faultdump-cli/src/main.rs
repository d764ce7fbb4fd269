//! faultdump: crash, time out or signal a simulated runtime and watch the
//! traceback dumps.

mod cli;
mod scenario;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, Fault, ScenarioAction};
use faultdump_host::{FileRef, HostLibrary, install_host};
use nix::sys::resource::{Resource, setrlimit};
use nix::sys::signal::{Signal, raise};
use scenario::{Scenario, init_scenario, load_scenario, load_scenario_from_path};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Completions { shell } => {
            Cli::print_completions(*shell);
            return Ok(());
        }
        Commands::Scenario { action } => {
            return handle_scenario_command(&cli, action);
        }
        _ => {}
    }

    install_runtime(&cli)?;
    let output = open_output(cli.output.as_deref())?;

    let result = match &cli.command {
        Commands::Dump => faultdump_core::dump_traceback(output, cli.all_threads).map_err(Into::into),
        Commands::Crash { fault } => crash(*fault, output, cli.all_threads),
        Commands::Later {
            delay,
            repeat,
            wait,
            cancel_after,
        } => later(*delay, *repeat, *wait, *cancel_after, output, cli.all_threads),
        Commands::Signal {
            signum,
            wait,
            unregister,
        } => signal(*signum, *wait, *unregister, output, cli.all_threads),
        Commands::Status => status(output),
        Commands::Scenario { .. } | Commands::Completions { .. } => Ok(()),
    };

    faultdump_core::unload();
    result
}

fn effective_scenario(cli: &Cli) -> Scenario {
    match &cli.scenario {
        Some(path) => load_scenario_from_path(path),
        None => load_scenario(),
    }
}

/// Install the host runtime and attach the main thread to it.
fn install_runtime(cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.host_library {
        let library = HostLibrary::load_static(path)
            .with_context(|| format!("Failed to load host library {}", path.display()))?;
        install_host(library)?;
        log::info!("Host library loaded from {}", path.display());
        return Ok(());
    }

    let scenario = effective_scenario(cli);
    log::debug!("Scenario: {:?}", scenario);
    let host = scenario.build_host().leak();
    install_host(host)?;
    host.bind_current_thread(scenario.current_index());
    Ok(())
}

fn open_output(path: Option<&Path>) -> Result<Option<FileRef>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let file = File::create(path)
        .with_context(|| format!("Failed to open output file {}", path.display()))?;
    Ok(Some(Arc::new(file)))
}

fn handle_scenario_command(cli: &Cli, action: &ScenarioAction) -> Result<()> {
    match action {
        ScenarioAction::Init { force } => {
            let path = init_scenario(*force)?;
            println!("Scenario file created at: {}", path.display());
        }
        ScenarioAction::Show => {
            print!("{}", scenario::to_toml(&effective_scenario(cli))?);
        }
    }
    Ok(())
}

fn crash(fault: Fault, output: Option<FileRef>, all_threads: bool) -> Result<()> {
    if let Err(e) = setrlimit(Resource::RLIMIT_CORE, 0, 0) {
        log::warn!("Could not disable core dumps: {}", e);
    }
    faultdump_core::enable(output, all_threads)?;
    log::info!("Triggering {:?}", fault);

    match fault {
        Fault::Segv => faultdump_core::fault::sigsegv(),
        Fault::Fpe => faultdump_core::fault::sigfpe(),
        Fault::Bus => faultdump_core::fault::sigbus(),
        Fault::Ill => faultdump_core::fault::sigill(),
    }
}

fn sleep_secs(secs: f64) -> Result<()> {
    let duration = Duration::try_from_secs_f64(secs).context("Invalid duration")?;
    thread::sleep(duration);
    Ok(())
}

fn later(
    delay: i64,
    repeat: bool,
    wait: Option<f64>,
    cancel_after: Option<f64>,
    output: Option<FileRef>,
    all_threads: bool,
) -> Result<()> {
    faultdump_core::dump_traceback_later(delay, repeat, output, all_threads)?;

    let wait = wait.unwrap_or(delay as f64 + 1.0);
    match cancel_after {
        Some(cancel_after) if cancel_after < wait => {
            sleep_secs(cancel_after)?;
            faultdump_core::cancel_dump_traceback_later();
            log::info!("Dump cancelled");
            sleep_secs(wait - cancel_after)
        }
        _ => sleep_secs(wait),
    }
}

fn signal(
    signum: i32,
    wait: Option<f64>,
    unregister: bool,
    output: Option<FileRef>,
    all_threads: bool,
) -> Result<()> {
    faultdump_core::register(signum, output, all_threads)?;

    match wait {
        Some(wait) => {
            let mut stdout = std::io::stdout();
            writeln!(stdout, "ready")?;
            stdout.flush()?;
            sleep_secs(wait)?;
        }
        None => {
            let signal = Signal::try_from(signum)
                .with_context(|| format!("Cannot raise signal {}", signum))?;
            raise(signal)?;
        }
    }

    if unregister {
        println!("unregister: {}", faultdump_core::unregister(signum));
    }
    Ok(())
}

fn status(output: Option<FileRef>) -> Result<()> {
    for (signum, name) in faultdump_core::fatal_signals() {
        println!("signal {}: {}", signum, name);
    }
    println!("enabled: {}", faultdump_core::is_enabled());
    faultdump_core::enable(output, false)?;
    println!("enabled: {}", faultdump_core::is_enabled());
    println!("disable: {}", faultdump_core::disable());
    println!("enabled: {}", faultdump_core::is_enabled());
    Ok(())
}

use anyhow::Context;
use clap::Parser;
use gentle_kill::signal::{Signal, TerminationRequest};
use gentle_kill::utils::logger::init_logger;
use gentle_kill::KillConfig;
use std::path::PathBuf;
use std::process::ExitCode;

/// Send a POSIX-style signal to Windows processes and their descendants
#[derive(Parser, Debug)]
#[command(name = "gentle-kill", version, about)]
struct Cli {
    /// Signal name or number (INT, QUIT, TERM, KILL, 9, ...)
    #[arg(short = 's', long = "signal", value_name = "SIGNAL", default_value = "TERM")]
    signal: Signal,

    /// Raw exit status to request instead of 128 + signal
    #[arg(long, value_name = "STATUS", conflicts_with = "signal")]
    status: Option<u32>,

    /// Only terminate the given processes, not their descendants
    #[arg(long)]
    single: bool,

    /// Configuration file (overrides GENTLE_KILL_CONFIG)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `gentle_kill=trace`
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Target process ids
    #[arg(required = true, value_name = "PID")]
    pids: Vec<u32>,
}

impl Cli {
    fn request(&self) -> TerminationRequest {
        match self.status {
            Some(status) => TerminationRequest::from_raw(status),
            None => TerminationRequest::for_signal(self.signal),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("gentle-kill: {err:#}");
            ExitCode::from(2)
        }
    }
}

/// `Ok(false)` when at least one target could not be terminated.
fn run(cli: &Cli) -> anyhow::Result<bool> {
    let config = KillConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_logger(
        cli.log_level.as_deref().or(config.logging.level.as_deref()),
        config.logging.file.clone(),
    )?;
    kill_all(cli, &config)
}

#[cfg(windows)]
fn kill_all(cli: &Cli, config: &KillConfig) -> anyhow::Result<bool> {
    use gentle_kill::GentleKiller;

    let killer = GentleKiller::win32(config);
    let request = cli.request();
    let mut all_ok = true;

    for &pid in &cli.pids {
        if cli.single {
            match killer.kill_pid(pid, request) {
                Ok(technique) => println!("{pid}: terminated via {technique}"),
                Err(err) => {
                    all_ok = false;
                    println!("{pid}: {err}");
                }
            }
            continue;
        }

        match killer.kill_tree(pid, request) {
            Ok(report) => {
                let suffix = if report.truncated { " (truncated)" } else { "" };
                println!(
                    "{pid}: {} of {} processes terminated{suffix}",
                    report.terminated(),
                    report.outcomes.len()
                );
                for err in report.errors() {
                    println!("{pid}:   {err}");
                }
                all_ok &= report.is_success();
            }
            Err(err) => {
                all_ok = false;
                println!("{pid}: {err}");
            }
        }
    }

    Ok(all_ok)
}

#[cfg(not(windows))]
fn kill_all(cli: &Cli, _config: &KillConfig) -> anyhow::Result<bool> {
    tracing::debug!(pids = ?cli.pids, request = %cli.request(), "refusing to run");
    Err(gentle_kill::KillError::UnsupportedPlatform(
        "gentle-kill drives Win32 processes and only runs on Windows",
    )
    .into())
}

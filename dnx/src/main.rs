mod cli;
mod probe;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;

use dnx_core::config::HostConfig;
use dnx_coreclr::resolver::RuntimeLayout;
use dnx_coreclr::{call_application_main, CallData, HResult};

fn main() {
    dnx_core::observability::init_tracing();
    let cli = Cli::parse();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    if cli.probe {
        let report = probe::probe(&HostConfig::from_env(), &RuntimeLayout::native())?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(0);
    }

    let mut data = CallData::new(cli.args, application_base(cli.appbase)?);
    if let Some(dir) = cli.runtime_dir {
        data = data.with_runtime_directory(absolute(dir)?);
    }
    tracing::debug!("appbase {}", data.application_base.display());

    match call_application_main(&mut data) {
        Ok(()) => Ok(data.exit_code.unwrap_or(0)),
        Err(e) => {
            eprintln!("{}", e);
            Ok(failure_exit_code(e.hresult()))
        }
    }
}

/// Process status for a failed handoff. Never 0, so a failure can't pass for success.
#[cfg(windows)]
fn failure_exit_code(hr: HResult) -> i32 {
    if hr.0 == 0 {
        1
    } else {
        hr.0
    }
}

/// Process status for a failed handoff. Only the low byte survives on Unix, so a code
/// like 0x80131500 is mapped to 1 instead of reading as success.
#[cfg(not(windows))]
fn failure_exit_code(hr: HResult) -> i32 {
    match hr.0 & 0xff {
        0 => 1,
        low => low,
    }
}

/// Absolute application base, defaulting to the current directory.
fn application_base(appbase: Option<PathBuf>) -> Result<PathBuf> {
    match appbase {
        Some(p) => absolute(p),
        None => std::env::current_dir().context("Failed to read current directory"),
    }
}

/// Relative paths are taken from the current directory.
fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(cwd.join(path))
}

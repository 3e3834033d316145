#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! `soarm`: operator CLI for the SO-ARM controller.

mod cli;
mod commands;
mod error_fmt;

use std::path::Path;

use clap::Parser;
use eyre::{WrapErr, eyre};
use soarm_config::{Config, Logging};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    // only fails if a hook is already installed
    let _ = color_eyre::install();

    let result = run(&cli);
    flush_log_file();
    if let Err(e) = result {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn flush_log_file() {
    let guard = FILE_GUARD
        .lock()
        .map_or_else(|p| p.into_inner().take(), |mut g| g.take());
    drop(guard);
}

fn run(cli: &Cli) -> eyre::Result<()> {
    let (cfg, defaulted) = load_config(&cli.config)?;
    init_tracing(&cfg.logging, cli.log_level.as_deref(), cli.json)?;
    if defaulted {
        tracing::info!(path = %cli.config.display(), "config file not found; using defaults");
    }
    commands::dispatch(cli, &cfg)
}

/// Missing file means defaults; a file that exists must parse and validate.
fn load_config(path: &Path) -> eyre::Result<(Config, bool)> {
    if !path.exists() {
        return Ok((Config::default(), true));
    }
    let cfg = soarm_config::load_file(path)
        .wrap_err_with(|| format!("invalid configuration in {}", path.display()))?;
    Ok((cfg, false))
}

/// Console logs go to stderr, pretty or JSON. `[logging].file` adds a JSON
/// file layer behind a non-blocking writer whose guard lives in `FILE_GUARD`.
fn init_tracing(cfg: &Logging, cli_level: Option<&str>, json: bool) -> eyre::Result<()> {
    let level = cli_level.or(cfg.level.as_deref()).unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| eyre!("invalid log level {level:?}: {e}"))?;

    let console = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_target(false).with_writer(std::io::stderr).boxed()
    };

    let file = match cfg.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre!("logging.file {} has no file name", path.display()))?;
            let appender = match cfg.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            if let Ok(mut slot) = FILE_GUARD.lock() {
                *slot = Some(guard);
            }
            Some(fmt::layer().json().with_ansi(false).with_writer(writer).boxed())
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| eyre!("install tracing subscriber: {e}"))
}

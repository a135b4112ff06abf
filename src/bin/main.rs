//! CLI entry point (§6): one required positional argument (the
//! configuration file path), `--help`/`--check` flags, and the exit
//! codes §6 specifies (0 clean shutdown, 1 configuration error, 2
//! runtime error on startup, 3 unexpected termination).

use std::process::ExitCode;

use server_proxy::config::AppConfig;
use server_proxy::{rt, server};

fn usage() {
    eprintln!("usage: server_proxy [--help] [--check] <config-file>");
    eprintln!();
    eprintln!("  --help    print this message and exit");
    eprintln!("  --check   parse the configuration and exit without serving");
    eprintln!();
    eprintln!("environment:");
    eprintln!("  COBRA_LOG_LEVEL   trace|debug|info|warn|error (default info)");
}

struct Args {
    check_only: bool,
    config_path: Option<String>,
}

fn parse_args(raw: &[String]) -> Args {
    let mut check_only = false;
    let mut config_path = None;
    for arg in raw {
        match arg.as_str() {
            "--check" => check_only = true,
            _ => config_path = Some(arg.clone()),
        }
    }
    Args { check_only, config_path }
}

/// Reads and validates `COBRA_LOG_LEVEL` before anything else runs, so a
/// bad value is reported as a configuration error (exit 1) rather than
/// silently falling back — matching the same `Result`-propagating path
/// config parse errors take.
fn check_log_level() -> Result<(), String> {
    match std::env::var("COBRA_LOG_LEVEL") {
        Ok(raw) => proxy_log::parse_level(&raw).map(|_| ()).map_err(|bad| {
            format!("COBRA_LOG_LEVEL: unrecognized level {bad:?} (expected trace, debug, info, warn, or error)")
        }),
        Err(_) => Ok(()),
    }
}

fn main() -> ExitCode {
    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    if raw_args.iter().any(|a| a == "--help" || a == "-h") {
        usage();
        return ExitCode::SUCCESS;
    }

    let args = parse_args(&raw_args);
    let Some(config_path) = args.config_path else {
        usage();
        return ExitCode::from(1);
    };

    if let Err(e) = check_log_level() {
        eprintln!("\x1b[31mERROR\x1b[0m: {e}");
        return ExitCode::from(1);
    }

    let content = match std::fs::read_to_string(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("\x1b[31mERROR\x1b[0m: reading {config_path}: {e}");
            return ExitCode::from(1);
        }
    };

    let config = match AppConfig::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(1);
        }
    };

    if args.check_only {
        config.display_config();
        return ExitCode::SUCCESS;
    }

    proxy_log::info!("starting up (log level {:?})", proxy_log::active_level());
    config.display_config();

    match rt::block_on(server::run(config)) {
        Ok(Ok(())) => {
            // Every listener's accept loop exited cleanly — none of them
            // is supposed to under normal operation (§4.K's accept loop
            // runs forever barring an unrecoverable error), so reaching
            // here means the server stopped serving unexpectedly.
            proxy_log::error!("all listeners stopped; exiting");
            ExitCode::from(3)
        }
        Ok(Err(e)) => {
            proxy_log::error!("startup failed: {e}");
            ExitCode::from(2)
        }
        Err(e) => {
            proxy_log::error!("runtime error: {e}");
            ExitCode::from(2)
        }
    }
}

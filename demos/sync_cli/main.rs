//! Interactive front-end for `locksync` (§4.I): collects location specs
//! either from stdin (terminated by a line reading `end`) or from a file
//! (one spec per line, blank lines skipped), then runs the engine until
//! interrupted.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use locksync::location::parse_spec;
use locksync::{Engine, EngineConfig, Location};

#[derive(Parser, Debug)]
#[command(name = "sync_cli", about = "Keep folders, ZIP archives and FTP servers in sync")]
struct Args {
    /// Read location specs from a file instead of prompting on stdin.
    #[arg(long)]
    file: bool,

    /// Optional TOML config file (poll_interval_ms, drain_timeout_ms, log_filter).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("could not read config file {}: {e}", path.display());
                return std::process::ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_filter.clone()))
        .init();

    let lines = if args.file { read_specs_from_file() } else { read_specs_from_stdin() };

    let locations = parse_all(lines);
    if locations.is_empty() {
        eprintln!("no valid locations given, exiting");
        return std::process::ExitCode::FAILURE;
    }

    let mut engine = Engine::new(locations, config);
    engine.initial_sync().await;

    engine.run(async {
        let _ = tokio::signal::ctrl_c().await;
        println!("shutting down...");
    })
    .await;

    std::process::ExitCode::SUCCESS
}

/// Prompts for one location spec per line on stdin until a line reading
/// `end` is entered.
fn read_specs_from_stdin() -> Vec<String> {
    println!("Enter location specs (folder:/zip:/ftp:), one per line. Type `end` to finish.");
    let stdin = std::io::stdin();
    let mut lines = Vec::new();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim();
        if line == "end" {
            break;
        }
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    lines
}

/// Prompts for a path to a file containing one spec per line, then reads it.
fn read_specs_from_file() -> Vec<String> {
    print!("Path to file containing location specs: ");
    let _ = std::io::stdout().flush();
    let mut path = String::new();
    if std::io::stdin().lock().read_line(&mut path).unwrap_or(0) == 0 {
        return Vec::new();
    }
    let path = path.trim();

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            eprintln!("could not read {path}: {e}");
            return Vec::new();
        }
    };

    contents.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect()
}

/// Parses every candidate spec line, reporting and skipping invalid ones.
fn parse_all(lines: Vec<String>) -> Vec<Location> {
    let mut locations = Vec::new();
    for line in lines {
        match parse_spec(&line) {
            Ok(location) => locations.push(location),
            Err(e) => eprintln!("skipping invalid location [{line}]: {e}"),
        }
    }
    locations
}

//! directctl - DirectGate operator tooling

mod commands;

use directgate_common::config::LoggingConfig;
use std::process::ExitCode;
use tracing::debug;

fn main() -> ExitCode {
    let logging = LoggingConfig {
        level: "warn".to_string(),
        ..LoggingConfig::default()
    };
    if let Err(e) = directgate_common::logging::init(&logging) {
        eprintln!("{}", e);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((name, rest)) = args.split_first() else {
        commands::print_help();
        return ExitCode::FAILURE;
    };

    let Some(command) = commands::find(name) else {
        eprintln!("Unknown command: {}", name);
        commands::print_help();
        return ExitCode::FAILURE;
    };

    debug!(command = command.name, "Running command");
    match (command.run)(rest) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", command.name, e);
            ExitCode::FAILURE
        }
    }
}

use clap::Parser;
use clap::error::ErrorKind;
use log::warn;
use sales_ledger::{LedgerError, UpdateReport, cli::Cli, run};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => return emit(&UpdateReport::failure(&usage_error(&e))),
    };

    // stdout carries only the JSON result
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_env(env_logger::Env::default())
        .target(env_logger::Target::Stderr)
        .init();

    if !cli.ignored.is_empty() {
        warn!("ignoring {} extra argument(s)", cli.ignored.len());
    }

    let report = match cli.load_config() {
        Ok(config) => run(cli.booking.as_deref(), &config),
        Err(e) => UpdateReport::failure(&e),
    };
    emit(&report)
}

fn emit(report: &UpdateReport) -> ExitCode {
    println!("{}", report.to_json());
    ExitCode::from(report.exit_code())
}

/// First line of clap's message, without its `error: ` prefix.
fn usage_error(e: &clap::Error) -> LedgerError {
    let msg = e.to_string();
    let line = msg.lines().next().unwrap_or_default();
    LedgerError::Usage(line.trim_start_matches("error: ").to_owned())
}

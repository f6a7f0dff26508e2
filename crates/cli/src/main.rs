use clap::Parser;
use std::process::ExitCode;
use ward_cli::Cli;

fn main() -> ExitCode {
    color_eyre::install().ok();
    let cli = Cli::parse();
    ExitCode::from(ward_cli::run(cli))
}

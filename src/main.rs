#![forbid(unsafe_code)]

//! lmkeeper — FlexLM license server supervisor CLI entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        eprintln!("lmkeeper: {e}");
        std::process::exit(e.exit_code());
    }
}

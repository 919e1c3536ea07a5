use std::process::ExitCode;

use benchtrail::{
    cli::{self, Cli},
    logging,
};
use clap::Parser;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.global.log_level);
    match cli::run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(cli::exit_code(&err))
        }
    }
}

use std::process::ExitCode;

use clap::Parser;

fn main() -> ExitCode {
    utagms_cli::init_tracing();
    let cli = utagms_cli::Cli::parse();
    match utagms_cli::run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", utagms_cli::error_envelope(&err));
            ExitCode::from(utagms_cli::failure_exit_code(&err))
        }
    }
}

use std::process::ExitCode;

fn main() -> ExitCode {
    rewear_cli::run()
}

use std::process::ExitCode;

fn main() -> ExitCode {
    bridal_cli::run()
}

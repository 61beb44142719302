use std::process::ExitCode;

fn main() -> ExitCode {
    derefconf_cli::run()
}

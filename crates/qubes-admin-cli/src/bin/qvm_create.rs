//! Entry point for `qvm-create`.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    qubes_admin_cli::run_create(
        std::env::args_os(),
        &mut io::stdout().lock(),
        &mut io::stderr().lock(),
    )
}

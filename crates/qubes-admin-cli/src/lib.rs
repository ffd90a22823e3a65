//! Command-line tools for the Qubes admin client.
//!
//! Each tool parses its own arguments with `clap`, loads the shared
//! configuration through [`ConfigLoader`], installs logging, and runs
//! against a [`Qubes`] application root built by an injectable factory. The
//! binaries pass [`Qubes::from_config`]; tests pass a root over a fake
//! transport.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use qubes_admin::Qubes;
use qubes_admin_config::Config;
use tracing::debug;

mod config;
mod create;
mod errors;
mod remove;
pub mod telemetry;

pub use config::{ConfigLoader, OrthoConfigLoader};
pub use errors::CliError;

use config::split_config_arguments;
use create::CreateArgs;
use remove::RemoveArgs;

/// Tracing target for tool-level records.
pub(crate) const CLI_TARGET: &str = "qubes_admin_cli";

/// A command-line tool with its parsed arguments.
pub(crate) trait Tool: Parser {
    /// Performs the tool's work against `app`.
    fn execute(self, app: &Qubes) -> Result<(), CliError>;
}

/// Runs `qvm-create` with the process configuration sources.
#[must_use]
pub fn run_create<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_tool::<CreateArgs, _, _, _, _, _>(
        args,
        stdout,
        stderr,
        &OrthoConfigLoader,
        Qubes::from_config,
    )
}

/// Runs `qvm-remove` with the process configuration sources.
#[must_use]
pub fn run_remove<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_tool::<RemoveArgs, _, _, _, _, _>(
        args,
        stdout,
        stderr,
        &OrthoConfigLoader,
        Qubes::from_config,
    )
}

/// Parses `args` as tool `T`, then runs it against the root from `factory`.
///
/// Help and version requests print to `stdout` and succeed. Argument errors
/// print to `stderr` with `clap`'s exit status; every other failure prints
/// `<tool>: error: <message>` and exits with status 1.
pub(crate) fn run_tool<T, I, W, E, L, F>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
    factory: F,
) -> ExitCode
where
    T: Tool,
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader + ?Sized,
    F: FnOnce(&Config) -> Qubes,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);
    let tool = match T::try_parse_from(&split.tool_arguments) {
        Ok(tool) => tool,
        Err(error) => return report_parse_error(&error, stdout, stderr),
    };

    let result = loader.load(&split.config_arguments).and_then(|config| {
        telemetry::initialise(&config)?;
        let app = factory(&config);
        debug!(target: CLI_TARGET, run_mode = %app.run_mode(), "running tool");
        tool.execute(&app)
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let command = <T as clap::CommandFactory>::command();
            let _ = writeln!(stderr, "{}: error: {error}", command.get_name());
            ExitCode::FAILURE
        }
    }
}

fn report_parse_error<W: Write, E: Write>(
    error: &clap::Error,
    stdout: &mut W,
    stderr: &mut E,
) -> ExitCode {
    let rendered = error.render();
    if error.use_stderr() {
        let _ = write!(stderr, "{rendered}");
    } else {
        let _ = write!(stdout, "{rendered}");
    }
    u8::try_from(error.exit_code()).map_or(ExitCode::FAILURE, ExitCode::from)
}

#[cfg(test)]
mod tests;

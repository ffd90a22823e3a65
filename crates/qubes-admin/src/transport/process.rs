//! Subprocess plumbing shared by the stream and tunnel paths.

use std::io::{self, Write};
use std::process::{Child, Command, Output};
use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::error::AdminError;

use super::TRANSPORT_TARGET;

/// Spawns `command`, feeds `input` to its stdin, and collects its output.
///
/// A child that exits before consuming its input is not an error here;
/// callers judge the exit status.
pub(super) fn communicate(
    command: Command,
    label: &str,
    input: Option<&[u8]>,
) -> Result<Output, AdminError> {
    debug!(
        target: TRANSPORT_TARGET,
        program = label,
        input_bytes = input.map_or(0, <[u8]>::len),
        "spawning helper process"
    );
    let child = spawn(command, label)?;
    collect(child, label, input)
}

/// Spawns `command`, reporting failure as an unreachable endpoint.
pub(crate) fn spawn(mut command: Command, label: &str) -> Result<Child, AdminError> {
    command.spawn().map_err(|source| AdminError::Unreachable {
        endpoint: label.to_owned(),
        message: format!("failed to start: {source}"),
        source: Some(Arc::new(source)),
    })
}

/// Feeds `input` to a running child and waits for its output.
///
/// The input is written from a scoped thread so a child producing lots of
/// output cannot deadlock against a full stdin pipe.
pub(crate) fn collect(
    mut child: Child,
    label: &str,
    input: Option<&[u8]>,
) -> Result<Output, AdminError> {
    let stdin = child.stdin.take();
    let (written, output) = thread::scope(|scope| {
        let writer = scope.spawn(move || feed_stdin(stdin, input));
        let output = child.wait_with_output();
        (writer.join(), output)
    });

    match written {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            return Err(AdminError::communication(
                format!("failed to write to {label}"),
                error,
            ));
        }
        Err(_) => {
            return Err(AdminError::Communication {
                message: format!("stdin writer for {label} panicked"),
                source: None,
            });
        }
    }

    let output = output
        .map_err(|error| AdminError::communication(format!("failed to read from {label}"), error))?;

    debug!(
        target: TRANSPORT_TARGET,
        program = label,
        status = %output.status,
        stdout_bytes = output.stdout.len(),
        stderr = %String::from_utf8_lossy(&output.stderr).trim(),
        "helper process finished"
    );
    Ok(output)
}

fn feed_stdin(stdin: Option<std::process::ChildStdin>, input: Option<&[u8]>) -> io::Result<()> {
    let (Some(mut pipe), Some(bytes)) = (stdin, input) else {
        return Ok(());
    };
    match pipe.write_all(bytes).and_then(|()| pipe.flush()) {
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        result => result,
    }
}

/// Captured standard error as trimmed text.
pub(crate) fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_owned()
}

//! Calls tunnelled through `qrexec-client-vm` from inside a domain.

use std::process::{Command, Stdio};

use camino::{Utf8Path, Utf8PathBuf};
use qubes_admin_config::{Config, RunMode};
use tracing::debug;

use crate::error::AdminError;
use crate::protocol::decode_response;

use super::process::{communicate, stderr_text};
use super::{CallBody, CallRequest, ServiceOptions, TRANSPORT_TARGET, Transport, piped};

const CONTEXT: &str = "inside a domain";

/// Transport used from a managed domain.
///
/// Each call runs `<client> <dest> <method>[+<arg>]` with the payload on
/// standard input and the framed response on standard output.
#[derive(Debug, Clone)]
pub struct RemoteTransport {
    client: Utf8PathBuf,
}

impl RemoteTransport {
    /// Creates a transport that runs `client` for each call.
    #[must_use]
    pub fn new(client: impl Into<Utf8PathBuf>) -> Self {
        Self {
            client: client.into(),
        }
    }

    /// Creates a transport from the configured client path.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.qrexec_client_vm())
    }

    /// Path of the tunnel client.
    #[must_use]
    pub fn client(&self) -> &Utf8Path {
        &self.client
    }
}

/// Builds the qrexec service token for a call.
///
/// The argument is appended after a literal `+`. An argument that itself
/// contains `+` cannot be told apart on the receiving side.
#[must_use]
pub fn service_token(method: &str, arg: Option<&str>) -> String {
    match arg {
        Some(arg) => format!("{method}+{arg}"),
        None => method.to_owned(),
    }
}

impl Transport for RemoteTransport {
    fn call(&self, mut request: CallRequest) -> Result<Vec<u8>, AdminError> {
        let body = request.take_body()?;
        let token = service_token(request.method(), request.arg());
        debug!(
            target: TRANSPORT_TARGET,
            dest = request.dest(),
            service = %token,
            streamed = matches!(body, CallBody::Stream(_)),
            "dispatching admin call through qrexec"
        );

        let mut command = Command::new(self.client.as_std_path());
        command
            .args([request.dest(), token.as_str()])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let payload = match body {
            CallBody::Stream(stream) => {
                command.stdin(stream.into_stdio());
                None
            }
            CallBody::Bytes(payload) => {
                command.stdin(Stdio::piped());
                Some(payload)
            }
            CallBody::Empty => {
                command.stdin(Stdio::piped());
                None
            }
        };

        let output = communicate(command, self.client.as_str(), payload.as_deref())?;
        if !output.status.success() {
            return Err(AdminError::ServiceFailed {
                command: format!("{} {} {token}", self.client, request.dest()),
                status: output.status,
                stderr: stderr_text(&output),
            });
        }
        decode_response(&output.stdout)
    }

    fn service_command(
        &self,
        dest: &str,
        service: &str,
        options: &ServiceOptions,
    ) -> Result<Command, AdminError> {
        if options.filter_esc() {
            return Err(AdminError::Unsupported {
                operation: "escape sequence filtering".to_owned(),
                context: CONTEXT.to_owned(),
            });
        }
        if options.requested_user().is_some() {
            return Err(AdminError::usage(
                "non-default user not possible for calls from a domain",
            ));
        }
        options.check_wait_compatible()?;
        if !options.wait() {
            return Err(AdminError::Unsupported {
                operation: "starting a service without waiting".to_owned(),
                context: CONTEXT.to_owned(),
            });
        }

        let local_words = match options.requested_local_command() {
            Some(local) => shlex::split(local).ok_or_else(|| {
                AdminError::usage(format!("cannot split local command '{local}'"))
            })?,
            None => Vec::new(),
        };

        let mut command = Command::new(self.client.as_std_path());
        command.args([dest, service]).args(local_words);
        piped(&mut command);
        Ok(command)
    }

    fn run_mode(&self) -> RunMode {
        RunMode::Remote
    }
}

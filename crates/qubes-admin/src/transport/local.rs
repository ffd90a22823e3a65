//! Direct access to the daemon socket from the admin domain.

use std::io::Read;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::process::{Command, Stdio};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use qubes_admin_config::{Config, RunMode};
use tracing::debug;

use crate::error::AdminError;
use crate::protocol::{SOURCE, decode_response, write_request};

use super::process::{communicate, stderr_text};
use super::{CallBody, CallRequest, PayloadStream, ServiceOptions, TRANSPORT_TARGET, Transport, piped};

/// Environment variable naming the calling domain for service executables.
const REMOTE_DOMAIN_VAR: &str = "QREXEC_REMOTE_DOMAIN";
/// Environment variable naming the call destination for service executables.
const REQUESTED_TARGET_VAR: &str = "QREXEC_REQUESTED_TARGET";

/// Transport used when the daemon socket is reachable.
///
/// Every call opens a fresh connection, sends the framed request, half-closes
/// the socket, and reads until the daemon closes its side. Calls carrying a
/// payload stream bypass the socket and run the method's service executable
/// instead, which lets bulk transfers avoid copying through this process.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    socket: Utf8PathBuf,
    services_dir: Utf8PathBuf,
    qrexec_client: Utf8PathBuf,
}

impl LocalTransport {
    /// Creates a transport from explicit paths.
    #[must_use]
    pub fn new(
        socket: impl Into<Utf8PathBuf>,
        services_dir: impl Into<Utf8PathBuf>,
        qrexec_client: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            socket: socket.into(),
            services_dir: services_dir.into(),
            qrexec_client: qrexec_client.into(),
        }
    }

    /// Creates a transport from the configured paths.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.admin_socket(),
            config.services_dir(),
            config.qrexec_client(),
        )
    }

    /// Daemon socket path.
    #[must_use]
    pub fn socket(&self) -> &Utf8Path {
        &self.socket
    }

    fn call_socket(&self, request: &CallRequest, payload: &[u8]) -> Result<Vec<u8>, AdminError> {
        let mut stream =
            UnixStream::connect(&self.socket).map_err(|source| AdminError::Unreachable {
                endpoint: self.socket.to_string(),
                message: source.to_string(),
                source: Some(Arc::new(source)),
            })?;

        write_request(
            &stream,
            request.method(),
            request.dest(),
            request.arg(),
            payload,
        )
        .map_err(|error| AdminError::communication("failed to send request", error))?;
        stream
            .shutdown(Shutdown::Write)
            .map_err(|error| AdminError::communication("failed to finish request", error))?;

        let mut raw = Vec::new();
        stream
            .read_to_end(&mut raw)
            .map_err(|error| AdminError::communication("failed to read response", error))?;
        debug!(
            target: TRANSPORT_TARGET,
            method = request.method(),
            response_bytes = raw.len(),
            "received daemon response"
        );
        Ok(raw)
    }

    fn call_service_executable(
        &self,
        request: &CallRequest,
        stream: PayloadStream,
    ) -> Result<Vec<u8>, AdminError> {
        let path = self.services_dir.join(request.method());
        if !path.exists() {
            return Err(AdminError::Unreachable {
                endpoint: path.to_string(),
                message: format!("{path} not found"),
                source: None,
            });
        }

        let mut command = Command::new(path.as_std_path());
        if let Some(arg) = request.arg() {
            command.arg(arg);
        }
        command
            .env(REMOTE_DOMAIN_VAR, SOURCE)
            .env(REQUESTED_TARGET_VAR, request.dest())
            .stdin(stream.into_stdio())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = communicate(command, path.as_str(), None)?;
        // The executable writes a framed response; its exit status only
        // matters when that response is unusable.
        match decode_response(&output.stdout) {
            Err(AdminError::Protocol { .. }) if !output.status.success() => {
                Err(AdminError::ServiceFailed {
                    command: path.to_string(),
                    status: output.status,
                    stderr: stderr_text(&output),
                })
            }
            result => result,
        }
    }
}

impl Transport for LocalTransport {
    fn call(&self, mut request: CallRequest) -> Result<Vec<u8>, AdminError> {
        let body = request.take_body()?;
        debug!(
            target: TRANSPORT_TARGET,
            dest = request.dest(),
            method = request.method(),
            arg = request.arg(),
            streamed = matches!(body, CallBody::Stream(_)),
            "dispatching admin call over local socket"
        );
        let raw = match body {
            CallBody::Stream(stream) => return self.call_service_executable(&request, stream),
            CallBody::Bytes(payload) => self.call_socket(&request, &payload)?,
            CallBody::Empty => self.call_socket(&request, &[])?,
        };
        decode_response(&raw)
    }

    fn service_command(
        &self,
        dest: &str,
        service: &str,
        options: &ServiceOptions,
    ) -> Result<Command, AdminError> {
        if dest.is_empty() {
            return Err(AdminError::usage(
                "empty destination name allowed only from a domain",
            ));
        }
        options.check_wait_compatible()?;

        let mut command = Command::new(self.qrexec_client.as_std_path());
        command.args(["-d", dest]);
        if options.filter_esc() {
            command.args(["-t", "-T"]);
        }
        if let Some(local) = options.requested_local_command() {
            command.args(["-l", local]);
        }
        if !options.wait() {
            command.arg("-e");
        }
        let user = options.requested_user().unwrap_or("DEFAULT");
        command.arg(format!("{user}:QUBESRPC {service} {SOURCE}"));
        piped(&mut command);
        Ok(command)
    }

    fn run_mode(&self) -> RunMode {
        RunMode::Local
    }
}

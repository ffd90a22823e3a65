//! Call dispatch to the admin daemon.
//!
//! A [`Transport`] turns one [`CallRequest`] into one exchange with the
//! daemon and hands back the decoded success body. Two implementations
//! exist: [`LocalTransport`] talks to the daemon socket directly and
//! [`RemoteTransport`] goes through the qrexec client available inside a
//! managed domain. Neither retries, pools connections, or imposes deadlines.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::process::{ChildStdout, Command, Stdio};
use std::rc::Rc;

use qubes_admin_config::{Config, RunMode};

use crate::error::AdminError;

mod local;
mod process;
mod remote;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use self::local::LocalTransport;
pub(crate) use self::process::{collect, spawn, stderr_text};
pub use self::remote::{RemoteTransport, service_token};

#[cfg(any(test, feature = "test-support"))]
pub use self::fake::{CallKey, FakeTransport, ServiceKey};

/// Tracing target for call dispatch.
pub(crate) const TRANSPORT_TARGET: &str = "qubes_admin::transport";

/// Dispatches admin calls and builds service invocations.
pub trait Transport {
    /// Performs one call and returns the daemon's success body.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Usage`] before any I/O when the request carries
    /// both an in-memory payload and a payload stream, and the transport or
    /// daemon failure otherwise.
    fn call(&self, request: CallRequest) -> Result<Vec<u8>, AdminError>;

    /// Builds the process that runs `service` in `dest`.
    ///
    /// The command is returned unspawned with all standard streams piped.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Usage`] or [`AdminError::Unsupported`] when the
    /// options cannot be honoured in this run mode.
    fn service_command(
        &self,
        dest: &str,
        service: &str,
        options: &ServiceOptions,
    ) -> Result<Command, AdminError>;

    /// Run mode this transport implements.
    fn run_mode(&self) -> RunMode;
}

/// Builds the transport selected by `config`.
///
/// [`RunMode::Auto`] is resolved by probing for the admin socket.
#[must_use]
pub fn transport_for(config: &Config) -> Rc<dyn Transport> {
    match config.resolved_run_mode() {
        RunMode::Local | RunMode::Auto => Rc::new(LocalTransport::from_config(config)),
        RunMode::Remote => Rc::new(RemoteTransport::from_config(config)),
    }
}

/// One admin API call.
///
/// Method names are dot-separated (`admin.vm.List`); the daemon decides
/// which ones exist.
#[derive(Debug)]
pub struct CallRequest {
    dest: String,
    method: String,
    arg: Option<String>,
    payload: Option<Vec<u8>>,
    payload_stream: Option<PayloadStream>,
}

/// Body of a validated request.
#[derive(Debug)]
pub enum CallBody {
    /// No payload at all.
    Empty,
    /// In-memory payload bytes.
    Bytes(Vec<u8>),
    /// Payload read from an owned stream.
    Stream(PayloadStream),
}

impl CallRequest {
    /// Creates a request for `method` against `dest`.
    #[must_use]
    pub fn new(dest: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            dest: dest.into(),
            method: method.into(),
            arg: None,
            payload: None,
            payload_stream: None,
        }
    }

    /// Sets the single-line method argument.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.arg = Some(arg.into());
        self
    }

    /// Sets the argument when one is given.
    #[must_use]
    pub fn with_optional_arg(mut self, arg: Option<&str>) -> Self {
        self.arg = arg.map(str::to_owned);
        self
    }

    /// Attaches an in-memory payload.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Attaches a payload stream; the call takes ownership and closes it.
    #[must_use]
    pub fn with_payload_stream(mut self, stream: PayloadStream) -> Self {
        self.payload_stream = Some(stream);
        self
    }

    /// Destination domain.
    #[must_use]
    pub fn dest(&self) -> &str {
        &self.dest
    }

    /// Full method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Method argument, if any.
    #[must_use]
    pub fn arg(&self) -> Option<&str> {
        self.arg.as_deref()
    }

    /// In-memory payload, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// Returns `true` when a payload stream is attached.
    #[must_use]
    pub const fn has_payload_stream(&self) -> bool {
        self.payload_stream.is_some()
    }

    /// Removes and validates the payload.
    ///
    /// When both kinds of payload are present the stream stays in the request
    /// and is closed when the request is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Usage`] when both a payload and a payload stream
    /// are attached.
    pub fn take_body(&mut self) -> Result<CallBody, AdminError> {
        if self.payload.is_some() && self.payload_stream.is_some() {
            return Err(AdminError::usage(
                "only one of payload and payload stream can be used",
            ));
        }
        if let Some(stream) = self.payload_stream.take() {
            return Ok(CallBody::Stream(stream));
        }
        Ok(self.payload.take().map_or(CallBody::Empty, CallBody::Bytes))
    }
}

/// Owned byte stream used as a call payload.
///
/// Any file-descriptor backed source works: files, pipes, sockets, or the
/// standard output of another process. Dropping the stream closes it.
pub struct PayloadStream {
    fd: OwnedFd,
}

impl PayloadStream {
    /// Wraps an owned descriptor.
    #[must_use]
    pub const fn from_fd(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Hands the descriptor to a child process as its standard input.
    #[must_use]
    pub fn into_stdio(self) -> Stdio {
        Stdio::from(self.fd)
    }

    /// Reads the stream to its end and closes it.
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub fn read_all(self) -> io::Result<Vec<u8>> {
        let mut contents = Vec::new();
        File::from(self.fd).read_to_end(&mut contents)?;
        Ok(contents)
    }
}

impl fmt::Debug for PayloadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadStream")
            .field("fd", &self.fd.as_raw_fd())
            .finish()
    }
}

impl From<OwnedFd> for PayloadStream {
    fn from(fd: OwnedFd) -> Self {
        Self::from_fd(fd)
    }
}

impl From<File> for PayloadStream {
    fn from(file: File) -> Self {
        Self::from_fd(file.into())
    }
}

impl From<ChildStdout> for PayloadStream {
    fn from(stdout: ChildStdout) -> Self {
        Self::from_fd(stdout.into())
    }
}

impl From<UnixStream> for PayloadStream {
    fn from(stream: UnixStream) -> Self {
        Self::from_fd(stream.into())
    }
}

/// How a service invocation should be set up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    filter_esc: bool,
    user: Option<String>,
    local_command: Option<String>,
    wait: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            filter_esc: false,
            user: None,
            local_command: None,
            wait: true,
        }
    }
}

impl ServiceOptions {
    /// Options for a plain, waited-for invocation as the default user.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters terminal escape sequences from the service output.
    #[must_use]
    pub const fn filter_escapes(mut self, filter: bool) -> Self {
        self.filter_esc = filter;
        self
    }

    /// Runs the service as `user` instead of the default one.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Connects the service to a local command instead of our pipes.
    #[must_use]
    pub fn local_command(mut self, command: impl Into<String>) -> Self {
        self.local_command = Some(command.into());
        self
    }

    /// Returns as soon as the service is started.
    #[must_use]
    pub const fn no_wait(mut self) -> Self {
        self.wait = false;
        self
    }

    /// Whether escape filtering was requested.
    #[must_use]
    pub const fn filter_esc(&self) -> bool {
        self.filter_esc
    }

    /// Requested user, if any.
    #[must_use]
    pub fn requested_user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Requested local command, if any.
    #[must_use]
    pub fn requested_local_command(&self) -> Option<&str> {
        self.local_command.as_deref()
    }

    /// Whether the caller waits for the service to finish.
    #[must_use]
    pub const fn wait(&self) -> bool {
        self.wait
    }

    pub(crate) fn check_wait_compatible(&self) -> Result<(), AdminError> {
        if !self.wait && self.local_command.is_some() {
            return Err(AdminError::usage(
                "not waiting for the service is incompatible with a local command",
            ));
        }
        Ok(())
    }
}

pub(crate) fn piped(command: &mut Command) -> &mut Command {
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
}

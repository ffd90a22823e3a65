//! Shared handle used by every wrapper to reach the daemon.

use std::fmt;
use std::process::Child;
use std::rc::Rc;

use qubes_admin_config::{Config, RunMode};
use tracing::debug;

use crate::error::{AdminError, DaemonErrorKind};
use crate::transport::{
    CallRequest, ServiceOptions, TRANSPORT_TARGET, Transport, collect, spawn, stderr_text,
    transport_for,
};

/// Cloneable handle over the configured [`Transport`].
///
/// Wrappers keep a clone instead of a reference to the application root, so
/// no ownership cycle forms between the root and the objects it hands out.
#[derive(Clone)]
pub struct AdminClient {
    transport: Rc<dyn Transport>,
}

impl fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminClient")
            .field("run_mode", &self.transport.run_mode())
            .finish_non_exhaustive()
    }
}

/// Captured output of a finished service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOutput {
    /// Standard output of the service.
    pub stdout: Vec<u8>,
    /// Standard error of the service.
    pub stderr: Vec<u8>,
}

impl AdminClient {
    /// Wraps an existing transport.
    #[must_use]
    pub fn new(transport: Rc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Builds the transport selected by `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(transport_for(config))
    }

    /// Run mode of the underlying transport.
    #[must_use]
    pub fn run_mode(&self) -> RunMode {
        self.transport.run_mode()
    }

    /// Performs a prepared call.
    ///
    /// # Errors
    ///
    /// Propagates transport and daemon failures unchanged.
    pub fn call(&self, request: CallRequest) -> Result<Vec<u8>, AdminError> {
        self.transport.call(request)
    }

    /// Performs a call with an optional argument and in-memory payload.
    ///
    /// # Errors
    ///
    /// Propagates transport and daemon failures unchanged.
    pub fn qubesd_call(
        &self,
        dest: &str,
        method: &str,
        arg: Option<&str>,
        payload: Option<&[u8]>,
    ) -> Result<Vec<u8>, AdminError> {
        let mut request = CallRequest::new(dest, method).with_optional_arg(arg);
        if let Some(payload) = payload {
            request = request.with_payload(payload);
        }
        self.call(request)
    }

    /// Starts `service` in `dest` with piped standard streams.
    ///
    /// In local mode the destination is started first; a domain that is
    /// already running is not an error.
    ///
    /// # Errors
    ///
    /// Returns option validation errors before anything is started, failures
    /// of the start call, and spawn failures.
    pub fn run_service(
        &self,
        dest: &str,
        service: &str,
        options: &ServiceOptions,
    ) -> Result<Child, AdminError> {
        let command = self.transport.service_command(dest, service, options)?;
        if self.run_mode() == RunMode::Local {
            match self.qubesd_call(dest, "admin.vm.Start", None, None) {
                Ok(_) => {}
                Err(error) if error.is_daemon_kind(DaemonErrorKind::VmNotHalted) => {}
                Err(error) => return Err(error),
            }
        }
        debug!(
            target: TRANSPORT_TARGET,
            dest,
            service,
            program = ?command.get_program(),
            "starting service"
        );
        let label = command.get_program().to_string_lossy().into_owned();
        spawn(command, &label)
    }

    /// Runs `service` to completion, feeding `input` to it.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::ServiceFailed`] when the service exits
    /// unsuccessfully, along with any error from [`Self::run_service`].
    pub fn run_service_for_stdio(
        &self,
        dest: &str,
        service: &str,
        input: Option<&[u8]>,
        options: &ServiceOptions,
    ) -> Result<ServiceOutput, AdminError> {
        let child = self.run_service(dest, service, options)?;
        let output = collect(child, service, input)?;
        if !output.status.success() {
            return Err(AdminError::ServiceFailed {
                command: format!("service '{service}' in {dest}"),
                status: output.status,
                stderr: stderr_text(&output),
            });
        }
        Ok(ServiceOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Runs a shell command in `dest` through `qubes.VMShell`.
    ///
    /// # Errors
    ///
    /// As for [`Self::run_service_for_stdio`].
    pub fn run(
        &self,
        dest: &str,
        command: &str,
        input: Option<&[u8]>,
        options: &ServiceOptions,
    ) -> Result<ServiceOutput, AdminError> {
        let shell_input = vm_shell_input(command, input);
        self.run_service_for_stdio(dest, "qubes.VMShell", Some(&shell_input), options)
    }
}

/// Builds the `qubes.VMShell` input: the command, `; exit`, then the data.
#[must_use]
pub fn vm_shell_input(command: &str, input: Option<&[u8]>) -> Vec<u8> {
    let mut shell_input = command.trim_end_matches('\n').as_bytes().to_vec();
    shell_input.extend_from_slice(b"; exit\n");
    shell_input.extend_from_slice(input.unwrap_or_default());
    shell_input
}

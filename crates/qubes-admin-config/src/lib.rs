//! Shared configuration for the Qubes admin client and its tools.
//!
//! The [`Config`] type replaces the module-level globals that used to pin the
//! admin socket, the qrexec client binaries, and the services directory. It
//! is loaded through `ortho_config`, so every field can be supplied by a
//! configuration file, a `QUBES_ADMIN_*` environment variable, or a CLI flag,
//! in increasing order of precedence.

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;
mod run_mode;

pub use defaults::{
    DEFAULT_ADMIN_SOCKET, DEFAULT_LOG_FILTER, DEFAULT_QREXEC_CLIENT, DEFAULT_QREXEC_CLIENT_VM,
    DEFAULT_SERVICES_DIR, default_admin_socket, default_log_filter, default_log_filter_string,
    default_log_format, default_qrexec_client, default_qrexec_client_vm, default_run_mode,
    default_services_dir,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use run_mode::{RunMode, RunModeParseError};

/// Resolved configuration shared by the library and the command-line tools.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "QUBES_ADMIN")]
pub struct Config {
    /// How the admin daemon is reached: `auto`, `local`, or `remote`.
    #[ortho_config(default = default_run_mode())]
    pub run_mode: RunMode,
    /// Unix socket of the admin daemon, used in local mode.
    #[ortho_config(default = default_admin_socket())]
    pub admin_socket: Utf8PathBuf,
    /// Client used to run services in other domains from the admin domain.
    #[ortho_config(default = default_qrexec_client())]
    pub qrexec_client: Utf8PathBuf,
    /// Client used to reach the daemon from inside a managed domain.
    #[ortho_config(default = default_qrexec_client_vm())]
    pub qrexec_client_vm: Utf8PathBuf,
    /// Directory holding per-method service executables.
    #[ortho_config(default = default_services_dir())]
    pub services_dir: Utf8PathBuf,
    /// `tracing` filter expression for the tools.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log records.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_mode: default_run_mode(),
            admin_socket: default_admin_socket(),
            qrexec_client: default_qrexec_client(),
            qrexec_client_vm: default_qrexec_client_vm(),
            services_dir: default_services_dir(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Configured run mode, possibly [`RunMode::Auto`].
    #[must_use]
    pub const fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    /// Run mode with [`RunMode::Auto`] resolved against the filesystem.
    ///
    /// Auto selects the local socket when it exists and the remote tunnel
    /// otherwise.
    #[must_use]
    pub fn resolved_run_mode(&self) -> RunMode {
        self.run_mode.resolve(self.admin_socket())
    }

    /// Path of the admin daemon socket.
    #[must_use]
    pub fn admin_socket(&self) -> &Utf8Path {
        self.admin_socket.as_path()
    }

    /// Path of the dom0 qrexec client.
    #[must_use]
    pub fn qrexec_client(&self) -> &Utf8Path {
        self.qrexec_client.as_path()
    }

    /// Path of the in-domain qrexec client.
    #[must_use]
    pub fn qrexec_client_vm(&self) -> &Utf8Path {
        self.qrexec_client_vm.as_path()
    }

    /// Directory searched for streamed-payload service executables.
    #[must_use]
    pub fn services_dir(&self) -> &Utf8Path {
        self.services_dir.as_path()
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_standard_locations() {
        let config = Config::default();
        assert_eq!(config.admin_socket(), Utf8Path::new("/var/run/qubesd.sock"));
        assert_eq!(config.services_dir(), Utf8Path::new("/etc/qubes-rpc"));
        assert_eq!(config.run_mode(), RunMode::Auto);
        assert_eq!(config.log_format(), LogFormat::Compact);
    }

    #[test]
    fn auto_mode_resolves_to_remote_without_socket() {
        let config = Config {
            admin_socket: Utf8PathBuf::from("/nonexistent/qubesd.sock"),
            ..Config::default()
        };
        assert_eq!(config.resolved_run_mode(), RunMode::Remote);
    }

    #[test]
    fn explicit_mode_is_not_resolved_against_filesystem() {
        let config = Config {
            run_mode: RunMode::Local,
            admin_socket: Utf8PathBuf::from("/nonexistent/qubesd.sock"),
            ..Config::default()
        };
        assert_eq!(config.resolved_run_mode(), RunMode::Local);
    }
}

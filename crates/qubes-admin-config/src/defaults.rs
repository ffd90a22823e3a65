use camino::Utf8PathBuf;

use crate::logging::LogFormat;
use crate::run_mode::RunMode;

/// Admin daemon socket used when running in the admin domain.
pub const DEFAULT_ADMIN_SOCKET: &str = "/var/run/qubesd.sock";

/// qrexec client used from the admin domain to run services in domains.
pub const DEFAULT_QREXEC_CLIENT: &str = "/usr/lib/qubes/qrexec-client";

/// qrexec client used from inside a managed domain.
pub const DEFAULT_QREXEC_CLIENT_VM: &str = "/usr/bin/qrexec-client-vm";

/// Directory holding qrexec service implementations.
pub const DEFAULT_SERVICES_DIR: &str = "/etc/qubes-rpc";

/// Default log filter expression used by the tools.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Default log filter expression used by the tools.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the tools.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Default run mode: pick the transport from the environment.
#[must_use]
pub const fn default_run_mode() -> RunMode {
    RunMode::Auto
}

/// Default admin daemon socket path.
#[must_use]
pub fn default_admin_socket() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_ADMIN_SOCKET)
}

/// Default dom0 qrexec client path.
#[must_use]
pub fn default_qrexec_client() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_QREXEC_CLIENT)
}

/// Default in-domain qrexec client path.
#[must_use]
pub fn default_qrexec_client_vm() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_QREXEC_CLIENT_VM)
}

/// Default services directory.
#[must_use]
pub fn default_services_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_SERVICES_DIR)
}

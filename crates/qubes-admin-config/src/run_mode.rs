//! Selection between the local socket and the remote qrexec tunnel.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the admin daemon is reached.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RunMode {
    /// Use the local socket when it exists, the remote tunnel otherwise.
    #[default]
    Auto,
    /// Talk to the daemon socket directly (admin domain).
    Local,
    /// Go through `qrexec-client-vm` (managed domain).
    Remote,
}

/// Errors encountered while parsing a [`RunMode`] from text.
pub type RunModeParseError = strum::ParseError;

impl RunMode {
    /// Resolves [`RunMode::Auto`] by probing for the admin socket.
    ///
    /// Explicit modes are returned unchanged.
    #[must_use]
    pub fn resolve(self, admin_socket: &Utf8Path) -> Self {
        match self {
            Self::Auto if admin_socket.exists() => Self::Local,
            Self::Auto => Self::Remote,
            explicit => explicit,
        }
    }
}

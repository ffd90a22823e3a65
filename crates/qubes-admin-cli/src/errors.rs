//! Error types for the command-line tools.

use std::sync::Arc;

use qubes_admin::AdminError;
use thiserror::Error;

use crate::telemetry::TelemetryError;

/// Failures reported by a tool before it exits unsuccessfully.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration sources could not be merged.
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    /// Logging could not be set up.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The admin daemon or the object model refused the operation.
    #[error(transparent)]
    Admin(#[from] AdminError),
}

/// Parses a `KEY=VALUE` command-line value.
pub(crate) fn parse_assignment(text: &str) -> Result<(String, String), String> {
    match text.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected KEY=VALUE, got '{text}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("netvm=sys-whonix", "netvm", "sys-whonix")]
    #[case("kernel=", "kernel", "")]
    #[case("private=a=b", "private", "a=b")]
    fn splits_at_the_first_equals_sign(
        #[case] text: &str,
        #[case] key: &str,
        #[case] value: &str,
    ) {
        assert_eq!(
            parse_assignment(text),
            Ok((key.to_owned(), value.to_owned()))
        );
    }

    #[rstest]
    #[case("netvm")]
    #[case("=value")]
    fn rejects_values_without_a_key(#[case] text: &str) {
        assert!(parse_assignment(text).is_err());
    }

    #[test]
    fn admin_errors_keep_their_message() {
        let error = CliError::from(AdminError::NotFound {
            entity: "domain",
            name: "work".to_owned(),
        });
        assert_eq!(error.to_string(), "no such domain: 'work'");
    }
}

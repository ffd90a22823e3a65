//! Configuration loading helpers for the command-line tools.
//!
//! Configuration flags lead the argument list; everything after the first
//! token that is not one of them belongs to the tool's own parser.

use std::ffi::{OsStr, OsString};

use ortho_config::OrthoConfig;
use qubes_admin_config::Config;

use crate::CliError;

/// Flags recognised by the configuration loader.
///
/// Kept in sync with the fields of [`Config`].
pub(crate) const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--run-mode",
    "--admin-socket",
    "--qrexec-client",
    "--qrexec-client-vm",
    "--services-dir",
    "--log-filter",
    "--log-format",
];

/// Source of the configuration for one tool invocation.
pub trait ConfigLoader {
    /// Loads configuration from the leading configuration flags.
    ///
    /// `args` starts with the program name and holds only flags listed in
    /// [`CONFIG_CLI_FLAGS`] and their values.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::LoadConfiguration`] when a source cannot be read
    /// or a value does not parse.
    fn load(&self, args: &[OsString]) -> Result<Config, CliError>;
}

/// Loads configuration from files, the environment, and flags.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, CliError> {
        Config::load_from_iter(args.iter().cloned()).map_err(CliError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Stop;
    }
    let (flag, has_inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (text.as_ref(), false),
    };
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !has_inline_value,
        }
    } else {
        FlagAction::Stop
    }
}

/// Arguments partitioned between the configuration loader and the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    /// Program name followed by the leading configuration flags.
    pub(crate) config_arguments: Vec<OsString>,
    /// Program name followed by the tool's own arguments.
    pub(crate) tool_arguments: Vec<OsString>,
}

/// Splits `args` at the first token that is not a configuration flag.
pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let Some((program, rest)) = args.split_first() else {
        return ConfigArgumentSplit {
            config_arguments: Vec::new(),
            tool_arguments: Vec::new(),
        };
    };

    let mut config_arguments = vec![program.clone()];
    let mut remaining = rest.iter().peekable();
    while let Some(argument) = remaining.peek() {
        match classify(argument) {
            FlagAction::Stop => break,
            FlagAction::Include { needs_value } => {
                config_arguments.push((*argument).clone());
                remaining.next();
                if needs_value {
                    if let Some(value) = remaining.next() {
                        config_arguments.push(value.clone());
                    }
                }
            }
        }
    }

    let mut tool_arguments = vec![program.clone()];
    tool_arguments.extend(remaining.cloned());
    ConfigArgumentSplit {
        config_arguments,
        tool_arguments,
    }
}

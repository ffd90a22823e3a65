//! Errors raised while talking to the admin daemon.
//!
//! Every failure in the library surfaces as an [`AdminError`]. Daemon-side
//! exceptions keep their class name and are additionally mapped onto a
//! closed [`DaemonErrorKind`] so callers can match on the common cases
//! without string comparisons. I/O errors are wrapped in `Arc` to keep the
//! enum cheap to move around.

use std::process::ExitStatus;
use std::sync::Arc;

use strum::EnumString;
use thiserror::Error;

/// Errors arising from admin API calls and the local object model.
#[derive(Debug, Clone, Error)]
pub enum AdminError {
    /// The daemon response did not follow the wire framing.
    #[error("malformed daemon response: {message}")]
    Protocol {
        /// Description of the framing violation.
        message: String,
    },

    /// The daemon reported an exception for the call.
    #[error("{message}")]
    Daemon {
        /// Kind derived from the exception class name.
        kind: DaemonErrorKind,
        /// Exception class name as reported by the daemon.
        class: String,
        /// Human-readable message sent with the exception.
        message: String,
    },

    /// The daemon endpoint could not be reached.
    #[error("cannot reach admin daemon at {endpoint}: {message}")]
    Unreachable {
        /// Socket or executable that was tried.
        endpoint: String,
        /// Failure description.
        message: String,
        /// Underlying I/O error, when there is one.
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// Reading from or writing to the transport failed.
    #[error("communication with admin daemon failed: {message}")]
    Communication {
        /// Failure description.
        message: String,
        /// Underlying I/O error, when there is one.
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// A helper process exited unsuccessfully.
    #[error("{command} failed ({status}): {stderr}")]
    ServiceFailed {
        /// Program or service that was run.
        command: String,
        /// Exit status of the process.
        status: ExitStatus,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The caller violated a precondition; nothing was sent.
    #[error("{message}")]
    Usage {
        /// Description of the violated precondition.
        message: String,
    },

    /// The operation cannot be performed in the current run mode.
    #[error("{operation} is not supported when running {context}")]
    Unsupported {
        /// Operation that was requested.
        operation: String,
        /// Where the library is running.
        context: String,
    },

    /// A lookup in a local collection found no such entry.
    #[error("no such {entity}: '{name}'")]
    NotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// Key used for the lookup.
        name: String,
    },

    /// The daemon listed a domain with a class this library does not know.
    #[error("no such VM class: '{class}'")]
    UnknownClass {
        /// Class tag from the listing.
        class: String,
    },

    /// A value returned by the daemon could not be interpreted.
    #[error("invalid value for {field}: '{value}'")]
    InvalidValue {
        /// Field or property being decoded.
        field: String,
        /// Offending raw value.
        value: String,
    },
}

impl AdminError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub(crate) fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    pub(crate) fn communication(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Communication {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    pub(crate) fn invalid_value(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Builds the structured error for a daemon exception.
    #[must_use]
    pub fn daemon(class: impl Into<String>, message: impl Into<String>) -> Self {
        let class = class.into();
        Self::Daemon {
            kind: DaemonErrorKind::from_class_name(&class),
            class,
            message: message.into(),
        }
    }

    /// Kind of the daemon exception, if this error came from the daemon.
    #[must_use]
    pub const fn daemon_kind(&self) -> Option<DaemonErrorKind> {
        match self {
            Self::Daemon { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns `true` when the daemon reported an exception of `kind`.
    #[must_use]
    pub fn is_daemon_kind(&self, kind: DaemonErrorKind) -> bool {
        self.daemon_kind() == Some(kind)
    }

    /// Returns `true` for local collection misses.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Daemon exception classes the library distinguishes.
///
/// Names not in the table map to [`DaemonErrorKind::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString)]
pub enum DaemonErrorKind {
    /// Generic daemon failure.
    #[strum(serialize = "QubesException")]
    Generic,
    /// The requested domain does not exist.
    #[strum(serialize = "QubesVMNotFoundError")]
    VmNotFound,
    /// Generic domain failure.
    #[strum(serialize = "QubesVMError")]
    VmError,
    /// The domain is in use by another domain.
    #[strum(serialize = "QubesVMInUseError")]
    VmInUse,
    /// The domain is not started.
    #[strum(serialize = "QubesVMNotStartedError")]
    VmNotStarted,
    /// The domain is not running.
    #[strum(serialize = "QubesVMNotRunningError")]
    VmNotRunning,
    /// The domain is not paused.
    #[strum(serialize = "QubesVMNotPausedError")]
    VmNotPaused,
    /// The domain is not suspended.
    #[strum(serialize = "QubesVMNotSuspendedError")]
    VmNotSuspended,
    /// The domain is not halted (for example it is already running).
    #[strum(serialize = "QubesVMNotHaltedError")]
    VmNotHalted,
    /// The domain did not shut down in time.
    #[strum(serialize = "QubesVMShutdownTimeoutError")]
    VmShutdownTimeout,
    /// A domain with that name already exists.
    #[strum(serialize = "QubesVMAlreadyExistsError")]
    VmAlreadyExists,
    /// The domain has no template.
    #[strum(serialize = "QubesNoTemplateError")]
    NoTemplate,
    /// The storage pool is still in use.
    #[strum(serialize = "QubesPoolInUseError")]
    PoolInUse,
    /// A value was rejected.
    #[strum(serialize = "QubesValueError")]
    Value,
    /// A property value was rejected.
    #[strum(serialize = "QubesPropertyValueError")]
    PropertyValue,
    /// The property does not exist.
    #[strum(serialize = "QubesNoSuchPropertyError")]
    NoSuchProperty,
    /// The label does not exist.
    #[strum(serialize = "QubesLabelNotFoundError")]
    LabelNotFound,
    /// The feature is not set.
    #[strum(serialize = "QubesFeatureNotFoundError")]
    FeatureNotFound,
    /// The tag is not set.
    #[strum(serialize = "QubesTagNotFoundError")]
    TagNotFound,
    /// Not enough memory to start the domain.
    #[strum(serialize = "QubesMemoryError")]
    Memory,
    /// The method is not implemented for this target.
    #[strum(serialize = "QubesNotImplementedError")]
    NotImplemented,
    /// A storage pool operation failed.
    #[strum(serialize = "StoragePoolException")]
    StoragePool,
    /// Any class name missing from this table.
    #[strum(disabled)]
    Unknown,
}

impl DaemonErrorKind {
    /// Maps a daemon exception class name onto a kind.
    #[must_use]
    pub fn from_class_name(class: &str) -> Self {
        class.parse().unwrap_or(Self::Unknown)
    }
}

use crate::backup::result_error::{AddFunctionName, AddMsg};
use itertools::Itertools;
use std::fmt::Debug;
use std::path::PathBuf;
use thiserror::Error;
use thiserror_ext::Construct;

#[derive(Error, Debug, Construct)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    LettreEmail(#[from] lettre::error::Error),
    #[error(transparent)]
    LettreSmtp(#[from] lettre::transport::smtp::Error),
    #[error(transparent)]
    LettreAddress(#[from] lettre::address::AddressError),
    #[error("Missing required job field {field:?}")]
    MissingField { field: String },
    #[error("Invalid value for job field {field:?}: {reason}")]
    InvalidField { field: String, reason: String },
    #[error("Target directory {path:?} does not exist")]
    TargetNotFound { path: String },
    #[error("Malformed configuration {path:?}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },
    #[error("Snapshot creation for volume {volume} failed: {reason}")]
    SnapshotCreation { volume: String, reason: String },
    #[error("Mounting snapshot {snapshot_id} at {mount_path:?} failed with exit code {code:?}: {stderr}")]
    SnapshotMount {
        snapshot_id: String,
        mount_path: PathBuf,
        code: Option<i32>,
        stderr: String,
    },
    #[error("Deleting snapshot {snapshot_id} failed with exit code {code:?}: {stderr}")]
    SnapshotDeletion {
        snapshot_id: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("Sync tool exited with code {code:?} while copying {source_path:?}")]
    SyncToolExit {
        code: Option<i32>,
        source_path: String,
    },
    #[error("Translating path {path:?} failed: {reason}")]
    PathTranslation { path: String, reason: String },
    #[error("Failed to spawn {program:?}: {reason}")]
    Spawn { program: PathBuf, reason: String },
    #[error("Smtp server rejected message: {0}")]
    SmtpSendError(String),
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{} failed:\n{}", fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithFunctionName { fn_name: String, error: Box<Error> },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

/// Coarse classification of a failure, used by the CLI to pick a message and
/// by callers deciding whether a failure notification applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    MissingField,
    InvalidField,
    MalformedConfig,
    TargetNotFound,
    ToolFailure,
    Other,
}

impl ErrorCategory {
    pub fn describe(&self) -> &'static str {
        match self {
            ErrorCategory::MissingField => "A required job parameter is missing",
            ErrorCategory::InvalidField => "A job parameter has an invalid value",
            ErrorCategory::MalformedConfig => "A configuration or job file could not be read",
            ErrorCategory::TargetNotFound => "The backup target directory does not exist",
            ErrorCategory::ToolFailure => "An external tool failed during the backup",
            ErrorCategory::Other => "The backup failed",
        }
    }
}

impl<S: Into<String>> AddMsg<S> for Error {
    fn add_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl<S: Into<String>> AddFunctionName<S> for Error {
    fn add_fn_name(self, fn_name: S) -> Self {
        Self::WithFunctionName {
            fn_name: fn_name.into(),
            error: Box::new(self),
        }
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        if errors.is_empty() {
            panic!("Should not create lots of errors when error is empty")
        }
        Self::LotsOfError(errors.into_iter().flat_map(|e| e.into_iter()).collect_vec())
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(|e| e.into_iter())),
            e => Box::new(std::iter::once(e)),
        }
    }

    /// Combines two errors, `self` first. The first error stays the
    /// authoritative one for [`Error::category`].
    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    /// Underlying failures with message and function-name context peeled off.
    pub fn root_causes(&self) -> Vec<&Error> {
        match self {
            Error::WithMsg { error, .. } | Error::WithFunctionName { error, .. } => {
                error.root_causes()
            }
            Error::LotsOfError(errors) => errors.iter().flat_map(Error::root_causes).collect(),
            e => vec![e],
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.root_causes().first() {
            Some(Error::MissingField { .. }) => ErrorCategory::MissingField,
            Some(Error::InvalidField { .. }) => ErrorCategory::InvalidField,
            Some(Error::ConfigParse { .. }) => ErrorCategory::MalformedConfig,
            Some(Error::TargetNotFound { .. }) => ErrorCategory::TargetNotFound,
            Some(Error::SnapshotCreation { .. })
            | Some(Error::SnapshotMount { .. })
            | Some(Error::SnapshotDeletion { .. })
            | Some(Error::SyncToolExit { .. })
            | Some(Error::PathTranslation { .. })
            | Some(Error::Spawn { .. }) => ErrorCategory::ToolFailure,
            _ => ErrorCategory::Other,
        }
    }
}

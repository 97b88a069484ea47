use std::fmt;
use std::path::PathBuf;

/// Main error type for snapshot and restore runs
#[derive(Debug)]
pub enum SnapshotError {
    Io {
        source: std::io::Error,
        context: String,
    },
    /// The manifest cannot drive a run (unresolved remote or revision).
    Configuration {
        message: String,
        path: Option<PathBuf>,
    },
    /// Existing state conflicts with the requested operation; `--force` resolves it.
    Precondition {
        project: Option<String>,
        reason: String,
    },
    /// History that cannot be anchored to a recoverable commit.
    Structural {
        project: String,
        reason: String,
    },
    Command {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    NotFound {
        resource: String,
        identifier: String,
    },
    ReadOnly {
        path: String,
    },
    Archive {
        operation: String,
        reason: String,
    },
    Manifest {
        reason: String,
    },
    Validation {
        field: String,
        value: String,
        reason: String,
    },
}

impl SnapshotError {
    pub fn precondition(project: Option<&str>, reason: impl Into<String>) -> Self {
        SnapshotError::Precondition {
            project: project.map(str::to_string),
            reason: reason.into(),
        }
    }

    pub fn structural(project: &str, reason: impl Into<String>) -> Self {
        SnapshotError::Structural {
            project: project.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SnapshotError::NotFound { .. })
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, SnapshotError::Precondition { .. })
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, SnapshotError::Structural { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, SnapshotError::Configuration { .. })
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::Io { context, source } => {
                write!(f, "IO error during {}: {}", context, source)
            }
            SnapshotError::Configuration { message, path } => {
                if let Some(path) = path {
                    write!(f, "Configuration error in {}: {}", path.display(), message)
                } else {
                    write!(f, "Configuration error: {}", message)
                }
            }
            SnapshotError::Precondition { project, reason } => {
                if let Some(project) = project {
                    write!(f, "Project '{}': {} (use --force to override)", project, reason)
                } else {
                    write!(f, "{} (use --force to override)", reason)
                }
            }
            SnapshotError::Structural { project, reason } => {
                write!(f, "Project '{}' cannot be snapshotted safely: {}", project, reason)
            }
            SnapshotError::Command { command, exit_code, stderr } => {
                if let Some(code) = exit_code {
                    write!(f, "Command '{}' failed with exit code {}: {}", command, code, stderr.trim())
                } else {
                    write!(f, "Command '{}' failed: {}", command, stderr.trim())
                }
            }
            SnapshotError::NotFound { resource, identifier } => {
                write!(f, "{} '{}' not found", resource, identifier)
            }
            SnapshotError::ReadOnly { path } => {
                write!(f, "Cannot write '{}': archive is opened read-only", path)
            }
            SnapshotError::Archive { operation, reason } => {
                write!(f, "Archive error during {}: {}", operation, reason)
            }
            SnapshotError::Manifest { reason } => {
                write!(f, "Invalid manifest: {}", reason)
            }
            SnapshotError::Validation { field, value, reason } => {
                write!(f, "Validation error for {} '{}': {}", field, value, reason)
            }
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

pub trait ErrorContext<T> {
    fn with_io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::result::Result<T, std::io::Error> {
    fn with_io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SnapshotError::Io {
            source: e,
            context: f(),
        })
    }
}

/// Zip I/O failures stay `Io`; format problems become `Archive`
impl<T> ErrorContext<T> for std::result::Result<T, zip::result::ZipError> {
    fn with_io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| match e {
            zip::result::ZipError::Io(source) => SnapshotError::Io { source, context: f() },
            other => SnapshotError::Archive {
                operation: f(),
                reason: other.to_string(),
            },
        })
    }
}

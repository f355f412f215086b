use std::path::PathBuf;

/// Errors surfaced by the pull pipeline.
///
/// Every per-session failure maps to one of these kinds; the run loop logs
/// the error and moves on to the next session rather than aborting.
#[derive(Debug)]
pub enum PullError {
    /// The telemetry API or replica answered with a non-success status.
    Unavailable {
        what: &'static str,
        status: u16,
        detail: String,
    },
    /// No label matched the configured category for the session.
    NotFound { what: String },
    /// The raw time-series file could not be parsed.
    Malformed { path: PathBuf, detail: String },
    /// Filesystem failure (directory creation, temp write, rename).
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Replica database failure (connect or query).
    Db { source: sqlx::Error },
    /// HTTP transport failure before any status was received.
    Http { source: reqwest::Error },
}

impl std::fmt::Display for PullError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PullError::Unavailable {
                what,
                status,
                detail,
            } => {
                write!(f, "{what} unavailable (status {status}): {detail}")
            }
            PullError::NotFound { what } => write!(f, "{what} not found"),
            PullError::Malformed { path, detail } => {
                write!(f, "malformed time-series file {}: {}", path.display(), detail)
            }
            PullError::Io { path, source } => {
                write!(f, "I/O error at {}: {}", path.display(), source)
            }
            PullError::Db { source } => write!(f, "replica database error: {source}"),
            PullError::Http { source } => write!(f, "HTTP transport error: {source}"),
        }
    }
}

impl std::error::Error for PullError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PullError::Io { source, .. } => Some(source),
            PullError::Db { source } => Some(source),
            PullError::Http { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_status_and_detail() {
        let err = PullError::Unavailable {
            what: "session list",
            status: 503,
            detail: "upstream timeout".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("session list"));
        assert!(msg.contains("503"));
        assert!(msg.contains("upstream timeout"));
    }

    #[test]
    fn test_io_error_exposes_source() {
        use std::error::Error;
        let err = PullError::Io {
            path: PathBuf::from("processed_data/flow"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("processed_data/flow"));
    }
}

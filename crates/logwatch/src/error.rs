use std::{io, path::Path, time::Duration};

use thiserror::Error;

use crate::record::Record;

/// Errors raised while validating a parser configuration.
///
/// These are construction-time failures: they are returned synchronously
/// from [`Watcher::new`](crate::Watcher::new) and never appear on the
/// notification stream.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported parse method: configure exactly one of pattern, json, or a custom function")]
    UnsupportedMethod,
    #[error("pattern declares {captures} capture groups but {field_names} field names were given")]
    FieldCountMismatch { captures: usize, field_names: usize },
    #[error("schema is not valid JSON: {0}")]
    SchemaJson(#[source] serde_json::Error),
    #[error("schema failed to compile: {message}")]
    SchemaCompile { message: String },
}

/// Errors surfaced as `error` notifications while tailing and parsing.
///
/// None of these aborts the watcher; tailing continues past every one of
/// them. The payload is kept clonable (kind plus message strings rather
/// than live sources) so the same notification can reach every subscriber.
#[derive(Debug, Error, Clone)]
pub enum WatchError {
    #[error("{op} failed for `{target}`: {message}")]
    Io {
        op: &'static str,
        target: String,
        kind: io::ErrorKind,
        message: String,
    },
    #[error("invalid UTF-8 in log line")]
    InvalidUtf8,
    #[error("line did not match the configured pattern: `{line}`")]
    PatternViolation { line: String },
    #[error("malformed JSON log line: {message}: `{line}`")]
    MalformedDocument { line: String, message: String },
    #[error("log line violates the configured schema: `{line}`")]
    SchemaViolation { line: String, violations: Vec<String> },
    #[error("custom parser failed: {message}: `{line}`")]
    CustomParse { line: String, message: String },
    #[error("byte stream source was already consumed by a previous start")]
    SourceExhausted,
}

impl WatchError {
    pub(crate) fn from_io(op: &'static str, path: &Path, source: &io::Error) -> Self {
        Self::Io {
            op,
            target: path.display().to_string(),
            kind: source.kind(),
            message: source.to_string(),
        }
    }

    pub(crate) fn stream_io(source: &io::Error) -> Self {
        Self::Io {
            op: "read",
            target: "<stream>".to_string(),
            kind: source.kind(),
            message: source.to_string(),
        }
    }

    pub(crate) fn watch_setup(path: &Path, source: &notify::Error) -> Self {
        Self::Io {
            op: "watch",
            target: path.display().to_string(),
            kind: io::ErrorKind::Other,
            message: source.to_string(),
        }
    }

    /// True for I/O failures as opposed to parse failures.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// The display message plus any diagnostic detail, as rendered into
    /// aggregated waiter failures.
    pub fn detailed_message(&self) -> String {
        match self {
            Self::SchemaViolation { violations, .. } => {
                let mut out = self.to_string();
                for violation in violations {
                    out.push_str("\n  ");
                    out.push_str(violation);
                }
                out
            }
            other => other.to_string(),
        }
    }
}

/// Failure to construct and start a watcher or reader in one call.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Watch(#[from] WatchError),
}

/// Ways a [`wait_for_match`](crate::LogReader::wait_for_match) call can fail.
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("watcher reported errors before a match arrived:\n{details}")]
    Upstream { details: String },
    #[error("no record matched the template within {timeout:?} ({count} records observed)", count = .records.len())]
    Timeout {
        timeout: Duration,
        /// The records buffered at the moment the deadline expired.
        records: Vec<Record>,
    },
    #[error("first observed record did not match the template: {record}")]
    UnexpectedRecord { record: Record },
    #[error("reader stopped while waiting for a match")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_violation_detail_lists_every_finding() {
        let err = WatchError::SchemaViolation {
            line: "{}".into(),
            violations: vec!["/foo: not a number".into(), "/bar: missing".into()],
        };
        let detail = err.detailed_message();
        assert!(detail.contains("violates the configured schema"));
        assert!(detail.contains("\n  /foo: not a number"));
        assert!(detail.contains("\n  /bar: missing"));
    }

    #[test]
    fn io_errors_are_distinguished_from_parse_errors() {
        let io = WatchError::from_io(
            "stat",
            Path::new("/tmp/app.log"),
            &io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(io.is_io());
        assert!(!WatchError::PatternViolation { line: "x".into() }.is_io());
    }
}

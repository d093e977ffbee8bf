use std::{fmt, sync::Arc, time::Duration};

use regex::Regex;
use serde_json::Value;

use crate::record::Record;

/// A caller-supplied line parser. `Ok(None)` means "ignore this line";
/// errors propagate as parse-error notifications.
pub type CustomParseFn = Arc<
    dyn Fn(&str) -> Result<Option<Record>, Box<dyn std::error::Error + Send + Sync>>
        + Send
        + Sync,
>;

#[derive(Debug, Clone)]
pub(crate) enum SchemaSource {
    Document(Value),
    Text(String),
}

/// Parser configuration, validated once at watcher construction.
///
/// Exactly one of the three modes must be selected; anything else fails
/// with [`ConfigError::UnsupportedMethod`](crate::ConfigError::UnsupportedMethod).
#[derive(Clone, Default)]
pub struct ParserConfig {
    pub(crate) pattern: Option<Regex>,
    pub(crate) field_names: Option<Vec<String>>,
    pub(crate) json: bool,
    pub(crate) schema: Option<SchemaSource>,
    pub(crate) custom: Option<CustomParseFn>,
}

impl ParserConfig {
    /// Pattern mode: each line must match `pattern`, whose capture groups
    /// are bound to `field_names` position by position.
    pub fn pattern<I, S>(pattern: Regex, field_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pattern: Some(pattern),
            field_names: Some(field_names.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Structured-document mode: each line is decoded as a JSON object.
    pub fn json() -> Self {
        Self {
            json: true,
            ..Self::default()
        }
    }

    /// Validates every decoded document against `schema` (JSON Schema).
    /// Only meaningful with [`ParserConfig::json`].
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(SchemaSource::Document(schema));
        self
    }

    /// Like [`ParserConfig::schema`], but the schema arrives as JSON text.
    pub fn schema_text(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(SchemaSource::Text(schema.into()));
        self
    }

    /// Custom mode: `parse` receives each raw line.
    pub fn custom<F>(parse: F) -> Self
    where
        F: Fn(&str) -> Result<Option<Record>, Box<dyn std::error::Error + Send + Sync>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            custom: Some(Arc::new(parse)),
            ..Self::default()
        }
    }
}

impl fmt::Debug for ParserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserConfig")
            .field("pattern", &self.pattern)
            .field("field_names", &self.field_names)
            .field("json", &self.json)
            .field("schema", &self.schema)
            .field("custom", &self.custom.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Behavioral knobs for a [`Watcher`](crate::Watcher).
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Re-stat the file on a fixed interval instead of subscribing to
    /// filesystem change notifications. Use this on filesystems where
    /// notification delivery is unreliable (network mounts and the like).
    pub polling: bool,
    /// Polling period when `polling` is set.
    pub poll_interval: Duration,
    /// In pattern mode, append non-matching lines to the most recent
    /// record instead of reporting them as errors.
    pub allow_pattern_violations: bool,
    /// How long the last pattern-mode record is held back so trailing
    /// continuation lines can still be folded into it.
    pub retained_log_timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            polling: false,
            poll_interval: Duration::from_millis(100),
            allow_pattern_violations: false,
            retained_log_timeout: Duration::from_millis(300),
        }
    }
}

/// Options for a single [`wait_for_match`](crate::LogReader::wait_for_match) call.
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub timeout: Duration,
    /// Fail on the first record that does not match instead of skipping it.
    pub strict: bool,
}

impl WaitOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(3000),
            strict: false,
        }
    }
}

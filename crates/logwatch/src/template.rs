use regex::Regex;
use serde_json::Value;

use crate::record::Record;

/// What a template expects of a single record field.
#[derive(Debug, Clone)]
pub enum FieldMatch {
    /// Native-value equality against the parsed field.
    Literal(Value),
    /// Regular-expression match against the stringified field value.
    Pattern(Regex),
    /// The field must exist; any value satisfies the probe.
    Exists,
}

/// A declarative match criterion over records.
///
/// A record matches when every field entry matches; the empty template
/// matches any record.
///
/// ```
/// use logwatch::Template;
/// use regex::Regex;
///
/// let template = Template::new()
///     .field("level", "error")
///     .matching("msg", Regex::new("disk .* full").unwrap())
///     .exists("time");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Template {
    fields: Vec<(String, FieldMatch)>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects `field` to equal `value` (native-value equality).
    pub fn field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((field.into(), FieldMatch::Literal(value.into())));
        self
    }

    /// Expects the stringified value of `field` to match `pattern`.
    pub fn matching(mut self, field: impl Into<String>, pattern: Regex) -> Self {
        self.fields.push((field.into(), FieldMatch::Pattern(pattern)));
        self
    }

    /// Expects `field` to be present with any value.
    pub fn exists(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), FieldMatch::Exists));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.fields.iter().all(|(field, expected)| {
            let Some(actual) = record.get(field) else {
                return false;
            };
            match expected {
                FieldMatch::Exists => true,
                FieldMatch::Pattern(pattern) => pattern.is_match(&stringify(actual)),
                FieldMatch::Literal(value) => actual == value,
            }
        })
    }
}

/// Strings match their content; other values their compact JSON rendering.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        let mut record = Record::new();
        record.insert("time", "2015-06-18T11:47:46.983Z");
        record.insert("msg", "Lorem ipsum");
        record.insert("foo", 3);
        record
    }

    #[test]
    fn empty_template_matches_everything() {
        assert!(Template::new().matches(&record()));
        assert!(Template::new().matches(&Record::new()));
    }

    #[test]
    fn literals_compare_native_values() {
        assert!(Template::new().field("foo", 3).matches(&record()));
        assert!(!Template::new().field("foo", "3").matches(&record()));
        assert!(!Template::new().field("foo", 4).matches(&record()));
    }

    #[test]
    fn patterns_match_stringified_values() {
        let template = Template::new()
            .matching("msg", Regex::new("Lorem").unwrap())
            .matching("foo", Regex::new("^3$").unwrap());
        assert!(template.matches(&record()));
    }

    #[test]
    fn existence_probe_accepts_any_value_but_not_absence() {
        assert!(Template::new().exists("msg").matches(&record()));
        assert!(!Template::new().exists("bar").matches(&record()));
    }

    #[test]
    fn missing_field_fails_even_for_patterns() {
        let template = Template::new().matching("bar", Regex::new(".*").unwrap());
        assert!(!template.matches(&record()));
    }

    #[test]
    fn template_built_from_a_records_own_fields_matches_it() {
        let record = record();
        let mut template = Template::new();
        for (field, value) in record.iter() {
            template = template.field(field.clone(), value.clone());
        }
        assert!(template.matches(&record));
    }
}

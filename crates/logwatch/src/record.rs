use std::fmt;

use serde_json::{Map, Value};

/// A parsed log entry: an ordered mapping from field name to field value.
///
/// Pattern-mode captures enter as strings; structured mode carries whatever
/// the document held (numbers stay numbers, nested containers stay
/// containers); custom parsers may insert anything `serde_json::Value` can
/// represent. A capture group that did not participate in a match produces
/// no entry at all, never an empty string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Glues continuation text onto `field`, separated by a line terminator.
    /// An absent field is created with `text` as its initial value.
    pub(crate) fn append_to_field(&mut self, field: &str, text: &str) {
        match self.0.get_mut(field) {
            Some(Value::String(existing)) => {
                existing.push('\n');
                existing.push_str(text);
            }
            Some(other) => {
                let rendered = other.to_string();
                *other = Value::String(format!("{rendered}\n{text}"));
            }
            None => {
                self.0.insert(field.to_string(), Value::String(text.to_string()));
            }
        }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_extends_string_fields_with_terminator() {
        let mut record = Record::new();
        record.insert("msg", "first");
        record.append_to_field("msg", "second");
        assert_eq!(record.get("msg"), Some(&Value::String("first\nsecond".into())));
    }

    #[test]
    fn append_creates_absent_fields() {
        let mut record = Record::new();
        record.append_to_field("msg", "only");
        assert_eq!(record.get("msg"), Some(&Value::String("only".into())));
    }

    #[test]
    fn display_renders_fields_in_insertion_order() {
        let mut record = Record::new();
        record.insert("time", "t0");
        record.insert("foo", 3);
        assert_eq!(record.to_string(), r#"{"time":"t0","foo":3}"#);
    }
}

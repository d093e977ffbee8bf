use jsonschema::JSONSchema;
use regex::Regex;
use serde_json::Value;

use crate::{
    config::{CustomParseFn, ParserConfig, SchemaSource},
    error::{ConfigError, WatchError},
    record::Record,
};

/// A validated parser, one of the three mutually exclusive strategies.
pub(crate) enum EntryParser {
    Pattern {
        regex: Regex,
        field_names: Vec<String>,
    },
    Json {
        schema: Option<JSONSchema>,
    },
    Custom(CustomParseFn),
}

impl EntryParser {
    /// Validates the loose configuration into a concrete parser. Ambiguous
    /// or missing mode selection, a capture/field-name arity mismatch, and
    /// an uncompilable schema all fail here, synchronously.
    pub(crate) fn from_config(config: ParserConfig) -> Result<Self, ConfigError> {
        let ParserConfig {
            pattern,
            field_names,
            json,
            schema,
            custom,
        } = config;

        let modes = usize::from(pattern.is_some()) + usize::from(json) + usize::from(custom.is_some());
        if modes != 1 {
            return Err(ConfigError::UnsupportedMethod);
        }
        if field_names.is_some() && pattern.is_none() {
            return Err(ConfigError::UnsupportedMethod);
        }
        if schema.is_some() && !json {
            return Err(ConfigError::UnsupportedMethod);
        }

        if let Some(regex) = pattern {
            let field_names = field_names.unwrap_or_default();
            let captures = regex.captures_len() - 1;
            if captures != field_names.len() {
                return Err(ConfigError::FieldCountMismatch {
                    captures,
                    field_names: field_names.len(),
                });
            }
            return Ok(Self::Pattern { regex, field_names });
        }

        if json {
            let schema = match schema {
                None => None,
                Some(source) => {
                    let document = match source {
                        SchemaSource::Document(document) => document,
                        SchemaSource::Text(text) => {
                            serde_json::from_str(&text).map_err(ConfigError::SchemaJson)?
                        }
                    };
                    let compiled = JSONSchema::compile(&document)
                        .map_err(|err| ConfigError::SchemaCompile {
                            message: err.to_string(),
                        })?;
                    Some(compiled)
                }
            };
            return Ok(Self::Json { schema });
        }

        Ok(Self::Custom(custom.expect("mode count checked above")))
    }

    pub(crate) fn is_pattern(&self) -> bool {
        matches!(self, Self::Pattern { .. })
    }

    /// The field continuation lines are appended to in pattern mode.
    pub(crate) fn last_field_name(&self) -> Option<&str> {
        match self {
            Self::Pattern { field_names, .. } => field_names.last().map(String::as_str),
            _ => None,
        }
    }

    /// Parses one complete line. `Ok(None)` means the line produced no
    /// record and no error (custom parsers may skip lines).
    pub(crate) fn parse_line(&self, line: &str) -> Result<Option<Record>, WatchError> {
        match self {
            Self::Pattern { regex, field_names } => {
                let trimmed = line.trim();
                let Some(captures) = regex.captures(trimmed) else {
                    return Err(WatchError::PatternViolation {
                        line: line.to_string(),
                    });
                };
                let mut record = Record::new();
                for (index, field) in field_names.iter().enumerate() {
                    if let Some(capture) = captures.get(index + 1) {
                        record.insert(field.clone(), capture.as_str());
                    }
                }
                Ok(Some(record))
            }
            Self::Json { schema } => {
                let value: Value =
                    serde_json::from_str(line).map_err(|err| WatchError::MalformedDocument {
                        line: line.to_string(),
                        message: err.to_string(),
                    })?;
                if let Some(schema) = schema {
                    if let Err(findings) = schema.validate(&value) {
                        let mut violations: Vec<String> = findings
                            .map(|finding| {
                                let path = finding.instance_path.to_string();
                                if path.is_empty() {
                                    finding.to_string()
                                } else {
                                    format!("{path}: {finding}")
                                }
                            })
                            .collect();
                        violations.sort();
                        return Err(WatchError::SchemaViolation {
                            line: line.to_string(),
                            violations,
                        });
                    }
                }
                match value {
                    Value::Object(fields) => Ok(Some(Record::from(fields))),
                    _ => Err(WatchError::MalformedDocument {
                        line: line.to_string(),
                        message: "top-level value is not an object".to_string(),
                    }),
                }
            }
            Self::Custom(parse) => parse(line).map_err(|err| WatchError::CustomParse {
                line: line.to_string(),
                message: err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pattern_parser() -> EntryParser {
        EntryParser::from_config(ParserConfig::pattern(
            Regex::new(r"^time=(\S+) \| msg=(.+) \| foo=(\d+)$").unwrap(),
            ["time", "msg", "foo"],
        ))
        .unwrap()
    }

    #[test]
    fn ambiguous_or_empty_configs_are_rejected() {
        assert!(matches!(
            EntryParser::from_config(ParserConfig::default()),
            Err(ConfigError::UnsupportedMethod)
        ));

        let mut both = ParserConfig::pattern(Regex::new("(a)").unwrap(), ["a"]);
        both.json = true;
        assert!(matches!(
            EntryParser::from_config(both),
            Err(ConfigError::UnsupportedMethod)
        ));

        let mut stray_schema = ParserConfig::pattern(Regex::new("(a)").unwrap(), ["a"]);
        stray_schema.schema = Some(SchemaSource::Document(json!({})));
        assert!(matches!(
            EntryParser::from_config(stray_schema),
            Err(ConfigError::UnsupportedMethod)
        ));
    }

    #[test]
    fn capture_and_field_name_counts_must_agree() {
        let config = ParserConfig::pattern(Regex::new(r"(\d+) (\d+)").unwrap(), ["only"]);
        assert!(matches!(
            EntryParser::from_config(config),
            Err(ConfigError::FieldCountMismatch {
                captures: 2,
                field_names: 1
            })
        ));
    }

    #[test]
    fn pattern_mode_binds_captures_to_fields() {
        let record = pattern_parser()
            .parse_line("time=2015-06-18T11:47:46.983Z | msg=Lorem ipsum | foo=3")
            .unwrap()
            .unwrap();
        assert_eq!(record.get("time").unwrap(), "2015-06-18T11:47:46.983Z");
        assert_eq!(record.get("msg").unwrap(), "Lorem ipsum");
        assert_eq!(record.get("foo").unwrap(), "3");
    }

    #[test]
    fn pattern_mode_trims_before_matching() {
        let record = pattern_parser()
            .parse_line("  time=t | msg=m | foo=1  ")
            .unwrap()
            .unwrap();
        assert_eq!(record.get("foo").unwrap(), "1");
    }

    #[test]
    fn absent_capture_groups_are_omitted_from_the_record() {
        let parser = EntryParser::from_config(ParserConfig::pattern(
            Regex::new(r"^msg=(\S+)(?: detail=(\S+))?$").unwrap(),
            ["msg", "detail"],
        ))
        .unwrap();
        let record = parser.parse_line("msg=hello").unwrap().unwrap();
        assert!(record.contains("msg"));
        assert!(!record.contains("detail"));
    }

    #[test]
    fn pattern_mismatch_is_a_violation_carrying_the_raw_line() {
        let err = pattern_parser().parse_line("garbage").unwrap_err();
        assert!(matches!(err, WatchError::PatternViolation { line } if line == "garbage"));
    }

    #[test]
    fn json_mode_keeps_native_value_types() {
        let parser = EntryParser::from_config(ParserConfig::json()).unwrap();
        let record = parser
            .parse_line(r#"{"msg": "hi", "count": 2, "nested": {"ok": true}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(record.get("count").unwrap(), 2);
        assert!(record.get("nested").unwrap().is_object());
    }

    #[test]
    fn json_mode_rejects_non_objects_and_broken_documents() {
        let parser = EntryParser::from_config(ParserConfig::json()).unwrap();
        assert!(matches!(
            parser.parse_line("not json").unwrap_err(),
            WatchError::MalformedDocument { .. }
        ));
        assert!(matches!(
            parser.parse_line("42").unwrap_err(),
            WatchError::MalformedDocument { .. }
        ));
    }

    #[test]
    fn schema_violations_carry_validator_findings() {
        let schema = json!({
            "type": "object",
            "required": ["foo"],
            "properties": {"foo": {"type": "number"}}
        });
        let parser =
            EntryParser::from_config(ParserConfig::json().schema(schema)).unwrap();

        let err = parser.parse_line(r#"{"foo": "not-a-number"}"#).unwrap_err();
        let WatchError::SchemaViolation { violations, .. } = err else {
            panic!("expected a schema violation, got {err:?}");
        };
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("/foo"));

        assert!(parser.parse_line(r#"{"foo": 7}"#).unwrap().is_some());
    }

    #[test]
    fn schema_text_is_parsed_and_bad_schemas_fail_construction() {
        let parser = EntryParser::from_config(
            ParserConfig::json().schema_text(r#"{"type": "object"}"#),
        )
        .unwrap();
        assert!(parser.parse_line(r#"{"a": 1}"#).unwrap().is_some());

        assert!(matches!(
            EntryParser::from_config(ParserConfig::json().schema_text("{broken")),
            Err(ConfigError::SchemaJson(_))
        ));
        assert!(matches!(
            EntryParser::from_config(
                ParserConfig::json().schema(json!({"type": "no-such-type"}))
            ),
            Err(ConfigError::SchemaCompile { .. })
        ));
    }

    #[test]
    fn custom_mode_skips_and_fails_per_the_callback() {
        let parser = EntryParser::from_config(ParserConfig::custom(|line| {
            if line.starts_with('#') {
                return Ok(None);
            }
            if line == "boom" {
                return Err("exploded".into());
            }
            let mut record = Record::new();
            record.insert("raw", line);
            Ok(Some(record))
        }))
        .unwrap();

        assert!(parser.parse_line("# comment").unwrap().is_none());
        assert_eq!(
            parser.parse_line("data").unwrap().unwrap().get("raw").unwrap(),
            "data"
        );
        assert!(matches!(
            parser.parse_line("boom").unwrap_err(),
            WatchError::CustomParse { message, .. } if message == "exploded"
        ));
    }
}

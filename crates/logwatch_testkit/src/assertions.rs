//! The bridge between a failed wait and a test framework: a timeout turns
//! into a panic whose message shows every record the SUT actually wrote.

use logwatch::{LogReader, Record, Template, WaitError, WaitOptions};

/// Awaits a matching record and panics with a rendered failure when none
/// arrives. The panic integrates with any test framework that treats
/// panics as assertion failures.
pub async fn expect_log(reader: &LogReader, template: &Template, options: WaitOptions) -> Record {
    match reader.wait_for_match(template, options).await {
        Ok(record) => record,
        Err(err) => panic!("{}", render_failure(&err)),
    }
}

/// Renders a wait failure for humans. Timeouts list the buffered records
/// so the failure message answers "so what *did* it log?" directly.
pub fn render_failure(err: &WaitError) -> String {
    match err {
        WaitError::Timeout { timeout, records } => {
            let mut out = format!(
                "no log matched within {timeout:?}; {} record(s) observed",
                records.len()
            );
            if records.is_empty() {
                out.push_str(" (the source produced nothing)");
            }
            for record in records {
                out.push_str("\n  ");
                out.push_str(&record.to_string());
            }
            out
        }
        other => format!("log match failed: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timeout_rendering_lists_every_observed_record() {
        let mut record = Record::new();
        record.insert("msg", "something else");
        let err = WaitError::Timeout {
            timeout: Duration::from_millis(500),
            records: vec![record],
        };
        let rendered = render_failure(&err);
        assert!(rendered.contains("no log matched within 500ms"));
        assert!(rendered.contains(r#"{"msg":"something else"}"#));
    }

    #[test]
    fn empty_timeout_rendering_says_so() {
        let err = WaitError::Timeout {
            timeout: Duration::from_secs(3),
            records: Vec::new(),
        };
        assert!(render_failure(&err).contains("produced nothing"));
    }

    #[test]
    fn non_timeout_failures_render_their_message() {
        let err = WaitError::Stopped;
        assert!(render_failure(&err).contains("stopped"));
    }
}

#![forbid(unsafe_code)]
//! Observe what a program under test writes to its logs.
//!
//! The crate tails a log source (a file that may not exist yet, or a byte
//! stream such as a child process's stdout), reassembles complete lines
//! across read chunks, parses each line into a structured [`Record`], and
//! lets a test wait, with a timeout, for a record matching a declarative
//! [`Template`].
//!
//! - [`Watcher`] is the tailing pipeline: source adapter, line
//!   reassembly, one of three parsing strategies ([`ParserConfig`]), and
//!   the hold-the-last-record retention policy that lets multi-line
//!   records (stack traces, dumped configuration) finish before they are
//!   published.
//! - [`LogReader`] wraps a watcher 1:1, buffers every record and error it
//!   publishes, and adds [`wait_for_match`](LogReader::wait_for_match).
//!
//! Only bytes appended after `start` are observed; historical content is
//! never re-read. Parse and I/O failures are published as
//! [`WatchEvent::Error`] notifications and never abort tailing.
//!
//! ```no_run
//! use logwatch::{LogReader, ParserConfig, Template, WaitOptions, WatchOptions};
//! use regex::Regex;
//! use std::path::Path;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ParserConfig::pattern(
//!     Regex::new(r"^time=(\S+) \| msg=(.+) \| foo=(\d+)$")?,
//!     ["time", "msg", "foo"],
//! );
//! let reader = LogReader::started(
//!     Path::new("sut.log"),
//!     config,
//!     WatchOptions::default(),
//! )
//! .await?;
//!
//! let record = reader
//!     .wait_for_match(
//!         &Template::new().matching("msg", Regex::new("Lorem")?),
//!         WaitOptions::default(),
//!     )
//!     .await?;
//! assert_eq!(record.get("foo").unwrap(), "3");
//! # Ok(()) }
//! ```

mod config;
mod error;
mod lines;
mod parser;
mod reader;
mod record;
mod source;
mod template;
mod watcher;

pub use config::{CustomParseFn, ParserConfig, WaitOptions, WatchOptions};
pub use error::{ConfigError, StartError, WaitError, WatchError};
pub use reader::LogReader;
pub use record::Record;
pub use source::{ByteStream, LogSource};
pub use template::{FieldMatch, Template};
pub use watcher::{WatchEvent, Watcher};

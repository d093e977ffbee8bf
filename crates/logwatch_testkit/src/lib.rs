#![forbid(unsafe_code)]
//! Companions for test harnesses built on [`logwatch`]:
//!
//! - [`resilience`] mutates the filesystem under a system under test to
//!   provoke misbehavior worth logging (truncation, lost permissions, a
//!   size-limited tmpfs that will run full).
//! - [`assertions`] turns a failed [`wait_for_match`](logwatch::LogReader::wait_for_match)
//!   into a readable test failure that shows what the SUT actually wrote.

pub mod assertions;
pub mod resilience;

pub use assertions::{expect_log, render_failure};
pub use resilience::ResilienceError;

//! Call-graph profiler core for embedded interpreted runtimes.
//!
//! The host delivers one hook event per function call and return; the
//! profiler interns callsite identity, attributes elapsed time per callsite
//! in an aggregated call tree, and serves full-history or snapshot-windowed
//! reports. Everything runs on the host's single logical thread — contexts
//! (fibers, coroutines) are cooperative and isolated only in their call
//! stacks.

pub mod clock;
pub mod engine;
pub mod error;
pub mod model;
pub mod report;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use engine::{Profiler, SnapshotRange};
pub use error::Error;
pub use report::ReportNode;

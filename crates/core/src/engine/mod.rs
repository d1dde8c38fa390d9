pub mod profiler;
mod stack;

pub use profiler::{Profiler, SnapshotRange};

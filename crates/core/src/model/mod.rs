pub mod callsite;
pub mod counters;
pub mod tree;

pub use callsite::{Callsite, CallsiteId, CallsiteRegistry};
pub use counters::{Counter, CounterArena, CounterId, CounterSnapshot, SnapshotStore};
pub use tree::{CallNode, CallTree, NodeId, NodeTotals};

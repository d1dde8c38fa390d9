//! Counter storage: an append-only block arena plus point-in-time snapshots.
//!
//! The arena grows by whole blocks and never moves an allocated slot, so a
//! `CounterId` handed out on the call hot path stays a two-index lookup for
//! the life of the process. Snapshots are compacted copies in handle order;
//! windowed queries diff two of them.

/// Number of counter slots per arena block.
const DEFAULT_BLOCK_CAPACITY: usize = 1024;

/// Handle of one allocated counter. Issued sequentially, never invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CounterId(u32);

impl CounterId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One fixed-size counter record: how often a callsite was entered and how
/// long it ran exclusive of children. Both fields only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counter {
    pub calls: u64,
    pub self_ns: u64,
}

/// Append-only arena of counter records.
#[derive(Debug)]
pub struct CounterArena {
    block_capacity: usize,
    blocks: Vec<Vec<Counter>>,
    len: usize,
}

impl CounterArena {
    pub fn new() -> Self {
        Self::with_block_capacity(DEFAULT_BLOCK_CAPACITY)
    }

    pub fn with_block_capacity(block_capacity: usize) -> Self {
        assert!(block_capacity > 0, "block capacity must be non-zero");
        Self {
            block_capacity,
            blocks: Vec::new(),
            len: 0,
        }
    }

    /// Allocate a zeroed counter and return its handle.
    pub fn allocate(&mut self) -> CounterId {
        let block = self.len / self.block_capacity;
        if block == self.blocks.len() {
            // A full block is sealed; a fresh one is appended. Existing
            // slots never move.
            self.blocks.push(Vec::with_capacity(self.block_capacity));
        }
        self.blocks[block].push(Counter::default());
        let id = CounterId(self.len as u32);
        self.len += 1;
        id
    }

    pub fn counter(&self, id: CounterId) -> &Counter {
        &self.blocks[id.index() / self.block_capacity][id.index() % self.block_capacity]
    }

    pub fn counter_mut(&mut self, id: CounterId) -> &mut Counter {
        &mut self.blocks[id.index() / self.block_capacity][id.index() % self.block_capacity]
    }

    /// Number of handles issued so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Compacted copy of every counter, in handle order.
    pub fn snapshot(&self) -> CounterSnapshot {
        let mut values = Vec::with_capacity(self.len);
        for block in &self.blocks {
            values.extend_from_slice(block);
        }
        CounterSnapshot { values }
    }
}

impl Default for CounterArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable copy of all counters existing at capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSnapshot {
    values: Vec<Counter>,
}

impl CounterSnapshot {
    /// Value of the counter at capture time, or `None` if the counter was
    /// allocated after the capture (its baseline is zero).
    pub fn get(&self, id: CounterId) -> Option<Counter> {
        self.values.get(id.index()).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Ordered sequence of snapshots, indexed from zero in capture order.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: Vec<CounterSnapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot, returning its index.
    pub fn push(&mut self, snapshot: CounterSnapshot) -> usize {
        self.snapshots.push(snapshot);
        self.snapshots.len() - 1
    }

    pub fn at(&self, index: usize) -> Option<&CounterSnapshot> {
        self.snapshots.get(index)
    }

    /// Number of snapshots captured; valid indices are below this.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

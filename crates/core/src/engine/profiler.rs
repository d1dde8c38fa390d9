//! Event-driven profiler controller.
//!
//! The host delivers one event per function call and return, already
//! serialized by its own single-threaded execution model. The controller
//! resolves callsite identity, keeps one call stack per declared context,
//! and accounts elapsed time into the call tree's counters. Queries and
//! snapshot captures run on the same thread between events, so nothing here
//! locks or blocks.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use hotpath_protocol::{CallKind, ContextId, DebugInfo, FunctionKey};

use super::stack::{CallStack, Frame};
use crate::clock::{Clock, MonotonicClock};
use crate::error::Error;
use crate::model::{CallTree, CallsiteRegistry, CounterArena, SnapshotStore};
use crate::report::{self, ReportNode};

/// Snapshot window for a windowed query: deltas from the `start` capture
/// (process start when omitted) to the `end` capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotRange {
    pub start: Option<usize>,
    pub end: usize,
}

impl SnapshotRange {
    /// Window from process start up to snapshot `end`.
    pub fn up_to(end: usize) -> Self {
        Self { start: None, end }
    }

    /// Window between two snapshots.
    pub fn between(start: usize, end: usize) -> Self {
        Self {
            start: Some(start),
            end,
        }
    }
}

/// Tracing state that exists only while the profiler runs.
struct Engine {
    registry: CallsiteRegistry,
    arena: CounterArena,
    snapshots: SnapshotStore,
    tree: CallTree,
    stacks: HashMap<ContextId, CallStack>,
    active: Option<ContextId>,
}

impl Engine {
    fn new() -> Self {
        let mut arena = CounterArena::new();
        let tree = CallTree::new(&mut arena);
        Self {
            registry: CallsiteRegistry::new(),
            arena,
            snapshots: SnapshotStore::new(),
            tree,
            stacks: HashMap::new(),
            active: None,
        }
    }

    /// Make `context` the active one. The outgoing context's running frame
    /// is parked (credited, timer stopped) but stays on its own stack; the
    /// incoming context's top frame, if any, resumes attributing from `now`.
    fn switch_to(&mut self, context: ContextId, now: u64) -> Result<(), Error> {
        if self.active == Some(context) {
            return Ok(());
        }
        // Checked before anything is mutated so a failed switch leaves the
        // previous context untouched.
        if !self.stacks.contains_key(&context) {
            return Err(Error::UnknownContext(context));
        }
        if let Some(previous) = self.active {
            self.park_current(previous, now);
        }
        if let Some(stack) = self.stacks.get_mut(&context)
            && let Some(top) = stack.top_mut()
        {
            top.entered_at = Some(now);
        }
        self.active = Some(context);
        Ok(())
    }

    /// Stop the context's running frame, crediting elapsed time to its self
    /// counter. No-op if the top frame is already suspended.
    fn park_current(&mut self, context: ContextId, now: u64) {
        let Some(stack) = self.stacks.get_mut(&context) else {
            return;
        };
        let Some(top) = stack.top_mut() else {
            return;
        };
        let Some(entered) = top.entered_at.take() else {
            return;
        };
        let counter = self.tree.node(top.node).counter();
        self.arena.counter_mut(counter).self_ns += now.saturating_sub(entered);
    }

    fn on_call(
        &mut self,
        context: ContextId,
        key: FunctionKey,
        kind: CallKind,
        fetch: impl FnOnce() -> DebugInfo,
        now: u64,
    ) -> Result<(), Error> {
        self.switch_to(context, now)?;

        // Filtered builtins are fully transparent: no frame, no node, and
        // the current frame keeps attributing right through them.
        let Some(site) = self.registry.resolve(key, fetch) else {
            return Ok(());
        };

        let stack = self
            .stacks
            .get_mut(&context)
            .ok_or(Error::UnknownContext(context))?;

        let (parent, replaces_caller) = match stack.top_mut() {
            Some(top) => {
                if let Some(entered) = top.entered_at.take() {
                    let counter = self.tree.node(top.node).counter();
                    self.arena.counter_mut(counter).self_ns += now.saturating_sub(entered);
                }
                (top.node, kind == CallKind::Tail)
            }
            None => (self.tree.root(), false),
        };

        // The child is parented before a tail call pops the caller's frame.
        let node = self.tree.child_of(parent, &site, &mut self.arena);
        if replaces_caller {
            stack.pop();
        }
        stack.push(Frame {
            key,
            node,
            entered_at: Some(now),
        });
        self.arena.counter_mut(self.tree.node(node).counter()).calls += 1;
        Ok(())
    }

    fn on_return(&mut self, context: ContextId, key: FunctionKey, now: u64) -> Result<(), Error> {
        self.switch_to(context, now)?;
        if self.registry.is_filtered(key) {
            return Ok(());
        }

        let stack = self
            .stacks
            .get_mut(&context)
            .ok_or(Error::UnknownContext(context))?;

        // Resync: drop frames whose returns never arrived (non-local exits
        // skip return events). They were credited up to their suspension;
        // nothing more is owed.
        while let Some(top) = stack.top() {
            if top.key == key {
                break;
            }
            stack.pop();
        }

        // Draining the whole stack is the legitimate end of a context's
        // outermost frame, not an error.
        let Some(matched) = stack.pop() else {
            return Ok(());
        };
        if let Some(entered) = matched.entered_at {
            let counter = self.tree.node(matched.node).counter();
            self.arena.counter_mut(counter).self_ns += now.saturating_sub(entered);
        }
        // The caller resumes attributing from the return point.
        if let Some(top) = stack.top_mut() {
            top.entered_at = Some(now);
        }
        Ok(())
    }

    fn report(&mut self, range: Option<SnapshotRange>) -> Result<ReportNode, Error> {
        let (start, end) = match range {
            None => (None, None),
            Some(range) => {
                let snapshots = self.snapshots.len();
                if range.end >= snapshots || range.start.is_some_and(|start| start >= range.end) {
                    return Err(Error::InvalidWindow {
                        start: range.start,
                        end: range.end,
                        snapshots,
                    });
                }
                let start = range.start.and_then(|index| self.snapshots.at(index));
                (start, self.snapshots.at(range.end))
            }
        };
        let totals = self.tree.aggregate(start, end, &self.arena);
        report::build(&self.tree, &totals)
    }
}

/// The profiler: an explicit object, no process-wide state.
///
/// Constructed idle; [`Profiler::start`] brings the tracing state up and
/// [`Profiler::stop`] tears it down. Every other operation fails with
/// [`Error::NotRunning`] while idle.
pub struct Profiler<C = MonotonicClock> {
    clock: C,
    engine: Option<Engine>,
}

impl Profiler<MonotonicClock> {
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::new())
    }
}

impl Default for Profiler<MonotonicClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Profiler<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            engine: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_some()
    }

    /// Begin tracing. Contexts must be declared before their first event.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.engine.is_some() {
            return Err(Error::AlreadyRunning);
        }
        self.engine = Some(Engine::new());
        Ok(())
    }

    /// Tear down all tracing state.
    pub fn stop(&mut self) -> Result<(), Error> {
        match self.engine.take() {
            Some(_) => Ok(()),
            None => Err(Error::NotRunning),
        }
    }

    /// Register the call stack for a cooperative context. Must precede any
    /// event for that context; re-declaring resets the stack to empty.
    pub fn declare_context(&mut self, context: ContextId) -> Result<(), Error> {
        let engine = self.engine_mut()?;
        engine
            .stacks
            .entry(context)
            .and_modify(CallStack::clear)
            .or_insert_with(CallStack::new);
        Ok(())
    }

    /// Hook: a function call observed by the host.
    pub fn on_call(
        &mut self,
        context: ContextId,
        key: FunctionKey,
        kind: CallKind,
        fetch: impl FnOnce() -> DebugInfo,
    ) -> Result<(), Error> {
        let now = self.clock.now_ns();
        self.engine_mut()?.on_call(context, key, kind, fetch, now)
    }

    /// Hook: a function return observed by the host.
    pub fn on_return(&mut self, context: ContextId, key: FunctionKey) -> Result<(), Error> {
        let now = self.clock.now_ns();
        self.engine_mut()?.on_return(context, key, now)
    }

    /// Capture the current counters as the next snapshot; returns its index.
    pub fn save_snapshot(&mut self) -> Result<usize, Error> {
        let engine = self.engine_mut()?;
        let snapshot = engine.arena.snapshot();
        Ok(engine.snapshots.push(snapshot))
    }

    /// Number of snapshots saved so far; valid window indices are below it.
    pub fn snapshot_count(&self) -> usize {
        self.engine.as_ref().map_or(0, |engine| engine.snapshots.len())
    }

    /// Aggregate the call tree over `range` (full history when `None`) into
    /// a read-only report.
    pub fn report(&mut self, range: Option<SnapshotRange>) -> Result<ReportNode, Error> {
        self.engine_mut()?.report(range)
    }

    /// Compute a report and serialize it to any writer.
    pub fn write_report<W: Write>(
        &mut self,
        writer: W,
        range: Option<SnapshotRange>,
    ) -> Result<(), Error> {
        let report = self.report(range)?;
        serde_json::to_writer_pretty(writer, &report)?;
        Ok(())
    }

    /// Compute a report and write it to `path`. The report is computed
    /// before the destination is touched, so an invalid window never
    /// clobbers an existing file.
    pub fn dump(&mut self, path: &Path, range: Option<SnapshotRange>) -> Result<(), Error> {
        let report = self.report(range)?;
        let file = File::create(path).map_err(|source| Error::DestinationUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &report)?;
        writer.flush()?;
        Ok(())
    }

    fn engine_mut(&mut self) -> Result<&mut Engine, Error> {
        self.engine.as_mut().ok_or(Error::NotRunning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn lifecycle_guards() {
        let mut profiler = Profiler::with_clock(ManualClock::new());
        assert!(!profiler.is_running());
        assert!(matches!(profiler.stop(), Err(Error::NotRunning)));
        assert!(matches!(
            profiler.declare_context(ContextId(1)),
            Err(Error::NotRunning)
        ));

        profiler.start().unwrap();
        assert!(profiler.is_running());
        assert!(matches!(profiler.start(), Err(Error::AlreadyRunning)));

        profiler.stop().unwrap();
        assert!(!profiler.is_running());
        assert!(matches!(profiler.report(None), Err(Error::NotRunning)));
    }

    #[test]
    fn events_for_undeclared_contexts_abort() {
        let mut profiler = Profiler::with_clock(ManualClock::new());
        profiler.start().unwrap();
        let key = FunctionKey::Native(hotpath_protocol::NativeRef(1));
        let result = profiler.on_call(ContextId(9), key, CallKind::Normal, DebugInfo::unknown);
        assert!(matches!(result, Err(Error::UnknownContext(ContextId(9)))));
        let result = profiler.on_return(ContextId(9), key);
        assert!(matches!(result, Err(Error::UnknownContext(ContextId(9)))));
    }

    #[test]
    fn snapshot_count_tracks_saves() {
        let mut profiler = Profiler::with_clock(ManualClock::new());
        profiler.start().unwrap();
        assert_eq!(profiler.snapshot_count(), 0);
        assert_eq!(profiler.save_snapshot().unwrap(), 0);
        assert_eq!(profiler.save_snapshot().unwrap(), 1);
        assert_eq!(profiler.snapshot_count(), 2);
    }
}

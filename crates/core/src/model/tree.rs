use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use super::callsite::{Callsite, CallsiteId};
use super::counters::{CounterArena, CounterId, CounterSnapshot};

/// Index of a node in the tree's backing storage. Ids are issued in
/// creation order and never reused, so among siblings a smaller id means an
/// earlier first call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Aggregated figures for one node over a query window. Recomputed by every
/// `aggregate` pass and meaningless once the next pass runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeTotals {
    pub calls: u64,
    pub self_ns: u64,
    pub total_ns: u64,
}

/// One (parent callsite, callsite) pair in the aggregated call graph.
#[derive(Debug)]
pub struct CallNode {
    callsite: Option<Arc<Callsite>>,
    counter: CounterId,
    children: HashMap<CallsiteId, NodeId>,
    /// Children in reporting order: first-call order until an aggregation
    /// pass re-sorts it heaviest-first.
    order: Vec<NodeId>,
}

impl CallNode {
    /// The node's callsite descriptor; `None` only for the sentinel root.
    pub fn callsite(&self) -> Option<&Arc<Callsite>> {
        self.callsite.as_ref()
    }

    pub fn counter(&self) -> CounterId {
        self.counter
    }

    pub fn children(&self) -> &[NodeId] {
        &self.order
    }
}

/// The call tree: a strict forest of callsite nodes under one sentinel root
/// that stands for the union of all traced calls.
///
/// Nodes live in a flat arena addressed by `NodeId`. Each parent owns its
/// children exclusively and the structure is acyclic, so dropping the tree
/// frees every node in one pass.
#[derive(Debug)]
pub struct CallTree {
    nodes: Vec<CallNode>,
    root: NodeId,
}

impl CallTree {
    /// Create the tree with its sentinel root. The root owns a counter like
    /// any node, but nothing ever increments it.
    pub fn new(arena: &mut CounterArena) -> Self {
        let root = CallNode {
            callsite: None,
            counter: arena.allocate(),
            children: HashMap::new(),
            order: Vec::new(),
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &CallNode {
        &self.nodes[id.index()]
    }

    /// Number of nodes, sentinel root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Child of `parent` for `callsite`, created on first sight with a fresh
    /// counter. The single mutation path on the call hot path; O(1)
    /// amortized.
    pub fn child_of(
        &mut self,
        parent: NodeId,
        callsite: &Arc<Callsite>,
        arena: &mut CounterArena,
    ) -> NodeId {
        if let Some(&child) = self.nodes[parent.index()].children.get(&callsite.id()) {
            return child;
        }
        let child = NodeId(self.nodes.len() as u32);
        self.nodes.push(CallNode {
            callsite: Some(Arc::clone(callsite)),
            counter: arena.allocate(),
            children: HashMap::new(),
            order: Vec::new(),
        });
        let node = &mut self.nodes[parent.index()];
        node.children.insert(callsite.id(), child);
        node.order.push(child);
        child
    }

    /// Recompute windowed figures for every node and re-sort each child
    /// list by descending total (ties keep first-call order).
    ///
    /// `end` selects the closing counter values — a snapshot, or the live
    /// arena when `None`. `start` supplies the baseline; a counter missing
    /// from it (allocated after that capture) contributes zero, so a node
    /// born inside the window counts its whole history.
    ///
    /// The re-sort is a reporting concern only: a later pass over the
    /// reordered children produces identical figures.
    pub fn aggregate(
        &mut self,
        start: Option<&CounterSnapshot>,
        end: Option<&CounterSnapshot>,
        arena: &CounterArena,
    ) -> Vec<NodeTotals> {
        let mut totals = vec![NodeTotals::default(); self.nodes.len()];
        self.aggregate_node(self.root, start, end, arena, &mut totals);
        totals
    }

    fn aggregate_node(
        &mut self,
        id: NodeId,
        start: Option<&CounterSnapshot>,
        end: Option<&CounterSnapshot>,
        arena: &CounterArena,
        totals: &mut [NodeTotals],
    ) -> u64 {
        let child_ids = self.nodes[id.index()].order.clone();
        let mut children_total = 0u64;
        for child in &child_ids {
            children_total += self.aggregate_node(*child, start, end, arena, totals);
        }

        let counter = self.nodes[id.index()].counter;
        let closing = match end {
            Some(snapshot) => snapshot.get(counter).unwrap_or_default(),
            None => *arena.counter(counter),
        };
        let baseline = start.and_then(|snapshot| snapshot.get(counter)).unwrap_or_default();

        let slot = &mut totals[id.index()];
        slot.calls = closing.calls.saturating_sub(baseline.calls);
        slot.self_ns = closing.self_ns.saturating_sub(baseline.self_ns);
        slot.total_ns = slot.self_ns + children_total;
        let total = slot.total_ns;

        let node = &mut self.nodes[id.index()];
        if node.order.len() > 1 {
            node.order
                .sort_by_key(|child| (Reverse(totals[child.index()].total_ns), *child));
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::callsite::CallsiteRegistry;
    use hotpath_protocol::{DebugInfo, FunctionKey, SourceRef};

    fn site(registry: &mut CallsiteRegistry, line: i32) -> Arc<Callsite> {
        registry
            .resolve(
                FunctionKey::Scripted {
                    source: SourceRef(1),
                    line,
                },
                || DebugInfo {
                    name: Some(format!("fn_{line}")),
                    source: Some("@test.lua".to_string()),
                    line,
                },
            )
            .unwrap()
    }

    #[test]
    fn child_of_returns_the_same_node_for_the_same_callsite() {
        let mut arena = CounterArena::new();
        let mut tree = CallTree::new(&mut arena);
        let mut registry = CallsiteRegistry::new();
        let f = site(&mut registry, 1);

        let root = tree.root();
        let a = tree.child_of(root, &f, &mut arena);
        let b = tree.child_of(root, &f, &mut arena);
        assert_eq!(a, b);
        assert_eq!(tree.node_count(), 2);

        // The same callsite under a different parent is a different node.
        let nested = tree.child_of(a, &f, &mut arena);
        assert_ne!(nested, a);
        assert_eq!(tree.node_count(), 3);
    }

    #[test]
    fn aggregate_sums_bottom_up_and_sorts_heaviest_first() {
        let mut arena = CounterArena::new();
        let mut tree = CallTree::new(&mut arena);
        let mut registry = CallsiteRegistry::new();
        let light = site(&mut registry, 1);
        let heavy = site(&mut registry, 2);
        let leaf = site(&mut registry, 3);

        let root = tree.root();
        let light_id = tree.child_of(root, &light, &mut arena);
        let heavy_id = tree.child_of(root, &heavy, &mut arena);
        let leaf_id = tree.child_of(heavy_id, &leaf, &mut arena);

        let c = tree.node(light_id).counter();
        arena.counter_mut(c).self_ns = 10;
        arena.counter_mut(c).calls = 1;
        let c = tree.node(heavy_id).counter();
        arena.counter_mut(c).self_ns = 5;
        arena.counter_mut(c).calls = 2;
        let c = tree.node(leaf_id).counter();
        arena.counter_mut(c).self_ns = 20;
        arena.counter_mut(c).calls = 4;

        let totals = tree.aggregate(None, None, &arena);
        assert_eq!(totals[leaf_id.index()].total_ns, 20);
        assert_eq!(totals[heavy_id.index()].total_ns, 25);
        assert_eq!(totals[light_id.index()].total_ns, 10);
        assert_eq!(totals[tree.root().index()].total_ns, 35);
        // heavy (25) now sorts ahead of light (10) under the root.
        assert_eq!(tree.node(root).children(), &[heavy_id, light_id]);

        // Re-running over the reordered children changes nothing.
        let again = tree.aggregate(None, None, &arena);
        assert_eq!(again, totals);
    }

    #[test]
    fn equal_totals_keep_first_call_order() {
        let mut arena = CounterArena::new();
        let mut tree = CallTree::new(&mut arena);
        let mut registry = CallsiteRegistry::new();
        let first = site(&mut registry, 1);
        let second = site(&mut registry, 2);

        let root = tree.root();
        let first_id = tree.child_of(root, &first, &mut arena);
        let second_id = tree.child_of(root, &second, &mut arena);
        arena.counter_mut(tree.node(first_id).counter()).self_ns = 5;
        arena.counter_mut(tree.node(second_id).counter()).self_ns = 5;

        tree.aggregate(None, None, &arena);
        assert_eq!(tree.node(root).children(), &[first_id, second_id]);
    }

    #[test]
    fn missing_start_baseline_counts_the_whole_history() {
        let mut arena = CounterArena::new();
        let mut tree = CallTree::new(&mut arena);
        let mut registry = CallsiteRegistry::new();
        let early = site(&mut registry, 1);
        let late = site(&mut registry, 2);

        let root = tree.root();
        let early_id = tree.child_of(root, &early, &mut arena);
        arena.counter_mut(tree.node(early_id).counter()).self_ns = 100;

        let baseline = arena.snapshot();

        // A node born after the baseline snapshot.
        let late_id = tree.child_of(root, &late, &mut arena);
        arena.counter_mut(tree.node(late_id).counter()).self_ns = 40;
        arena.counter_mut(tree.node(early_id).counter()).self_ns = 130;

        let totals = tree.aggregate(Some(&baseline), None, &arena);
        assert_eq!(totals[early_id.index()].self_ns, 30);
        assert_eq!(totals[late_id.index()].self_ns, 40);
        assert_eq!(totals[tree.root().index()].total_ns, 70);
    }
}

//! Windowed report tree and its serialized form.
//!
//! Field names and the fixed root record match the dump format downstream
//! tooling already consumes: `call`, `count`, `total`, `totalPercent`,
//! `self`, `selfPercent`, `subcall` (omitted on leaves).

use serde::Serialize;

use crate::error::Error;
use crate::model::{CallTree, NodeId, NodeTotals};

/// One node of a rendered report: a callsite (or the root) with its
/// windowed figures and children, heaviest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportNode {
    /// `name:source:line`, or `root` for the tree root.
    pub call: String,
    pub count: u64,
    pub total: u64,
    pub total_percent: f64,
    #[serde(rename = "self")]
    pub self_elapsed: u64,
    pub self_percent: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subcall: Vec<ReportNode>,
}

/// Build the report tree from freshly aggregated totals. Percentages are
/// relative to the root total for the window; a zero root total has no
/// defined percentages and is an error.
pub(crate) fn build(tree: &CallTree, totals: &[NodeTotals]) -> Result<ReportNode, Error> {
    let root_total = totals[tree.root().index()].total_ns;
    if root_total == 0 {
        return Err(Error::UndefinedPercentage);
    }
    Ok(build_node(tree, tree.root(), totals, root_total))
}

fn build_node(tree: &CallTree, id: NodeId, totals: &[NodeTotals], root_total: u64) -> ReportNode {
    let node = tree.node(id);
    let figures = totals[id.index()];
    let subcall = node
        .children()
        .iter()
        .map(|&child| build_node(tree, child, totals, root_total))
        .collect();

    match node.callsite() {
        Some(site) => ReportNode {
            call: site.label(),
            count: figures.calls,
            total: figures.total_ns,
            total_percent: percent(figures.total_ns, root_total),
            self_elapsed: figures.self_ns,
            self_percent: percent(figures.self_ns, root_total),
            subcall,
        },
        // The sentinel root stands for all traced calls; its presentation
        // is fixed.
        None => ReportNode {
            call: "root".to_string(),
            count: 1,
            total: figures.total_ns,
            total_percent: 100.0,
            self_elapsed: 0,
            self_percent: 0.0,
            subcall,
        },
    }
}

fn percent(value: u64, whole: u64) -> f64 {
    value as f64 / whole as f64 * 100.0
}

//! Pure tree materialization over flat node lists.
//!
//! No I/O here: [`build_tree`] takes the flat, `order_index`-sorted node set
//! from `queries::nodes::list_nodes_for_plan` and produces nested trees.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use crate::models::Node;

/// A node together with its materialized children, ordered by `order_index`.
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub node: Node,
    pub children: Vec<TreeNode>,
}

/// Materialize nested trees from a flat node list.
///
/// Two passes: the first indexes every node id, the second groups each node
/// under its parent. A node whose declared parent is absent from the list is
/// promoted to a root rather than dropped, so a partially-fetched or
/// inconsistent list still materializes without panicking. For a well-formed
/// plan the result is exactly one tree rooted at the plan's root node.
///
/// Sibling order follows the input order, so callers feeding an
/// `order_index`-sorted list get `order_index`-sorted children.
pub fn build_tree(nodes: Vec<Node>) -> Vec<TreeNode> {
    let known: HashSet<Uuid> = nodes.iter().map(|n| n.id).collect();

    // Group nodes under their effective parent; unresolvable parents make
    // the node a root.
    let mut roots: Vec<Node> = Vec::new();
    let mut children_of: HashMap<Uuid, Vec<Node>> = HashMap::new();

    for node in nodes {
        match node.parent_id {
            Some(parent) if known.contains(&parent) => {
                children_of.entry(parent).or_default().push(node);
            }
            _ => roots.push(node),
        }
    }

    roots
        .into_iter()
        .map(|node| attach_children(node, &mut children_of))
        .collect()
}

fn attach_children(node: Node, children_of: &mut HashMap<Uuid, Vec<Node>>) -> TreeNode {
    let children = children_of
        .remove(&node.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| attach_children(child, children_of))
        .collect();

    TreeNode { node, children }
}

// src/practice/category_tree.rs

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::CategoryId;

/// One row of a flat category listing, in the order the bank returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,

    /// Parent category id, `TOP_CATEGORY` for top-level categories.
    pub parent: CategoryId,

    pub name: String,

    /// Questions stored directly in this category (descendants not included).
    pub question_count: i64,
}

/// A checkable node of the category tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryNode {
    pub id: CategoryId,
    pub name: String,
    pub question_count: i64,
    pub checked: bool,
    pub children: Vec<CategoryNode>,
}

/// Nested categories hanging off one root id.
///
/// Keeps an index from category id to the node's position so callers can
/// reach a node directly instead of searching the tree.
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    pub roots: Vec<CategoryNode>,
    index: HashMap<CategoryId, Vec<usize>>,
    unreachable: Vec<CategoryId>,
}

/// Builds the category tree below `root`.
///
/// * Children keep the order they have in `categories`.
/// * A node is checked iff its id is in `selected`, whatever its depth.
/// * Categories whose parent chain never reaches `root` (dangling parent ids,
///   parent cycles) are left out of the tree and reported by
///   [`CategoryTree::unreachable`].
/// * A repeated id keeps its first occurrence.
pub fn build_category_tree(
    categories: &[Category],
    root: CategoryId,
    selected: &HashSet<CategoryId>,
) -> CategoryTree {
    let mut seen = HashSet::with_capacity(categories.len());
    let mut children: HashMap<CategoryId, Vec<&Category>> = HashMap::new();
    for category in categories {
        if !seen.insert(category.id) {
            tracing::warn!("Duplicate category id {} ignored", category.id);
            continue;
        }
        children.entry(category.parent).or_default().push(category);
    }

    let mut placed = HashSet::with_capacity(seen.len());
    placed.insert(root);
    let roots = attach(root, &children, selected, &mut placed);

    let mut reported = HashSet::new();
    let unreachable: Vec<CategoryId> = categories
        .iter()
        .map(|c| c.id)
        .filter(|id| !placed.contains(id) && reported.insert(*id))
        .collect();
    if !unreachable.is_empty() {
        tracing::warn!(
            "Dropped {} categories not reachable from {}: {:?}",
            unreachable.len(),
            root,
            unreachable
        );
    }

    let mut tree = CategoryTree {
        roots,
        index: HashMap::new(),
        unreachable,
    };
    tree.reindex();
    tree
}

fn attach(
    parent: CategoryId,
    children: &HashMap<CategoryId, Vec<&Category>>,
    selected: &HashSet<CategoryId>,
    placed: &mut HashSet<CategoryId>,
) -> Vec<CategoryNode> {
    let Some(kids) = children.get(&parent) else {
        return Vec::new();
    };

    let mut nodes = Vec::with_capacity(kids.len());
    for category in kids {
        // Guards against a cycle running back through the root.
        if !placed.insert(category.id) {
            continue;
        }
        nodes.push(CategoryNode {
            id: category.id,
            name: category.name.clone(),
            question_count: category.question_count,
            checked: selected.contains(&category.id),
            children: attach(category.id, children, selected, placed),
        });
    }
    nodes
}

/// Returns `ids` together with all of their descendants, without repeats.
///
/// Known categories come out in listing order; requested ids that are not in
/// the listing are appended in request order.
pub fn expand_descendants(categories: &[Category], ids: &[CategoryId]) -> Vec<CategoryId> {
    let mut children: HashMap<CategoryId, Vec<CategoryId>> = HashMap::new();
    for category in categories {
        children.entry(category.parent).or_default().push(category.id);
    }

    let mut scope: HashSet<CategoryId> = HashSet::new();
    let mut stack: Vec<CategoryId> = ids.to_vec();
    while let Some(id) = stack.pop() {
        if !scope.insert(id) {
            continue;
        }
        if let Some(kids) = children.get(&id) {
            stack.extend(kids.iter().copied());
        }
    }

    let mut emitted = HashSet::with_capacity(scope.len());
    let mut expanded: Vec<CategoryId> = categories
        .iter()
        .map(|c| c.id)
        .filter(|id| scope.contains(id) && emitted.insert(*id))
        .collect();
    for id in ids {
        if emitted.insert(*id) {
            expanded.push(*id);
        }
    }
    expanded
}

impl CategoryTree {
    /// Looks a node up by category id.
    pub fn node(&self, id: CategoryId) -> Option<&CategoryNode> {
        let (first, rest) = self.index.get(&id)?.split_first()?;
        let mut node = self.roots.get(*first)?;
        for &i in rest {
            node = node.children.get(i)?;
        }
        Some(node)
    }

    pub fn node_mut(&mut self, id: CategoryId) -> Option<&mut CategoryNode> {
        let (first, rest) = self.index.get(&id)?.split_first()?;
        let mut node = self.roots.get_mut(*first)?;
        for &i in rest {
            node = node.children.get_mut(i)?;
        }
        Some(node)
    }

    /// Sets the checked flag of one node. Returns false if the id is not in the tree.
    pub fn set_checked(&mut self, id: CategoryId, checked: bool) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.checked = checked;
                true
            }
            None => false,
        }
    }

    /// Checked category ids in pre-order.
    pub fn checked_ids(&self) -> Vec<CategoryId> {
        fn walk(nodes: &[CategoryNode], out: &mut Vec<CategoryId>) {
            for node in nodes {
                if node.checked {
                    out.push(node.id);
                }
                walk(&node.children, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.roots, &mut out);
        out
    }

    /// Drops every node that is neither checked nor above a checked node.
    pub fn prune_unchecked(&mut self) {
        fn prune(nodes: Vec<CategoryNode>) -> Vec<CategoryNode> {
            nodes
                .into_iter()
                .filter_map(|mut node| {
                    node.children = prune(std::mem::take(&mut node.children));
                    (node.checked || !node.children.is_empty()).then_some(node)
                })
                .collect()
        }
        self.roots = prune(std::mem::take(&mut self.roots));
        self.reindex();
    }

    /// Categories left out of the tree because they could not be reached from the root.
    pub fn unreachable(&self) -> &[CategoryId] {
        &self.unreachable
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn into_roots(self) -> Vec<CategoryNode> {
        self.roots
    }

    fn reindex(&mut self) {
        fn walk(
            nodes: &[CategoryNode],
            path: &mut Vec<usize>,
            index: &mut HashMap<CategoryId, Vec<usize>>,
        ) {
            for (i, node) in nodes.iter().enumerate() {
                path.push(i);
                index.insert(node.id, path.clone());
                walk(&node.children, path, index);
                path.pop();
            }
        }
        self.index.clear();
        walk(&self.roots, &mut Vec::new(), &mut self.index);
    }
}

//! Group hierarchy: tree building, descendant closure and parent selection
//!
//! Groups form a forest through `parent_group_id`. Nothing outside the guarded
//! update path prevents cycles in stored data, so every walk here tracks the
//! ids it has visited and uses an explicit stack instead of recursion.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::error::{FleetError, FleetResult};
use crate::group::Group;

/// A group with its child groups, for rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupNode {
    pub group_id: i64,
    pub name: String,
    pub parent_group_id: Option<i64>,
    /// Sorted by name, then id
    pub children: Vec<GroupNode>,
}

/// Parent -> children index over a flat group list
struct ChildIndex<'a> {
    by_id: HashMap<i64, &'a Group>,
    children: HashMap<i64, Vec<&'a Group>>,
}

impl<'a> ChildIndex<'a> {
    fn new(groups: &'a [Group]) -> Self {
        let by_id: HashMap<i64, &Group> = groups.iter().map(|g| (g.group_id, g)).collect();
        let mut children: HashMap<i64, Vec<&Group>> = HashMap::new();
        for group in groups {
            if let Some(parent) = group.parent_group_id {
                children.entry(parent).or_default().push(group);
            }
        }
        for list in children.values_mut() {
            list.sort_by(|a, b| a.name.cmp(&b.name).then(a.group_id.cmp(&b.group_id)));
        }
        Self { by_id, children }
    }

    fn children_of(&self, id: i64) -> &[&'a Group] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Groups without a parent, or whose parent is missing from the list
    fn roots(&self, groups: &'a [Group]) -> Vec<&'a Group> {
        let mut roots: Vec<&Group> = groups
            .iter()
            .filter(|g| match g.parent_group_id {
                None => true,
                Some(parent) => !self.by_id.contains_key(&parent),
            })
            .collect();
        roots.sort_by(|a, b| a.name.cmp(&b.name).then(a.group_id.cmp(&b.group_id)));
        roots
    }
}

struct Frame<'a> {
    group: &'a Group,
    pending: std::slice::Iter<'a, &'a Group>,
    built: Vec<GroupNode>,
}

fn build_from<'a>(
    index: &'a ChildIndex<'a>,
    root: &'a Group,
    visited: &mut HashSet<i64>,
) -> GroupNode {
    visited.insert(root.group_id);
    let mut stack = vec![Frame {
        group: root,
        pending: index.children_of(root.group_id).iter(),
        built: Vec::new(),
    }];

    while let Some(top) = stack.last_mut() {
        match top.pending.next() {
            Some(&child) => {
                if visited.insert(child.group_id) {
                    stack.push(Frame {
                        group: child,
                        pending: index.children_of(child.group_id).iter(),
                        built: Vec::new(),
                    });
                } else {
                    warn!(group = child.group_id, "Group reached twice while building tree, skipping");
                }
            }
            None => {
                let Some(frame) = stack.pop() else { break };
                let node = GroupNode {
                    group_id: frame.group.group_id,
                    name: frame.group.name.clone(),
                    parent_group_id: frame.group.parent_group_id,
                    children: frame.built,
                };
                match stack.last_mut() {
                    Some(parent) => parent.built.push(node),
                    None => return node,
                }
            }
        }
    }

    // Unreachable: the root frame always returns above.
    GroupNode {
        group_id: root.group_id,
        name: root.name.clone(),
        parent_group_id: root.parent_group_id,
        children: Vec::new(),
    }
}

/// Build the whole forest from a flat list
///
/// Groups caught in a parent cycle have no root above them and are left out.
pub fn build_forest(groups: &[Group]) -> Vec<GroupNode> {
    let index = ChildIndex::new(groups);
    let mut visited = HashSet::new();
    index
        .roots(groups)
        .into_iter()
        .map(|root| build_from(&index, root, &mut visited))
        .collect()
}

/// Build the subtree rooted at `root_id`
pub fn build_tree(groups: &[Group], root_id: i64) -> Option<GroupNode> {
    let index = ChildIndex::new(groups);
    let root = index.by_id.get(&root_id).copied()?;
    let mut visited = HashSet::new();
    Some(build_from(&index, root, &mut visited))
}

/// Ids of every group reachable from `id` through child links
///
/// Never contains `id` itself, and terminates even when the stored
/// parent links form a cycle.
pub fn descendants(groups: &[Group], id: i64) -> HashSet<i64> {
    let index = ChildIndex::new(groups);
    let mut found = HashSet::new();
    let mut visited = HashSet::from([id]);
    let mut stack = vec![id];

    while let Some(current) = stack.pop() {
        for child in index.children_of(current) {
            if visited.insert(child.group_id) {
                found.insert(child.group_id);
                stack.push(child.group_id);
            }
        }
    }

    found
}

/// Groups that may become the new parent of `id`: everything except the
/// group itself and its descendants, sorted by name
pub fn parent_candidates(groups: &[Group], id: i64) -> Vec<Group> {
    let excluded = descendants(groups, id);
    let mut candidates: Vec<Group> = groups
        .iter()
        .filter(|g| g.group_id != id && !excluded.contains(&g.group_id))
        .cloned()
        .collect();
    candidates.sort_by(|a, b| a.name.cmp(&b.name).then(a.group_id.cmp(&b.group_id)));
    candidates
}

/// Reject a parent assignment that would create a cycle or dangle
pub fn ensure_valid_parent(groups: &[Group], id: i64, new_parent: Option<i64>) -> FleetResult<()> {
    let Some(parent) = new_parent else {
        return Ok(());
    };

    if parent == id {
        return Err(FleetError::validation("a group cannot be its own parent"));
    }
    if !groups.iter().any(|g| g.group_id == parent) {
        return Err(FleetError::validation(format!(
            "parent group {parent} does not exist"
        )));
    }
    if descendants(groups, id).contains(&parent) {
        return Err(FleetError::validation(format!(
            "group {parent} is a descendant of group {id} and cannot be its parent"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn group(id: i64, name: &str, parent: Option<i64>) -> Group {
        Group {
            group_id: id,
            name: name.to_string(),
            parent_group_id: parent,
            created_at: Utc::now(),
        }
    }

    fn chain() -> Vec<Group> {
        vec![
            group(1, "A", None),
            group(2, "B", Some(1)),
            group(3, "C", Some(2)),
            group(4, "Other", None),
        ]
    }

    #[test]
    fn test_tree_from_root() {
        let groups = chain();
        let tree = build_tree(&groups, 1).unwrap();
        assert_eq!(tree.name, "A");
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].name, "B");
        assert_eq!(tree.children[0].children.len(), 1);
        assert_eq!(tree.children[0].children[0].name, "C");
        assert!(tree.children[0].children[0].children.is_empty());
    }

    #[test]
    fn test_tree_unknown_root() {
        assert!(build_tree(&chain(), 99).is_none());
    }

    #[test]
    fn test_forest_roots_and_child_order() {
        let groups = vec![
            group(1, "Site", None),
            group(2, "Zeta", Some(1)),
            group(3, "Alpha", Some(1)),
            group(4, "Annex", None),
        ];
        let forest = build_forest(&groups);
        let roots: Vec<&str> = forest.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(roots, vec!["Annex", "Site"]);
        let children: Vec<&str> = forest[1].children.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(children, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn test_forest_treats_orphans_as_roots() {
        let groups = vec![group(1, "Lost", Some(42))];
        let forest = build_forest(&groups);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].group_id, 1);
    }

    #[test]
    fn test_descendants_of_chain() {
        let groups = chain();
        assert_eq!(descendants(&groups, 1), HashSet::from([2, 3]));
        assert_eq!(descendants(&groups, 2), HashSet::from([3]));
        assert!(descendants(&groups, 3).is_empty());
    }

    #[test]
    fn test_descendants_terminates_on_cycle() {
        let groups = vec![
            group(1, "A", Some(3)),
            group(2, "B", Some(1)),
            group(3, "C", Some(2)),
        ];
        let found = descendants(&groups, 1);
        assert_eq!(found, HashSet::from([2, 3]));
        assert!(!found.contains(&1));
    }

    #[test]
    fn test_self_loop_not_its_own_descendant() {
        let groups = vec![group(1, "A", Some(1))];
        assert!(descendants(&groups, 1).is_empty());
    }

    #[test]
    fn test_tree_terminates_on_cycle() {
        let groups = vec![group(1, "A", Some(2)), group(2, "B", Some(1))];
        let tree = build_tree(&groups, 1).unwrap();
        assert_eq!(tree.children.len(), 1);
        assert!(tree.children[0].children.is_empty());
        assert!(build_forest(&groups).is_empty());
    }

    #[test]
    fn test_parent_candidates_exclude_subtree() {
        let groups = chain();
        let ids: Vec<i64> = parent_candidates(&groups, 1).iter().map(|g| g.group_id).collect();
        assert_eq!(ids, vec![4]);

        let ids: Vec<i64> = parent_candidates(&groups, 3).iter().map(|g| g.group_id).collect();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[test]
    fn test_ensure_valid_parent() {
        let groups = chain();
        assert!(ensure_valid_parent(&groups, 1, None).is_ok());
        assert!(ensure_valid_parent(&groups, 1, Some(4)).is_ok());
        assert!(ensure_valid_parent(&groups, 3, Some(1)).is_ok());
        assert!(matches!(
            ensure_valid_parent(&groups, 1, Some(1)),
            Err(FleetError::Validation(_))
        ));
        assert!(matches!(
            ensure_valid_parent(&groups, 1, Some(3)),
            Err(FleetError::Validation(_))
        ));
        assert!(matches!(
            ensure_valid_parent(&groups, 1, Some(99)),
            Err(FleetError::Validation(_))
        ));
    }
}

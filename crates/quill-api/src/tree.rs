use std::collections::{HashMap, HashSet};

use quill_db::models::FolderRow;
use quill_types::api::FolderNode;

pub const PATH_SEPARATOR: &str = " -> ";

/// Assemble a member's folder rows into their display tree: roots first,
/// siblings ordered by sort_order (ties by id), children recursive, each
/// node's path accumulated root-down. Paths are computed per call, never
/// stored, so renames and moves can't leave them stale.
pub fn build_tree(folders: &[FolderRow]) -> Vec<FolderNode> {
    let mut children: HashMap<Option<i64>, Vec<&FolderRow>> = HashMap::new();
    for folder in folders {
        children.entry(folder.parent_id).or_default().push(folder);
    }
    for siblings in children.values_mut() {
        siblings.sort_by_key(|f| (f.sort_order, f.id));
    }

    attach(&children, None, "")
}

fn attach(
    children: &HashMap<Option<i64>, Vec<&FolderRow>>,
    parent: Option<i64>,
    prefix: &str,
) -> Vec<FolderNode> {
    let Some(siblings) = children.get(&parent) else {
        return Vec::new();
    };

    siblings
        .iter()
        .map(|folder| {
            let path = if prefix.is_empty() {
                folder.name.clone()
            } else {
                format!("{prefix}{PATH_SEPARATOR}{}", folder.name)
            };
            FolderNode {
                id: folder.id,
                name: folder.name.clone(),
                path: path.clone(),
                sort_order: folder.sort_order,
                children: attach(children, Some(folder.id), &path),
            }
        })
        .collect()
}

/// Root-to-self name chain for a single folder, joined with the display
/// separator. The upward walk carries a visited set so corrupt parent data
/// cannot loop it.
pub fn display_path(folders: &[FolderRow], id: i64) -> String {
    let by_id: HashMap<i64, &FolderRow> = folders.iter().map(|f| (f.id, f)).collect();

    let mut names = Vec::new();
    let mut seen = HashSet::new();
    let mut current = by_id.get(&id).copied();
    while let Some(folder) = current {
        if !seen.insert(folder.id) {
            break;
        }
        names.push(folder.name.as_str());
        current = folder.parent_id.and_then(|pid| by_id.get(&pid).copied());
    }

    names.reverse();
    names.join(PATH_SEPARATOR)
}

/// True when walking upward from `start` reaches `target`. Every parent
/// assignment must pass this check with the folder being moved as `target`,
/// otherwise the relation could close a cycle and path walks would never
/// terminate.
pub fn reaches_upward(folders: &[FolderRow], start: i64, target: i64) -> bool {
    let by_id: HashMap<i64, &FolderRow> = folders.iter().map(|f| (f.id, f)).collect();

    let mut seen = HashSet::new();
    let mut current = Some(start);
    while let Some(id) = current {
        if id == target {
            return true;
        }
        if !seen.insert(id) {
            break;
        }
        current = by_id.get(&id).and_then(|f| f.parent_id);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, parent_id: Option<i64>, name: &str, sort_order: i64) -> FolderRow {
        FolderRow {
            id,
            member_id: 1,
            parent_id,
            name: name.to_string(),
            description: None,
            sort_order,
            is_active: true,
            created_at: "2024-01-01 00:00:00".to_string(),
            updated_at: "2024-01-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn path_is_the_root_to_node_name_chain() {
        let folders = vec![
            row(1, None, "A", 1),
            row(2, Some(1), "B", 1),
            row(3, Some(2), "C", 1),
        ];
        assert_eq!(display_path(&folders, 3), "A -> B -> C");
        assert_eq!(display_path(&folders, 1), "A");
    }

    #[test]
    fn tree_orders_siblings_by_sort_order_then_id() {
        let folders = vec![
            row(5, None, "Second", 2),
            row(4, None, "First", 1),
            row(6, None, "Tie", 2),
        ];
        let tree = build_tree(&folders);
        let names: Vec<&str> = tree.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["First", "Second", "Tie"]);
    }

    #[test]
    fn tree_nests_children_with_paths() {
        let folders = vec![
            row(1, None, "Work", 1),
            row(2, Some(1), "Projects", 1),
            row(3, Some(2), "Archive", 1),
            row(4, None, "Personal", 2),
        ];
        let tree = build_tree(&folders);
        assert_eq!(tree.len(), 2);

        let work = &tree[0];
        assert_eq!(work.path, "Work");
        assert_eq!(work.children.len(), 1);
        let projects = &work.children[0];
        assert_eq!(projects.path, "Work -> Projects");
        assert_eq!(projects.children[0].path, "Work -> Projects -> Archive");

        assert!(tree[1].children.is_empty());
    }

    #[test]
    fn reaches_upward_flags_self_and_descendants() {
        let folders = vec![
            row(1, None, "A", 1),
            row(2, Some(1), "B", 1),
            row(3, Some(2), "C", 1),
            row(4, None, "D", 2),
        ];
        // Moving A under C would close a cycle; so would A under A.
        assert!(reaches_upward(&folders, 3, 1));
        assert!(reaches_upward(&folders, 1, 1));
        // D is unrelated to A's chain.
        assert!(!reaches_upward(&folders, 4, 1));
        // Moving C under A is the legitimate direction.
        assert!(!reaches_upward(&folders, 1, 3));
    }

    #[test]
    fn corrupt_parent_cycles_do_not_hang_the_walks() {
        let folders = vec![row(1, Some(2), "A", 1), row(2, Some(1), "B", 1)];
        // Finite answers are all that matters here.
        let _ = display_path(&folders, 1);
        assert!(!reaches_upward(&folders, 1, 99));
    }
}

use crate::classify::is_year_name;
use crate::errors::{FilingError, FilingResult};
use crate::models::{Document, DriveSnapshot, FileNode, FolderNode, Node};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct YearFolders<'a> {
    pub by_year: BTreeMap<String, &'a FolderNode>,
    pub duplicates: Vec<String>,
}

pub fn find_folder_by_name<'a>(nodes: &'a [Node], name: &str) -> Option<&'a FolderNode> {
    nodes
        .iter()
        .filter_map(Node::as_folder)
        .find(|folder| folder.name == name)
}

/// Bucket folders directly under `root_id`, keyed by year. The first folder
/// seen for a year wins; later ones are reported in `duplicates`.
pub fn year_folders<'a>(nodes: &'a [Node], root_id: &str) -> YearFolders<'a> {
    let mut result = YearFolders::default();
    for folder in nodes.iter().filter_map(Node::as_folder) {
        if folder.parent_folder.as_deref() != Some(root_id) || !is_year_name(&folder.name) {
            continue;
        }
        if result.by_year.contains_key(&folder.name) {
            if !result.duplicates.contains(&folder.name) {
                result.duplicates.push(folder.name.clone());
            }
            continue;
        }
        result.by_year.insert(folder.name.clone(), folder);
    }
    result
}

pub fn unfiled_nodes<'a>(nodes: &'a [Node], root_id: &str, document_type: &str) -> Vec<&'a FileNode> {
    nodes
        .iter()
        .filter_map(Node::as_file)
        .filter(|file| file.document_type == document_type && file.parent_folder.as_deref() == Some(root_id))
        .collect()
}

/// Ids of `root_id` and every node below it.
pub fn subtree_node_ids(nodes: &[Node], root_id: &str) -> HashSet<String> {
    let mut children: HashMap<&str, Vec<&Node>> = HashMap::new();
    for node in nodes {
        if let Some(parent) = node.parent_folder() {
            children.entry(parent).or_default().push(node);
        }
    }

    let mut collected = HashSet::new();
    let mut stack = vec![root_id];
    while let Some(current) = stack.pop() {
        if !collected.insert(current.to_string()) {
            continue;
        }
        for child in children.get(current).into_iter().flatten() {
            stack.push(child.id());
        }
    }
    collected
}

/// Path from the drive root down to `node_id`, inclusive.
pub fn node_path<'a>(nodes: &'a [Node], node_id: &str) -> FilingResult<Vec<&'a Node>> {
    let index: HashMap<&str, &Node> = nodes.iter().map(|node| (node.id(), node)).collect();
    let mut path = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = Some(node_id);

    while let Some(current) = cursor {
        if !seen.insert(current) {
            return Err(FilingError::Internal(format!(
                "Parent chain of node {} cycles through {}",
                node_id, current
            )));
        }
        let node = index
            .get(current)
            .copied()
            .ok_or_else(|| FilingError::NotFound(format!("Node {} does not exist", current)))?;
        path.push(node);
        cursor = node.parent_folder();
    }

    path.reverse();
    Ok(path)
}

/// Breadcrumb suffix starting at `root_id`. When the root is not on the path
/// the whole path is shown.
pub fn visible_path<'a, 'n>(path: &'a [&'n Node], root_id: &str) -> &'a [&'n Node] {
    match path.iter().position(|node| node.id() == root_id) {
        Some(index) => &path[index..],
        None => path,
    }
}

pub fn documents_in_subtree<'a>(
    snapshot: &'a DriveSnapshot,
    root_id: &str,
    document_type: &str,
) -> Vec<&'a Document> {
    let subtree = subtree_node_ids(&snapshot.nodes, root_id);
    let file_ids: HashSet<&str> = snapshot
        .nodes
        .iter()
        .filter_map(Node::as_file)
        .filter(|file| file.document_type == document_type && subtree.contains(&file.id))
        .map(|file| file.id.as_str())
        .collect();

    snapshot
        .documents
        .iter()
        .filter(|document| document.document_type() == document_type && file_ids.contains(document.id()))
        .collect()
}

/// Document type to the id of the first document of that type.
pub fn first_document_by_type(documents: &[Document]) -> BTreeMap<&str, &str> {
    let mut map = BTreeMap::new();
    for document in documents {
        map.entry(document.document_type()).or_insert(document.id());
    }
    map
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::models::{Document, DocumentHeader, DocumentState, FileNode, FolderNode, Node};

    pub fn folder(id: &str, name: &str, parent: Option<&str>) -> Node {
        Node::Folder(FolderNode {
            id: id.to_string(),
            name: name.to_string(),
            parent_folder: parent.map(ToString::to_string),
        })
    }

    pub fn file(id: &str, parent: Option<&str>, document_type: &str) -> Node {
        Node::File(FileNode {
            id: id.to_string(),
            name: format!("{} report", id),
            parent_folder: parent.map(ToString::to_string),
            document_type: document_type.to_string(),
        })
    }

    pub fn report(id: &str, period_start: Option<&str>) -> Document {
        Document {
            header: DocumentHeader {
                id: id.to_string(),
                document_type: crate::document_models::EXPENSE_REPORT_TYPE.to_string(),
                name: id.to_string(),
            },
            state: DocumentState {
                global: serde_json::json!({ "periodStart": period_start }),
                local: serde_json::json!({}),
            },
        }
    }

    pub fn document(id: &str, document_type: &str) -> Document {
        Document {
            header: DocumentHeader {
                id: id.to_string(),
                document_type: document_type.to_string(),
                name: id.to_string(),
            },
            state: DocumentState::default(),
        }
    }
}

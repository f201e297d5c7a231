use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_folder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_folder: Option<String>,
    pub document_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Node {
    Folder(FolderNode),
    File(FileNode),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Self::Folder(folder) => &folder.id,
            Self::File(file) => &file.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Folder(folder) => &folder.name,
            Self::File(file) => &file.name,
        }
    }

    pub fn parent_folder(&self) -> Option<&str> {
        match self {
            Self::Folder(folder) => folder.parent_folder.as_deref(),
            Self::File(file) => file.parent_folder.as_deref(),
        }
    }

    pub fn as_folder(&self) -> Option<&FolderNode> {
        match self {
            Self::Folder(folder) => Some(folder),
            Self::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Self::File(file) => Some(file),
            Self::Folder(_) => None,
        }
    }

    pub(crate) fn set_parent_folder(&mut self, parent: Option<String>) {
        match self {
            Self::Folder(folder) => folder.parent_folder = parent,
            Self::File(file) => file.parent_folder = parent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentHeader {
    pub id: String,
    pub document_type: String,
    #[serde(default)]
    pub name: String,
}

/// Host document state, split into the shared `global` scope and the
/// per-user `local` scope. Both are kept untyped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentState {
    #[serde(default)]
    pub global: serde_json::Value,
    #[serde(default)]
    pub local: serde_json::Value,
}

/// A materialized document as the store hands it out. Typed views such as
/// [`ExpenseReportState`] are read from `state.global` on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub header: DocumentHeader,
    #[serde(default)]
    pub state: DocumentState,
}

impl Document {
    pub fn id(&self) -> &str {
        &self.header.id
    }

    pub fn document_type(&self) -> &str {
        &self.header.document_type
    }

    /// Returns `None` while the global state is not materialized. A global
    /// object whose fields have the wrong shape reads as an empty report.
    pub fn expense_report_state(&self) -> Option<ExpenseReportState> {
        if !self.state.global.is_object() {
            return None;
        }
        Some(serde_json::from_value(self.state.global.clone()).unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseReportState {
    #[serde(default)]
    pub period_start: Option<String>,
    #[serde(default)]
    pub period_end: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveSnapshot {
    pub drive_id: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub documents: Vec<Document>,
}

impl DriveSnapshot {
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id() == node_id)
    }

    pub fn documents_by_id(&self) -> HashMap<&str, &Document> {
        self.documents
            .iter()
            .map(|document| (document.id(), document))
            .collect()
    }
}

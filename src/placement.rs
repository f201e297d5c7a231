use crate::classify::bucket_year;
use crate::drive::{find_folder_by_name, unfiled_nodes, year_folders};
use crate::models::DriveSnapshot;
use crate::settings::FilingSettings;
use std::collections::BTreeSet;

/// De-duplication state carried between passes by one engine instance.
/// It is never the source of truth for where a node lives; the snapshot is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineState {
    pub processed: BTreeSet<String>,
    pub pending_buckets: BTreeSet<String>,
    pub root_requested: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementCommand {
    CreateRoot {
        drive_id: String,
        name: String,
    },
    MoveToBucket {
        node_id: String,
        year: String,
        folder_id: String,
    },
    CreateBucketAndMove {
        drive_id: String,
        node_id: String,
        year: String,
        root_id: String,
    },
}

impl PlacementCommand {
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::CreateRoot { .. } => None,
            Self::MoveToBucket { node_id, .. } | Self::CreateBucketAndMove { node_id, .. } => Some(node_id.as_str()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassPlan {
    pub commands: Vec<PlacementCommand>,
    /// Reports marked processed this pass because they have no usable period.
    pub left_at_root: Vec<String>,
    /// Reports whose document is not materialized yet.
    pub awaiting_document: Vec<String>,
    /// Reports waiting for an in-flight bucket creation for their year.
    pub awaiting_bucket: Vec<String>,
    pub duplicate_years: Vec<String>,
    pub state: EngineState,
}

/// Computes one reconciliation pass. Pure: the caller applies `plan.state`
/// and dispatches `plan.commands`.
pub fn plan_pass(snapshot: &DriveSnapshot, state: &EngineState, settings: &FilingSettings) -> PassPlan {
    let mut plan = PassPlan {
        state: state.clone(),
        ..PassPlan::default()
    };

    let Some(root) = find_folder_by_name(&snapshot.nodes, &settings.root_folder_name) else {
        if !plan.state.root_requested {
            plan.state.root_requested = true;
            plan.commands.push(PlacementCommand::CreateRoot {
                drive_id: snapshot.drive_id.clone(),
                name: settings.root_folder_name.clone(),
            });
        }
        return plan;
    };

    let buckets = year_folders(&snapshot.nodes, &root.id);
    plan.duplicate_years = buckets.duplicates.clone();
    let documents = snapshot.documents_by_id();

    for file in unfiled_nodes(&snapshot.nodes, &root.id, &settings.document_type) {
        if plan.state.processed.contains(&file.id) {
            continue;
        }

        let Some(report) = documents
            .get(file.id.as_str())
            .filter(|document| document.document_type() == settings.document_type)
            .and_then(|document| document.expense_report_state())
        else {
            plan.awaiting_document.push(file.id.clone());
            continue;
        };

        let Some(year) = bucket_year(report.period_start.as_deref()) else {
            plan.state.processed.insert(file.id.clone());
            plan.left_at_root.push(file.id.clone());
            continue;
        };

        if let Some(bucket) = buckets.by_year.get(&year) {
            plan.state.processed.insert(file.id.clone());
            plan.commands.push(PlacementCommand::MoveToBucket {
                node_id: file.id.clone(),
                year,
                folder_id: bucket.id.clone(),
            });
            continue;
        }

        if plan.state.pending_buckets.contains(&year) {
            plan.awaiting_bucket.push(file.id.clone());
            continue;
        }

        plan.state.processed.insert(file.id.clone());
        plan.state.pending_buckets.insert(year.clone());
        plan.commands.push(PlacementCommand::CreateBucketAndMove {
            drive_id: snapshot.drive_id.clone(),
            node_id: file.id.clone(),
            year,
            root_id: root.id.clone(),
        });
    }

    plan
}

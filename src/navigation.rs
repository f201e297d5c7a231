use crate::document_models::{BUILDER_PROFILE_TYPE, SERVICE_SUBSCRIPTIONS_TYPE};
use crate::drive::first_document_by_type;
use crate::errors::{FilingError, FilingResult};
use crate::models::Document;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CustomView {
    TeamMembers,
    ExpenseReports,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SidebarSection {
    pub id: &'static str,
    pub title: &'static str,
    pub document_type: Option<&'static str>,
    pub custom_view: Option<CustomView>,
}

pub static SIDEBAR_SECTIONS: &[SidebarSection] = &[
    SidebarSection {
        id: "builder-profile",
        title: "Builder Profile",
        document_type: Some(BUILDER_PROFILE_TYPE),
        custom_view: None,
    },
    SidebarSection {
        id: "team-members",
        title: "Team Members",
        document_type: None,
        custom_view: Some(CustomView::TeamMembers),
    },
    SidebarSection {
        id: "service-subscriptions",
        title: "Service Subscriptions",
        document_type: Some(SERVICE_SUBSCRIPTIONS_TYPE),
        custom_view: None,
    },
    SidebarSection {
        id: "expense-reports",
        title: "Expense Reports",
        document_type: None,
        custom_view: Some(CustomView::ExpenseReports),
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NavigationTarget {
    CustomView { view: CustomView },
    OpenDocument { document_id: String },
    CreateDocument { document_type: String },
}

/// The sidebar is only offered once the drive holds a builder profile.
pub fn sidebar_visible(documents: &[Document]) -> bool {
    documents
        .iter()
        .any(|document| document.document_type() == BUILDER_PROFILE_TYPE)
}

/// Documents are treated as singletons per type: the first one found is
/// opened, otherwise a new one is created.
pub fn resolve_section(section_id: &str, documents: &[Document]) -> FilingResult<NavigationTarget> {
    let section = SIDEBAR_SECTIONS
        .iter()
        .find(|section| section.id == section_id)
        .ok_or_else(|| FilingError::NotFound(format!("Unknown sidebar section '{}'", section_id)))?;

    if let Some(view) = section.custom_view {
        return Ok(NavigationTarget::CustomView { view });
    }

    let document_type = section.document_type.ok_or_else(|| {
        FilingError::Internal(format!("Sidebar section '{}' has no target", section_id))
    })?;

    let existing = first_document_by_type(documents);
    Ok(match existing.get(document_type) {
        Some(document_id) => NavigationTarget::OpenDocument {
            document_id: (*document_id).to_string(),
        },
        None => NavigationTarget::CreateDocument {
            document_type: document_type.to_string(),
        },
    })
}

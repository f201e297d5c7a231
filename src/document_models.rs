use serde::Serialize;

pub const BUILDER_PROFILE_TYPE: &str = "powerhouse/builder-profile";
pub const BUILDERS_TYPE: &str = "powerhouse/builders";
pub const SERVICE_SUBSCRIPTIONS_TYPE: &str = "powerhouse/service-subscriptions";
pub const EXPENSE_REPORT_TYPE: &str = "powerhouse/expense-report";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentModel {
    pub document_type: &'static str,
    pub display_name: &'static str,
}

pub static DOCUMENT_MODELS: &[DocumentModel] = &[
    DocumentModel {
        document_type: SERVICE_SUBSCRIPTIONS_TYPE,
        display_name: "Service Subscriptions",
    },
    DocumentModel {
        document_type: EXPENSE_REPORT_TYPE,
        display_name: "Expense Report",
    },
];

pub fn document_model(document_type: &str) -> Option<&'static DocumentModel> {
    DOCUMENT_MODELS
        .iter()
        .find(|model| model.document_type == document_type)
}

/// Drive editor configuration for the Builder Team Admin drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    pub is_drag_and_drop_enabled: bool,
    pub allowed_document_types: Vec<&'static str>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            is_drag_and_drop_enabled: true,
            allowed_document_types: vec![
                SERVICE_SUBSCRIPTIONS_TYPE,
                BUILDERS_TYPE,
                BUILDER_PROFILE_TYPE,
            ],
        }
    }
}

impl EditorConfig {
    pub fn allows(&self, document_type: &str) -> bool {
        self.allowed_document_types.contains(&document_type)
    }
}

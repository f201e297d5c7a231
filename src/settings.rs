use crate::classify::is_year_name;
use crate::document_models::EXPENSE_REPORT_TYPE;
use crate::errors::{FilingError, FilingResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_ROOT_FOLDER_NAME: &str = "Expense Reports";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilingSettings {
    pub root_folder_name: String,
    pub document_type: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for FilingSettings {
    fn default() -> Self {
        Self {
            root_folder_name: DEFAULT_ROOT_FOLDER_NAME.to_string(),
            document_type: EXPENSE_REPORT_TYPE.to_string(),
            log_dir: None,
        }
    }
}

impl FilingSettings {
    pub fn validate(&self) -> FilingResult<()> {
        if self.root_folder_name.trim().is_empty() {
            return Err(FilingError::Config("rootFolderName cannot be empty".to_string()));
        }
        // A year-shaped root would be indistinguishable from its own buckets.
        if is_year_name(&self.root_folder_name) {
            return Err(FilingError::Config(format!(
                "rootFolderName '{}' must not be a four-digit year",
                self.root_folder_name
            )));
        }
        if self.document_type.trim().is_empty() {
            return Err(FilingError::Config("documentType cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Loads settings from a `.yaml`/`.yml` or `.json` file. A missing path
/// yields the defaults.
pub fn load_settings(path: Option<&Path>) -> FilingResult<FilingSettings> {
    let Some(path) = path else {
        return Ok(FilingSettings::default());
    };

    let raw = std::fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let settings: FilingSettings = match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&raw)?,
        "json" => serde_json::from_str(&raw)?,
        other => {
            return Err(FilingError::Config(format!(
                "Unsupported settings format '{}' for {}",
                other,
                path.display()
            )))
        }
    };

    settings.validate()?;
    Ok(settings)
}

use crate::conflicts::Conflict;
use crate::store::StoreError;
use crate::validation::ValidationResult;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Required-field or format failures. Carries every violation found.
    #[error("validation failed: {}", .0.errors.join("; "))]
    Validation(ValidationResult),

    #[error("unique field conflicts: {}", describe_conflicts(.0))]
    Conflicts(Vec<Conflict>),

    #[error("asset not found: {0}")]
    AssetNotFound(i64),

    #[error("preset not found: {0}")]
    PresetNotFound(String),

    #[error("system preset cannot be changed: {0}")]
    PresetProtected(String),

    #[error("preset name must not be empty")]
    PresetNameEmpty,

    #[error("no fields configured to save as preset")]
    PresetEmpty,

    /// Date rows set to today's date need a dynamic/static answer before saving.
    #[error("date choice required for: {}", .0.join(", "))]
    DateChoiceRequired(Vec<String>),

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl EngineError {
    /// Stable code used in IPC error responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::Conflicts(_) => "unique_conflict",
            Self::AssetNotFound(_) => "not_found",
            Self::PresetNotFound(_) => "preset_not_found",
            Self::PresetProtected(_) => "preset_protected",
            Self::PresetNameEmpty | Self::PresetEmpty => "bad_params",
            Self::DateChoiceRequired(_) => "date_choice_required",
            Self::Persistence(_) => "db_query_failed",
        }
    }
}

fn describe_conflicts(conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(|c| format!("{} '{}'", c.field_name, c.field_value))
        .collect::<Vec<_>>()
        .join(", ")
}

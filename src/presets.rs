//! Named bulk-edit presets.
//!
//! Presets persist inside the inventory config as `{type, fields}` docs. Rows
//! whose value is the `current_date` sentinel resolve to the load day's date.

use crate::error::{EngineError, Result};
use crate::mutation::{ChangeInstruction, MutationBatch, Operation};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CURRENT_DATE_SENTINEL: &str = "current_date";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetKind {
    System,
    #[default]
    User,
}

/// Persisted shape. Older configs stored a bare row array; those load as
/// user presets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PresetDocRepr")]
pub struct PresetDoc {
    #[serde(rename = "type")]
    pub kind: PresetKind,
    pub fields: Vec<ChangeInstruction>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PresetDocRepr {
    Typed {
        #[serde(rename = "type", default)]
        kind: PresetKind,
        fields: Vec<ChangeInstruction>,
    },
    Bare(Vec<ChangeInstruction>),
}

impl From<PresetDocRepr> for PresetDoc {
    fn from(repr: PresetDocRepr) -> Self {
        match repr {
            PresetDocRepr::Typed { kind, fields } => Self { kind, fields },
            PresetDocRepr::Bare(fields) => Self {
                kind: PresetKind::User,
                fields,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresetValue {
    Literal(String),
    CurrentDate,
}

impl PresetValue {
    fn from_stored(raw: &str) -> Self {
        if raw == CURRENT_DATE_SENTINEL {
            Self::CurrentDate
        } else {
            Self::Literal(raw.to_string())
        }
    }

    fn to_stored(&self) -> String {
        match self {
            Self::Literal(v) => v.clone(),
            Self::CurrentDate => CURRENT_DATE_SENTINEL.to_string(),
        }
    }

    pub fn resolve(&self, today: NaiveDate) -> String {
        match self {
            Self::Literal(v) => v.clone(),
            Self::CurrentDate => format_display_date(today),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetEntry {
    pub field_name: String,
    pub operation: Operation,
    pub value: PresetValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub name: String,
    pub kind: PresetKind,
    pub entries: Vec<PresetEntry>,
}

impl Preset {
    fn from_doc(name: &str, doc: &PresetDoc) -> Self {
        Self {
            name: name.to_string(),
            kind: doc.kind,
            entries: doc
                .fields
                .iter()
                .map(|row| PresetEntry {
                    field_name: row.field_name.clone(),
                    operation: row.operation,
                    value: PresetValue::from_stored(&row.value),
                })
                .collect(),
        }
    }

    fn to_doc(&self) -> PresetDoc {
        PresetDoc {
            kind: self.kind,
            fields: self
                .entries
                .iter()
                .map(|e| ChangeInstruction::new(e.field_name.clone(), e.operation, e.value.to_stored()))
                .collect(),
        }
    }

    pub fn has_dynamic_date(&self) -> bool {
        self.entries.iter().any(|e| e.value == PresetValue::CurrentDate)
    }
}

/// Answer for a date row that holds today's date at save time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateChoice {
    Dynamic,
    Static,
}

/// Month zero-padded, day not: `08/3/2025`.
pub fn format_display_date(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.format("%m"), date.day(), date.format("%Y"))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetStore {
    presets: BTreeMap<String, Preset>,
}

impl PresetStore {
    pub fn from_docs(docs: &BTreeMap<String, PresetDoc>) -> Self {
        let presets = docs
            .iter()
            .map(|(name, doc)| (name.clone(), Preset::from_doc(name, doc)))
            .collect();
        Self { presets }
    }

    pub fn to_docs(&self) -> BTreeMap<String, PresetDoc> {
        self.presets
            .iter()
            .map(|(name, p)| (name.clone(), p.to_doc()))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.presets.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Preset> {
        self.presets.values()
    }

    /// Saves (or overwrites) a user preset from the current change rows.
    ///
    /// Rows without a field are dropped. A date row whose value equals
    /// `today` in display format is passed to `choose`; `None` means the
    /// caller has no answer yet, and the save fails listing every such field.
    pub fn save<F>(
        &mut self,
        name: &str,
        rows: &[ChangeInstruction],
        today: NaiveDate,
        mut choose: F,
    ) -> Result<&Preset>
    where
        F: FnMut(&ChangeInstruction) -> Option<DateChoice>,
    {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::PresetNameEmpty);
        }
        if self.presets.get(name).map(|p| p.kind) == Some(PresetKind::System) {
            return Err(EngineError::PresetProtected(name.to_string()));
        }

        let today_text = format_display_date(today);
        let mut entries = Vec::new();
        let mut unanswered = Vec::new();
        for row in rows {
            let field = row.field_name.trim();
            if field.is_empty() {
                continue;
            }
            let value = if field.to_lowercase().contains("date") && row.value == today_text {
                match choose(row) {
                    Some(DateChoice::Dynamic) => PresetValue::CurrentDate,
                    Some(DateChoice::Static) => PresetValue::Literal(row.value.clone()),
                    None => {
                        unanswered.push(field.to_string());
                        continue;
                    }
                }
            } else {
                PresetValue::from_stored(&row.value)
            };
            entries.push(PresetEntry {
                field_name: field.to_string(),
                operation: row.operation,
                value,
            });
        }
        if !unanswered.is_empty() {
            return Err(EngineError::DateChoiceRequired(unanswered));
        }
        if entries.is_empty() {
            return Err(EngineError::PresetEmpty);
        }

        tracing::info!(preset = name, rows = entries.len(), "preset saved");
        let preset = Preset {
            name: name.to_string(),
            kind: PresetKind::User,
            entries,
        };
        self.presets.insert(name.to_string(), preset);
        self.presets
            .get(name)
            .ok_or_else(|| EngineError::PresetNotFound(name.to_string()))
    }

    /// The preset's rows in stored order, dynamic dates resolved to `today`.
    /// The result replaces whatever batch the caller was building.
    pub fn load(&self, name: &str, today: NaiveDate) -> Result<MutationBatch> {
        let preset = self
            .presets
            .get(name)
            .ok_or_else(|| EngineError::PresetNotFound(name.to_string()))?;
        Ok(preset
            .entries
            .iter()
            .map(|e| ChangeInstruction::new(e.field_name.clone(), e.operation, e.value.resolve(today)))
            .collect())
    }

    pub fn delete(&mut self, name: &str) -> Result<Preset> {
        match self.presets.get(name).map(|p| p.kind) {
            None => Err(EngineError::PresetNotFound(name.to_string())),
            Some(PresetKind::System) => Err(EngineError::PresetProtected(name.to_string())),
            Some(PresetKind::User) => self
                .presets
                .remove(name)
                .ok_or_else(|| EngineError::PresetNotFound(name.to_string())),
        }
    }
}

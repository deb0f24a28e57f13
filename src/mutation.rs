use crate::error::Result;
use crate::fields::{find_by_display, FieldDescriptor, FieldKind};
use crate::store::{AssetRecord, AssetStore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    #[default]
    Replace,
    Append,
}

impl Operation {
    /// Lenient: anything that is not an append spelling is a replace.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "append to" | "append" | "append_to" => Self::Append,
            _ => Self::Replace,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Append => "append to",
        }
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(Self::parse(&raw))
    }
}

/// One bulk-edit row. `field_name` is a display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeInstruction {
    #[serde(rename = "field")]
    pub field_name: String,
    #[serde(default)]
    pub operation: Operation,
    #[serde(default)]
    pub value: String,
}

impl ChangeInstruction {
    pub fn new(field_name: impl Into<String>, operation: Operation, value: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            operation,
            value: value.into(),
        }
    }

    pub fn is_inert(&self) -> bool {
        self.field_name.trim().is_empty() || self.value.trim().is_empty()
    }
}

pub type MutationBatch = Vec<ChangeInstruction>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedBatch {
    pub asset_id: i64,
    pub changes: BTreeMap<String, String>,
    pub updated: bool,
}

/// Folds `batch` over the snapshot and returns the final value of every
/// touched storage column. Later rows see the result of earlier ones.
/// Values are trimmed before use.
pub fn compute_changes(
    snapshot: &AssetRecord,
    batch: &[ChangeInstruction],
    descriptors: &[FieldDescriptor],
) -> BTreeMap<String, String> {
    let mut changes: BTreeMap<String, String> = BTreeMap::new();
    for instruction in batch {
        if instruction.is_inert() {
            continue;
        }
        let Some(descriptor) = find_by_display(descriptors, &instruction.field_name) else {
            tracing::debug!(field = %instruction.field_name, "bulk instruction for unknown field skipped");
            continue;
        };
        let column = &descriptor.storage_name;
        let value = instruction.value.trim();
        let next = match instruction.operation {
            Operation::Replace => value.to_string(),
            Operation::Append => {
                let current = changes
                    .get(column)
                    .map(String::as_str)
                    .or_else(|| snapshot.get(column))
                    .unwrap_or("");
                if current.is_empty() {
                    value.to_string()
                } else {
                    let sep = if descriptor.kind == FieldKind::Multiline {
                        "\n"
                    } else {
                        " "
                    };
                    format!("{}{}{}", current, sep, value)
                }
            }
        };
        changes.insert(column.clone(), next);
    }
    changes
}

/// Computes the batch and hands the result to the store in one update call.
/// Nothing is written when the batch has no effective rows.
pub fn apply_batch<S>(
    store: &S,
    snapshot: &AssetRecord,
    batch: &[ChangeInstruction],
    descriptors: &[FieldDescriptor],
) -> Result<AppliedBatch>
where
    S: AssetStore + ?Sized,
{
    let changes = compute_changes(snapshot, batch, descriptors);
    let updated = if changes.is_empty() {
        false
    } else {
        store.update(snapshot.id, &changes)?
    };
    tracing::info!(asset_id = snapshot.id, fields = changes.len(), updated, "bulk batch applied");
    Ok(AppliedBatch {
        asset_id: snapshot.id,
        changes,
        updated,
    })
}

use crate::fields::{find_by_display, FieldDescriptor};
use crate::store::{AssetStore, StoreResult};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub field_name: String,
    pub field_value: String,
    pub conflicting_record_id: i64,
    pub conflicting_record_summary: String,
}

/// Every active record that already holds one of the candidate's unique
/// values. `exclude_id` is the record being updated, if any.
///
/// A failed store query yields no conflicts; the failure is logged only.
pub fn detect_conflicts<S>(
    store: &S,
    candidate: &BTreeMap<String, String>,
    unique_fields: &[String],
    descriptors: &[FieldDescriptor],
    exclude_id: Option<i64>,
) -> Vec<Conflict>
where
    S: AssetStore + ?Sized,
{
    match scan(store, candidate, unique_fields, descriptors, exclude_id) {
        Ok(conflicts) => conflicts,
        Err(e) => {
            tracing::warn!(error = %e, "conflict check failed; continuing without it");
            Vec::new()
        }
    }
}

fn scan<S>(
    store: &S,
    candidate: &BTreeMap<String, String>,
    unique_fields: &[String],
    descriptors: &[FieldDescriptor],
    exclude_id: Option<i64>,
) -> StoreResult<Vec<Conflict>>
where
    S: AssetStore + ?Sized,
{
    let active = store.active_columns()?;
    let mut conflicts = Vec::new();
    for field in unique_fields {
        let column = match find_by_display(descriptors, field) {
            Some(d) => d.storage_name.clone(),
            None => store.column_for_header(field),
        };
        if column.is_empty() || !active.iter().any(|c| *c == column) {
            continue;
        }
        let Some(value) = candidate.get(&column).map(|v| v.trim()) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        for hit in store.find_by_exact(&column, value)? {
            if Some(hit.id) == exclude_id {
                continue;
            }
            conflicts.push(Conflict {
                field_name: field.clone(),
                field_value: value.to_string(),
                conflicting_record_id: hit.id,
                conflicting_record_summary: hit.summary(),
            });
        }
    }
    Ok(conflicts)
}

/// Message body listing each collision, one per line.
pub fn format_conflicts(conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(|c| {
            format!(
                "{} '{}' is already used by {}",
                c.field_name, c.field_value, c.conflicting_record_summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

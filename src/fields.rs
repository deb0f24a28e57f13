//! Template header -> storage field resolution.
//!
//! A template is a free-form header row; the assets table is whatever columns
//! the store currently has. The resolver pairs the two, dropping anything it
//! cannot place instead of failing, and decides once how each field is edited.

use crate::config::InventoryConfig;
use crate::db::SYSTEM_COLUMNS;
use crate::store::{AssetRecord, AssetStore};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Storage columns that always hold dates, whatever their header says.
pub const DATE_COLUMNS: [&str; 4] = ["audit_date", "entry_date", "created_date", "modified_date"];

// Title-cased column names that read badly; the template spelling wins.
const HEADER_OVERRIDES: [(&str, &str); 13] = [
    ("Asset No", "Asset No."),
    ("Ip Address", "IP Address"),
    ("Mac Address", "MAC Address"),
    ("Po Number", "PO Number"),
    ("Hmr Entrance", "HMR# (Entrance)"),
    ("Hmr Exit", "HMR# (Exit)"),
    ("Media Control Number", "Media Control#"),
    ("Tsco Control Number", "TSCO Control#"),
    ("Child Asset Yn", "Child Asset? (Y/N)"),
    ("Service Contract", "Service Contract? (Y/N)"),
    ("Multi Install", "Multi-Install? (Y/N, Child Assets only)"),
    ("Reservable", "Reservable? (Y/N)"),
    ("Delete Flag", "Delete? (Y/N)"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Dropdown,
    Date,
    Multiline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub display_name: String,
    pub storage_name: String,
    pub kind: FieldKind,
}

/// Builds the descriptor set for one template under one config.
///
/// Headers that are blank, excluded, unmapped, system columns, missing from
/// the live table, or repeat an earlier header are skipped with a debug log.
/// When nothing survives, descriptors are derived from the table itself.
pub fn resolve_descriptors<S>(
    headers: &[String],
    config: &InventoryConfig,
    store: &S,
) -> Vec<FieldDescriptor>
where
    S: AssetStore + ?Sized,
{
    let active: Vec<String> = match store.active_columns() {
        Ok(cols) => cols,
        Err(e) => {
            tracing::warn!(error = %e, "cannot read asset columns; no fields resolved");
            return Vec::new();
        }
    };
    let active_set: HashSet<&str> = active.iter().map(String::as_str).collect();
    let mapping = store.column_mapping(headers);

    let mut out: Vec<FieldDescriptor> = Vec::new();
    let mut seen_storage: HashMap<String, String> = HashMap::new();
    for header in headers {
        if header.trim().is_empty() {
            continue;
        }
        if config.is_excluded(header) {
            continue;
        }
        let Some(column) = mapping.get(header) else {
            tracing::debug!(header = %header, "template header has no storage column");
            continue;
        };
        if SYSTEM_COLUMNS.contains(&column.as_str()) {
            tracing::debug!(header = %header, column = %column, "header maps to a system column");
            continue;
        }
        if !active_set.contains(column.as_str()) {
            tracing::debug!(header = %header, column = %column, "mapped column missing from store");
            continue;
        }
        if let Some(first) = seen_storage.get(column) {
            tracing::warn!(
                header = %header,
                first = %first,
                column = %column,
                "duplicate template field dropped; first occurrence kept"
            );
            continue;
        }
        seen_storage.insert(column.clone(), header.clone());
        out.push(FieldDescriptor {
            display_name: header.clone(),
            storage_name: column.clone(),
            kind: classify(header, column, config, store),
        });
    }

    if out.is_empty() {
        tracing::debug!("no template fields resolved; deriving fields from store columns");
        return fallback_descriptors(&active, config, store);
    }
    out
}

/// Descriptors straight from the table, in declaration order.
pub fn fallback_descriptors<S>(
    columns: &[String],
    config: &InventoryConfig,
    store: &S,
) -> Vec<FieldDescriptor>
where
    S: AssetStore + ?Sized,
{
    columns
        .iter()
        .filter(|c| !SYSTEM_COLUMNS.contains(&c.as_str()))
        .filter_map(|column| {
            let display = humanize_column(column);
            if config.is_excluded(&display) {
                return None;
            }
            let kind = classify(&display, column, config, store);
            Some(FieldDescriptor {
                display_name: display,
                storage_name: column.clone(),
                kind,
            })
        })
        .collect()
}

fn classify<S>(display: &str, column: &str, config: &InventoryConfig, store: &S) -> FieldKind
where
    S: AssetStore + ?Sized,
{
    if config.is_dropdown(display) {
        FieldKind::Dropdown
    } else if display.to_lowercase().contains("date")
        || DATE_COLUMNS.contains(&column.to_ascii_lowercase().as_str())
    {
        FieldKind::Date
    } else if store.is_multiline(column) {
        FieldKind::Multiline
    } else {
        FieldKind::Text
    }
}

/// `serial_number` -> `Serial Number`, with the overrides table applied.
pub fn humanize_column(column: &str) -> String {
    let title = column
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    HEADER_OVERRIDES
        .iter()
        .find(|(from, _)| *from == title)
        .map(|(_, to)| to.to_string())
        .unwrap_or(title)
}

pub fn find_by_display<'a>(descriptors: &'a [FieldDescriptor], display: &str) -> Option<&'a FieldDescriptor> {
    descriptors.iter().find(|d| d.display_name == display)
}

pub fn find_by_storage<'a>(descriptors: &'a [FieldDescriptor], storage: &str) -> Option<&'a FieldDescriptor> {
    descriptors.iter().find(|d| d.storage_name == storage)
}

/// Form values keyed by display name -> trimmed, non-empty values keyed by
/// storage name. Values for fields without a descriptor are dropped.
pub fn to_storage_values(
    form: &HashMap<String, String>,
    descriptors: &[FieldDescriptor],
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for d in descriptors {
        let Some(value) = form.get(&d.display_name) else {
            continue;
        };
        let value = value.trim();
        if !value.is_empty() {
            out.insert(d.storage_name.clone(), value.to_string());
        }
    }
    out
}

/// Edit flow: trimmed form values that differ from the record, keyed by
/// storage name. A field cleared in the form is reported as `""`. Fields the
/// form does not mention are left alone.
pub fn changed_values(
    form: &HashMap<String, String>,
    descriptors: &[FieldDescriptor],
    record: &AssetRecord,
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for d in descriptors {
        let Some(value) = form.get(&d.display_name) else {
            continue;
        };
        let value = value.trim();
        let current = record.get(&d.storage_name).unwrap_or("").trim();
        if value != current {
            out.insert(d.storage_name.clone(), value.to_string());
        }
    }
    out
}

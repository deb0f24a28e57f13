use crate::db;
use crate::presets::{PresetDoc, PresetKind};
use crate::mutation::{ChangeInstruction, Operation};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const CONFIG_SETTINGS_KEY: &str = "inventory.config";

/// Field lists hold template display names (header text).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub default_template_path: String,
    pub dropdown_fields: Vec<String>,
    pub required_fields: Vec<String>,
    pub excluded_fields: Vec<String>,
    pub unique_fields: Vec<String>,
    pub bulk_update_presets: BTreeMap<String, PresetDoc>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for InventoryConfig {
    fn default() -> Self {
        let mut presets = BTreeMap::new();
        presets.insert(
            "Update Audit Date".to_string(),
            PresetDoc {
                kind: PresetKind::System,
                fields: vec![ChangeInstruction {
                    field_name: "Audit Date".to_string(),
                    operation: Operation::Replace,
                    value: crate::presets::CURRENT_DATE_SENTINEL.to_string(),
                }],
            },
        );
        Self {
            default_template_path: String::new(),
            dropdown_fields: strings(&[
                "System Name",
                "*Asset Type",
                "*Manufacturer",
                "*Model",
                "Status",
                "Location",
                "Room",
                "Cubicle",
                "Child Asset? (Y/N)",
            ]),
            required_fields: strings(&[
                "System Name",
                "*Asset Type",
                "*Manufacturer",
                "*Model",
                "Status",
                "Location",
                "Room",
                "Serial Number",
            ]),
            excluded_fields: strings(&[
                "Asset No.",
                "Version",
                "Client (user names, semicolon delimited)",
                "Service Contract? (Y/N)",
                "Contract Expiration Date",
                "Billing Rate Name",
                "Warranty Type",
                "Multi-Install? (Y/N, Child Assets only)",
                "Install Count (Child Assets only)",
                "Reservable? (Y/N)",
                "Discovered Serial Number",
                "Discovery Sync ID",
                "Delete? (Y/N)",
                "NOTE: * = Field required for new records.",
            ]),
            unique_fields: strings(&[
                "Serial Number",
                "IP Address",
                "MAC Address",
                "Phone Number",
                "Media Control#",
                "TSCO Control#",
                "Tamper Seal",
                "Network Name",
            ]),
            bulk_update_presets: presets,
        }
    }
}

impl InventoryConfig {
    pub fn is_excluded(&self, display_name: &str) -> bool {
        self.excluded_fields.iter().any(|f| f == display_name)
    }

    pub fn is_dropdown(&self, display_name: &str) -> bool {
        self.dropdown_fields.iter().any(|f| f == display_name)
    }

    pub fn is_required(&self, display_name: &str) -> bool {
        self.required_fields.iter().any(|f| f == display_name)
    }

    /// Applies a partial update. Unknown keys and wrongly-typed values reject
    /// the whole patch; `self` is left untouched on error.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        let mut next = self.clone();
        for (k, v) in patch {
            match k.as_str() {
                "default_template_path" => {
                    let s = v
                        .as_str()
                        .ok_or_else(|| format!("{} must be string", k))?;
                    next.default_template_path = s.trim().to_string();
                }
                "dropdown_fields" => next.dropdown_fields = parse_string_list(v, k)?,
                "required_fields" => next.required_fields = parse_string_list(v, k)?,
                "excluded_fields" => next.excluded_fields = parse_string_list(v, k)?,
                "unique_fields" => next.unique_fields = parse_string_list(v, k)?,
                "bulk_update_presets" => {
                    return Err("bulk_update_presets are managed through presets.*".into())
                }
                _ => return Err(format!("unknown config field: {}", k)),
            }
        }
        *self = next;
        Ok(())
    }
}

fn parse_string_list(v: &Value, key: &str) -> Result<Vec<String>, String> {
    let arr = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array of strings", key))?;
    let mut out: Vec<String> = Vec::with_capacity(arr.len());
    for item in arr {
        let s = item
            .as_str()
            .ok_or_else(|| format!("{} must be an array of strings", key))?;
        if s.trim().is_empty() || out.iter().any(|o| o == s) {
            continue;
        }
        out.push(s.to_string());
    }
    Ok(out)
}

/// Reads the workspace config, falling back to defaults when none was saved.
pub fn load(conn: &Connection) -> anyhow::Result<InventoryConfig> {
    match db::settings_get_json(conn, CONFIG_SETTINGS_KEY)? {
        Some(v) => Ok(serde_json::from_value(v)?),
        None => Ok(InventoryConfig::default()),
    }
}

pub fn save(conn: &Connection, config: &InventoryConfig) -> anyhow::Result<()> {
    db::settings_set_json(conn, CONFIG_SETTINGS_KEY, &serde_json::to_value(config)?)
}

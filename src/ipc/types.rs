use crate::config::InventoryConfig;
use crate::fields::FieldDescriptor;
use crate::presets::PresetStore;
use crate::validation::AssetValidator;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Everything one sidecar session owns. Config and presets are reloaded
/// from the workspace on `workspace.select`.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: InventoryConfig,
    pub presets: PresetStore,
    pub validator: AssetValidator,
    pub template_headers: Vec<String>,
    pub descriptors: Vec<FieldDescriptor>,
}

impl AppState {
    pub fn new(validator: AssetValidator) -> Self {
        let config = InventoryConfig::default();
        let presets = PresetStore::from_docs(&config.bulk_update_presets);
        Self {
            workspace: None,
            db: None,
            config,
            presets,
            validator,
            template_headers: Vec::new(),
            descriptors: Vec::new(),
        }
    }

    /// Drops the resolved fields so the next request re-resolves them.
    pub fn invalidate_fields(&mut self) {
        self.descriptors.clear();
    }
}

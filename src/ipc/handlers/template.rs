use crate::config;
use crate::db;
use crate::fields::{FieldDescriptor, FieldKind};
use crate::ipc::error::ok;
use crate::ipc::helpers::{ensure_descriptors, get_bool, get_str, no_workspace, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteAssetStore;
use crate::template;
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

fn fields_payload(state: &AppState, conn: &Connection, descriptors: &[FieldDescriptor]) -> serde_json::Value {
    let store = SqliteAssetStore::new(conn);
    let mut dropdown_values = serde_json::Map::new();
    let fields: Vec<serde_json::Value> = descriptors
        .iter()
        .map(|d| {
            if d.kind == FieldKind::Dropdown {
                let values = store.distinct_values(&d.storage_name).unwrap_or_else(|e| {
                    tracing::debug!(column = %d.storage_name, error = %e, "dropdown values unavailable");
                    Vec::new()
                });
                dropdown_values.insert(d.display_name.clone(), json!(values));
            }
            json!({
                "displayName": d.display_name,
                "storageName": d.storage_name,
                "kind": d.kind,
                "required": state.config.is_required(&d.display_name),
                "unique": state.config.unique_fields.contains(&d.display_name),
            })
        })
        .collect();
    json!({
        "fields": fields,
        "dropdownValues": dropdown_values,
    })
}

fn handle_template_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.db.is_none() {
        return no_workspace(req);
    }
    let path = match get_str(req, "path").map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => p.to_string(),
        None if !state.config.default_template_path.is_empty() => {
            state.config.default_template_path.clone()
        }
        None => {
            return HandlerErr::bad_params("missing path and no default template configured")
                .response(&req.id)
        }
    };

    let headers = match template::read_headers(&PathBuf::from(&path)) {
        Ok(h) => h,
        Err(e) => {
            return HandlerErr {
                code: "io_failed",
                message: format!("{e:#}"),
                details: Some(json!({ "path": path })),
            }
            .response(&req.id)
        }
    };

    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let added = match db::sync_template_columns(conn, &headers) {
        Ok(added) => added,
        Err(e) => return HandlerErr::new("db_update_failed", format!("{e:#}")).response(&req.id),
    };

    if get_bool(req, "setDefault") && state.config.default_template_path != path {
        let mut next = state.config.clone();
        next.default_template_path = path.clone();
        if let Err(e) = config::save(conn, &next) {
            return HandlerErr::new("db_update_failed", format!("{e:#}")).response(&req.id);
        }
        state.config = next;
    }

    state.template_headers = headers.clone();
    state.invalidate_fields();
    let descriptors = match ensure_descriptors(state) {
        Ok(d) => d,
        Err(e) => return e.response(&req.id),
    };
    tracing::info!(path = %path, fields = descriptors.len(), added = added.len(), "template loaded");

    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let mut result = fields_payload(state, conn, &descriptors);
    result["templatePath"] = json!(path);
    result["headers"] = json!(headers);
    result["addedColumns"] = json!(added);
    ok(&req.id, result)
}

fn handle_template_fields(state: &mut AppState, req: &Request) -> serde_json::Value {
    let descriptors = match ensure_descriptors(state) {
        Ok(d) => d,
        Err(e) => return e.response(&req.id),
    };
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    ok(&req.id, fields_payload(state, conn, &descriptors))
}

fn handle_template_check_compatibility(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("headers").and_then(|v| v.as_array()) else {
        return HandlerErr::bad_params("headers must be an array of strings").response(&req.id);
    };
    let csv_headers: Vec<String> = raw
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let template_fields: Vec<String> = state
        .template_headers
        .iter()
        .filter(|h| !h.trim().is_empty())
        .cloned()
        .collect();
    let result = state
        .validator
        .validate_template_compatibility(&csv_headers, &template_fields);
    ok(&req.id, json!(result))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "template.load" => Some(handle_template_load(state, req)),
        "template.fields" => Some(handle_template_fields(state, req)),
        "template.checkCompatibility" => Some(handle_template_check_compatibility(state, req)),
        _ => None,
    }
}

use crate::conflicts::{detect_conflicts, format_conflicts};
use crate::duplicates::{self, SubmitOutcome};
use crate::error::EngineError;
use crate::fields::{self, find_by_display, FieldDescriptor};
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    display_values, ensure_descriptors, get_bool, get_str, required_i64, string_map, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{AssetRecord, AssetStore, SqliteAssetStore};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};

const DEFAULT_SEARCH_LIMIT: i64 = 1000;

fn persistence(e: EngineError, code: &'static str) -> HandlerErr {
    let mut out = HandlerErr::from(e);
    if out.code == "db_query_failed" {
        out.code = code;
    }
    out
}

fn record_json(record: &AssetRecord, descriptors: &[FieldDescriptor]) -> serde_json::Value {
    json!({
        "id": record.id,
        "summary": record.summary(),
        "values": display_values(&record.values, descriptors),
        "record": record.values,
    })
}

fn load_active(store: &SqliteAssetStore<'_>, id: i64) -> Result<AssetRecord, HandlerErr> {
    let record = store
        .get_by_id(id)
        .map_err(|e| persistence(e.into(), "db_query_failed"))?;
    match record {
        Some(r) if r.get("is_deleted") != Some("1") => Ok(r),
        _ => Err(HandlerErr::from(EngineError::AssetNotFound(id))),
    }
}

fn assets_validate(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let form = string_map(req, "values")?;
    let result = state.validator.validate(&form, &state.config.required_fields);
    Ok(json!({
        "isValid": result.is_valid,
        "errors": result.errors,
        "warnings": result.warnings,
        "message": result.all_messages(),
    }))
}

fn assets_validate_field(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(field) = get_str(req, "field") else {
        return Err(HandlerErr::bad_params("missing field"));
    };
    let value = get_str(req, "value").unwrap_or("");
    let message = state.validator.validate_field(field, value);
    Ok(json!({
        "valid": message.is_none(),
        "message": message.unwrap_or(""),
    }))
}

fn assets_check_conflicts(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let form = string_map(req, "values")?;
    let exclude_id = req.params.get("excludeId").and_then(|v| v.as_i64());
    let descriptors = ensure_descriptors(state)?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let store = SqliteAssetStore::new(conn);
    let candidate = fields::to_storage_values(&form, &descriptors);
    let conflicts = detect_conflicts(
        &store,
        &candidate,
        &state.config.unique_fields,
        &descriptors,
        exclude_id,
    );
    Ok(json!({
        "conflicts": conflicts,
        "message": format_conflicts(&conflicts),
    }))
}

/// Validate, then create or overwrite. An existing serial number without
/// `overwrite: true` answers `duplicate_serial` and writes nothing; the
/// caller confirms by resending with the flag set.
fn assets_submit(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let form = string_map(req, "values")?;
    let overwrite = get_bool(req, "overwrite");
    let descriptors = ensure_descriptors(state)?;

    let validation = state.validator.validate(&form, &state.config.required_fields);
    if !validation.is_valid {
        return Err(EngineError::Validation(validation).into());
    }

    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let store = SqliteAssetStore::new(conn);
    let values = fields::to_storage_values(&form, &descriptors);
    if values.is_empty() {
        return Err(HandlerErr::new("no_changes", "no field values to save"));
    }

    let mut declined: Option<AssetRecord> = None;
    let outcome = duplicates::submit(
        &store,
        &values,
        &state.config.unique_fields,
        &descriptors,
        |existing| {
            if !overwrite {
                declined = Some(existing.clone());
            }
            overwrite
        },
    )
    .map_err(|e| persistence(e, "db_insert_failed"))?;

    match outcome {
        SubmitOutcome::Aborted { id } => {
            let details = declined
                .map(|r| {
                    json!({
                        "existingId": r.id,
                        "summary": r.summary(),
                        "existing": display_values(&r.values, &descriptors),
                    })
                })
                .unwrap_or_else(|| json!({ "existingId": id }));
            Err(HandlerErr {
                code: "duplicate_serial",
                message: "an asset with this serial number already exists; resend with overwrite to replace it"
                    .to_string(),
                details: Some(details),
            })
        }
        other => {
            let mut result = json!(other);
            result["warnings"] = json!(validation.warnings);
            Ok(result)
        }
    }
}

fn assets_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let id = required_i64(req, "id")?;
    let descriptors = ensure_descriptors(state)?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let store = SqliteAssetStore::new(conn);
    let record = load_active(&store, id)?;
    Ok(record_json(&record, &descriptors))
}

fn assets_search(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let filters = match req.params.get("filters") {
        None | Some(serde_json::Value::Null) => HashMap::new(),
        Some(_) => string_map(req, "filters")?,
    };
    let limit = req
        .params
        .get("limit")
        .and_then(|v| v.as_i64())
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_SEARCH_LIMIT);
    let descriptors = ensure_descriptors(state)?;

    let mut by_column = BTreeMap::new();
    for (display, value) in filters {
        let Some(d) = find_by_display(&descriptors, &display) else {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("unknown field: {}", display),
                details: Some(json!({ "field": display })),
            });
        };
        by_column.insert(d.storage_name.clone(), value);
    }

    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let store = SqliteAssetStore::new(conn);
    let rows = store
        .search(&by_column, limit)
        .map_err(|e| persistence(e.into(), "db_query_failed"))?;
    let assets: Vec<serde_json::Value> = rows.iter().map(|r| record_json(r, &descriptors)).collect();
    Ok(json!({ "assets": assets, "count": assets.len() }))
}

/// Edit flow: only changed fields are written, required fields are checked
/// against the merged record, and the record never conflicts with itself.
fn assets_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let id = required_i64(req, "id")?;
    let form = string_map(req, "values")?;
    let descriptors = ensure_descriptors(state)?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let store = SqliteAssetStore::new(conn);
    let existing = load_active(&store, id)?;

    let mut merged: HashMap<String, String> = descriptors
        .iter()
        .map(|d| {
            let v = existing.get(&d.storage_name).unwrap_or("").to_string();
            (d.display_name.clone(), v)
        })
        .collect();
    for (k, v) in &form {
        merged.insert(k.clone(), v.clone());
    }
    let validation = state.validator.validate(&merged, &state.config.required_fields);
    if !validation.is_valid {
        return Err(EngineError::Validation(validation).into());
    }

    let changed = fields::changed_values(&form, &descriptors, &existing);
    if changed.is_empty() {
        return Err(HandlerErr::new("no_changes", "no changes were detected"));
    }
    let conflicts = detect_conflicts(
        &store,
        &changed,
        &state.config.unique_fields,
        &descriptors,
        Some(id),
    );
    if !conflicts.is_empty() {
        return Err(EngineError::Conflicts(conflicts).into());
    }

    let updated = store
        .update(id, &changed)
        .map_err(|e| persistence(e.into(), "db_update_failed"))?;
    tracing::info!(asset_id = id, fields = changed.len(), "asset edited");
    Ok(json!({
        "id": id,
        "updated": updated,
        "changedFields": changed,
        "warnings": validation.warnings,
    }))
}

fn assets_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let id = required_i64(req, "id")?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let store = SqliteAssetStore::new(conn);
    let deleted = store
        .soft_delete(id)
        .map_err(|e| persistence(e.into(), "db_update_failed"))?;
    if !deleted {
        return Err(EngineError::AssetNotFound(id).into());
    }
    Ok(json!({ "id": id, "deleted": true }))
}

fn assets_history(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let id = required_i64(req, "id")?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let store = SqliteAssetStore::new(conn);
    let entries = store
        .audit_history(id)
        .map_err(|e| persistence(e.into(), "db_query_failed"))?;
    Ok(json!({ "id": id, "entries": entries }))
}

fn respond(req: &Request, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(value) => ok(&req.id, value),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assets.validate" => assets_validate(state, req),
        "assets.validateField" => assets_validate_field(state, req),
        "assets.checkConflicts" => assets_check_conflicts(state, req),
        "assets.submit" => assets_submit(state, req),
        "assets.get" => assets_get(state, req),
        "assets.search" => assets_search(state, req),
        "assets.update" => assets_update(state, req),
        "assets.delete" => assets_delete(state, req),
        "assets.history" => assets_history(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

use crate::config;
use crate::conflicts::detect_conflicts;
use crate::error::EngineError;
use crate::fields::find_by_storage;
use crate::ipc::error::ok;
use crate::ipc::helpers::{ensure_descriptors, required_i64, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::mutation::{self, ChangeInstruction, MutationBatch};
use crate::presets::{DateChoice, Preset, PresetValue};
use crate::store::{AssetRecord, AssetStore, SqliteAssetStore};
use chrono::NaiveDate;
use serde_json::json;
use std::collections::HashMap;

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn parse_batch(req: &Request) -> Result<MutationBatch, HandlerErr> {
    let Some(raw) = req.params.get("changes") else {
        return Err(HandlerErr::bad_params("missing changes"));
    };
    serde_json::from_value(raw.clone()).map_err(|e| HandlerErr {
        code: "bad_params",
        message: format!("changes must be a list of {{field, operation, value}}: {}", e),
        details: None,
    })
}

fn load_snapshot(store: &SqliteAssetStore<'_>, id: i64) -> Result<AssetRecord, HandlerErr> {
    match store.get_by_id(id) {
        Ok(Some(r)) if r.get("is_deleted") != Some("1") => Ok(r),
        Ok(_) => Err(EngineError::AssetNotFound(id).into()),
        Err(e) => Err(HandlerErr::new("db_query_failed", e.to_string())),
    }
}

fn bulk_preview(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let id = required_i64(req, "id")?;
    let batch = parse_batch(req)?;
    let descriptors = ensure_descriptors(state)?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let store = SqliteAssetStore::new(conn);
    let snapshot = load_snapshot(&store, id)?;
    let changes = mutation::compute_changes(&snapshot, &batch, &descriptors);
    let rows: Vec<serde_json::Value> = changes
        .iter()
        .map(|(column, to)| {
            json!({
                "field": find_by_storage(&descriptors, column).map(|d| d.display_name.as_str()),
                "storageName": column,
                "from": snapshot.get(column).unwrap_or(""),
                "to": to,
            })
        })
        .collect();
    Ok(json!({
        "id": id,
        "summary": snapshot.summary(),
        "changes": rows,
    }))
}

/// Applies the batch to one record. Unique fields are still checked, with
/// the record itself excluded.
fn bulk_apply(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let id = required_i64(req, "id")?;
    let batch = parse_batch(req)?;
    let descriptors = ensure_descriptors(state)?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let store = SqliteAssetStore::new(conn);
    let snapshot = load_snapshot(&store, id)?;

    let changes = mutation::compute_changes(&snapshot, &batch, &descriptors);
    if changes.is_empty() {
        return Err(HandlerErr::new(
            "no_changes",
            "specify at least one field to change",
        ));
    }
    let conflicts = detect_conflicts(
        &store,
        &changes,
        &state.config.unique_fields,
        &descriptors,
        Some(id),
    );
    if !conflicts.is_empty() {
        return Err(EngineError::Conflicts(conflicts).into());
    }

    let applied = mutation::apply_batch(&store, &snapshot, &batch, &descriptors).map_err(|e| {
        let mut out = HandlerErr::from(e);
        out.code = "db_update_failed";
        out
    })?;
    Ok(json!(applied))
}

fn preset_json(preset: &Preset) -> serde_json::Value {
    let fields: Vec<serde_json::Value> = preset
        .entries
        .iter()
        .map(|e| {
            let (value, dynamic) = match &e.value {
                PresetValue::Literal(v) => (v.clone(), false),
                PresetValue::CurrentDate => (crate::presets::CURRENT_DATE_SENTINEL.to_string(), true),
            };
            json!({
                "field": e.field_name,
                "operation": e.operation,
                "value": value,
                "dynamicDate": dynamic,
            })
        })
        .collect();
    json!({
        "name": preset.name,
        "type": preset.kind,
        "hasDynamicDate": preset.has_dynamic_date(),
        "fields": fields,
    })
}

fn persist_presets(state: &mut AppState) -> Result<(), HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let mut next = state.config.clone();
    next.bulk_update_presets = state.presets.to_docs();
    config::save(conn, &next).map_err(|e| HandlerErr::new("db_update_failed", format!("{e:#}")))?;
    state.config = next;
    Ok(())
}

fn presets_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let presets: Vec<serde_json::Value> = state.presets.iter().map(preset_json).collect();
    Ok(json!({ "names": state.presets.names(), "presets": presets }))
}

/// `dateChoices` maps a field name to `"dynamic"` or `"static"` for rows that
/// hold today's date. Rows left unanswered fail with `date_choice_required`.
fn presets_save(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    if state.db.is_none() {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    }
    let name = required_str(req, "name")?;
    let rows: Vec<ChangeInstruction> = parse_batch(req)?;
    let choices: HashMap<String, DateChoice> = match req.params.get("dateChoices") {
        None | Some(serde_json::Value::Null) => HashMap::new(),
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| HandlerErr {
            code: "bad_params",
            message: format!("dateChoices must map field names to \"dynamic\" or \"static\": {}", e),
            details: None,
        })?,
    };

    let before = state.presets.clone();
    let saved = state
        .presets
        .save(&name, &rows, today(), |row| choices.get(row.field_name.trim()).copied())
        .map(preset_json)
        .map_err(HandlerErr::from)?;
    if let Err(e) = persist_presets(state) {
        state.presets = before;
        return Err(e);
    }
    Ok(json!({ "preset": saved }))
}

fn presets_load(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(req, "name")?;
    let changes = state.presets.load(&name, today()).map_err(HandlerErr::from)?;
    let kind = state.presets.get(&name).map(|p| p.kind);
    Ok(json!({ "name": name, "type": kind, "changes": changes }))
}

fn presets_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    if state.db.is_none() {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    }
    let name = required_str(req, "name")?;
    let before = state.presets.clone();
    state.presets.delete(&name).map_err(HandlerErr::from)?;
    if let Err(e) = persist_presets(state) {
        state.presets = before;
        return Err(e);
    }
    Ok(json!({ "name": name, "deleted": true }))
}

fn respond(req: &Request, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(value) => ok(&req.id, value),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "bulk.preview" => bulk_preview(state, req),
        "bulk.apply" => bulk_apply(state, req),
        "presets.list" => presets_list(state, req),
        "presets.save" => presets_save(state, req),
        "presets.load" => presets_load(state, req),
        "presets.delete" => presets_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

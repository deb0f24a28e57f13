use crate::config;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::no_workspace;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "config": state.config }))
}

fn handle_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };

    let mut next = state.config.clone();
    if let Err(message) = next.apply_patch(patch) {
        return err(&req.id, "bad_params", message, None);
    }
    if let Err(e) = config::save(conn, &next) {
        return err(&req.id, "db_update_failed", format!("{e:#}"), None);
    }

    let changed: Vec<&String> = patch.keys().collect();
    tracing::info!(keys = ?changed, "config updated");
    state.config = next;
    // Excluded and dropdown lists feed field resolution.
    state.invalidate_fields();
    ok(&req.id, json!({ "config": state.config }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "config.get" => Some(handle_config_get(state, req)),
        "config.update" => Some(handle_config_update(state, req)),
        _ => None,
    }
}

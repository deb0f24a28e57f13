use crate::config;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::presets::PresetStore;
use crate::template;
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "templateLoaded": !state.template_headers.is_empty(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let conn = match db::open_db(&path) {
        Ok(conn) => conn,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:#}"), None),
    };
    let template_path = attach_workspace(state, path.clone(), conn);
    ok(
        &req.id,
        json!({
            "workspacePath": path.to_string_lossy(),
            "templatePath": template_path,
        }),
    )
}

/// Installs an opened workspace: config and presets are reloaded and the
/// default template, if any, is re-read. Returns the template path in use.
pub(crate) fn attach_workspace(
    state: &mut AppState,
    path: PathBuf,
    conn: rusqlite::Connection,
) -> Option<String> {
    let cfg = match config::load(&conn) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "stored config unreadable; using defaults");
            config::InventoryConfig::default()
        }
    };

    state.presets = PresetStore::from_docs(&cfg.bulk_update_presets);
    state.template_headers = Vec::new();
    state.invalidate_fields();

    // Best-effort: a missing or unreadable default template must not keep
    // the workspace from opening. Fields then come from the table itself.
    let mut template_path = None;
    if !cfg.default_template_path.is_empty() {
        match load_default_template(&conn, Path::new(&cfg.default_template_path)) {
            Ok(headers) => {
                state.template_headers = headers;
                template_path = Some(cfg.default_template_path.clone());
            }
            Err(e) => tracing::warn!(
                path = %cfg.default_template_path,
                error = %e,
                "default template not loaded"
            ),
        }
    }

    tracing::info!(workspace = %path.to_string_lossy(), "workspace opened");
    state.config = cfg;
    state.workspace = Some(path);
    state.db = Some(conn);
    template_path
}

fn load_default_template(conn: &rusqlite::Connection, path: &Path) -> anyhow::Result<Vec<String>> {
    let headers = template::read_headers(path)?;
    db::sync_template_columns(conn, &headers)?;
    Ok(headers)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}

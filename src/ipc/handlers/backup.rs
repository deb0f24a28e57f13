use crate::backup;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::core::attach_workspace;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn checkpoint(state: &AppState) {
    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(FULL)") {
            tracing::debug!(error = %e, "wal checkpoint skipped");
        }
    }
}

/// With `outPath` the bundle goes there; without it an automatic backup is
/// rotated inside the workspace.
fn handle_backup_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace_path) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    checkpoint(state);

    let out_path = req
        .params
        .get("outPath")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(out_path) = out_path {
        let out = PathBuf::from(out_path);
        return match backup::export_workspace_bundle(&workspace_path, &out) {
            Ok(export) => ok(
                &req.id,
                json!({
                    "path": out_path,
                    "bundleFormat": export.bundle_format,
                    "entryCount": export.entry_count,
                    "dbSha256": export.db_sha256,
                    "automatic": false,
                }),
            ),
            Err(e) => err(
                &req.id,
                "backup_failed",
                format!("{e:#}"),
                Some(json!({ "path": out_path })),
            ),
        };
    }

    let max_backups = req
        .params
        .get("maxBackups")
        .and_then(|v| v.as_u64())
        .filter(|n| *n > 0)
        .map(|n| n as usize)
        .unwrap_or(backup::DEFAULT_MAX_AUTO_BACKUPS);
    match backup::create_automatic_backup(&workspace_path, max_backups) {
        Ok(path) => ok(
            &req.id,
            json!({
                "path": path.to_string_lossy(),
                "bundleFormat": backup::BUNDLE_FORMAT,
                "automatic": true,
            }),
        ),
        Err(e) => err(&req.id, "backup_failed", format!("{e:#}"), None),
    }
}

fn handle_backup_restore(state: &mut AppState, req: &Request) -> serde_json::Value {
    let in_path = match req.params.get("inPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing inPath", None),
    };
    let Some(workspace_path) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "backup file not found",
            Some(json!({ "path": in_path })),
        );
    }

    // Drop open handle before replacing file.
    state.db = None;

    let imported = backup::import_workspace_bundle(&src, &workspace_path);
    let conn = match db::open_db(&workspace_path) {
        Ok(conn) => conn,
        Err(e) => {
            state.workspace = None;
            return err(&req.id, "db_open_failed", format!("{e:#}"), None);
        }
    };
    // Reattach either way so a failed restore leaves the old workspace usable.
    attach_workspace(state, workspace_path, conn);

    match imported {
        Ok(import) => {
            tracing::info!(path = %in_path, format = %import.bundle_format_detected, "workspace restored");
            ok(
                &req.id,
                json!({
                    "path": in_path,
                    "bundleFormatDetected": import.bundle_format_detected,
                    "checksumVerified": import.checksum_verified,
                }),
            )
        }
        Err(e) => err(
            &req.id,
            "restore_failed",
            format!("{e:#}"),
            Some(json!({ "path": in_path })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.create" => Some(handle_backup_create(state, req)),
        "backup.restore" => Some(handle_backup_restore(state, req)),
        _ => None,
    }
}

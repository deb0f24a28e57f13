mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{
    error_code, request, request_err, spawn_sidecar, temp_dir, valid_form, write_template,
};

fn assert_known(value: &serde_json::Value, method: &str) {
    let code = value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    assert_ne!(code, "not_implemented", "unexpected unknown method for {}", method);
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("assetd-router-smoke");
    let template = write_template(&workspace);
    let bundle_out = workspace.join("smoke-backup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let calls: Vec<(&str, serde_json::Value)> = vec![
        ("health", json!({})),
        ("workspace.select", json!({ "path": workspace.to_string_lossy() })),
        ("template.load", json!({ "path": template.to_string_lossy() })),
        ("template.fields", json!({})),
        ("template.checkCompatibility", json!({ "headers": ["Serial Number"] })),
        ("config.get", json!({})),
        ("assets.validate", json!({ "values": valid_form("SMOKE-1") })),
        ("assets.validateField", json!({ "field": "IP Address", "value": "10.0.0.1" })),
        ("assets.checkConflicts", json!({ "values": valid_form("SMOKE-1") })),
        ("assets.submit", json!({ "values": valid_form("SMOKE-1") })),
        ("assets.search", json!({})),
        ("assets.get", json!({ "id": 1 })),
        ("assets.history", json!({ "id": 1 })),
        (
            "bulk.preview",
            json!({ "id": 1, "changes": [{ "field": "Status", "operation": "Replace", "value": "Retired" }] }),
        ),
        ("presets.list", json!({})),
        ("presets.load", json!({ "name": "Update Audit Date" })),
        ("backup.create", json!({ "outPath": bundle_out.to_string_lossy() })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let value = request(&mut stdin, &mut reader, &format!("{}", i + 1), method, params);
        assert_known(&value, method);
    }

    let unknown = request_err(&mut stdin, &mut reader, "99", "grid.get", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_line_answers_bad_json_and_keeps_serving() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json reply");
    assert_eq!(value["ok"], json!(false));
    assert_eq!(value["error"]["code"], json!("bad_json"));

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], json!(true));
    assert_eq!(health["result"]["templateLoaded"], json!(false));

    let _ = child.kill();
}

#[test]
fn workspace_methods_require_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    for (i, method) in ["assets.search", "config.update", "presets.save", "backup.create"]
        .into_iter()
        .enumerate()
    {
        let params = match method {
            "config.update" => json!({ "patch": {} }),
            "presets.save" => json!({ "name": "x", "changes": [] }),
            _ => json!({}),
        };
        let error = request_err(&mut stdin, &mut reader, &format!("{}", i), method, params);
        assert_eq!(error_code(&error), "no_workspace", "{}", method);
    }

    let _ = child.kill();
}

#[test]
fn workspace_open_failure_reports_a_single_line_message() {
    let dir = temp_dir("assetd-open-failure");
    let not_a_dir = dir.join("plain-file");
    std::fs::write(&not_a_dir, b"occupied").expect("write file");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let error = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": not_a_dir.to_string_lossy() }),
    );
    assert_eq!(error_code(&error), "db_open_failed");
    let message = error["message"].as_str().expect("message");
    assert!(!message.is_empty());
    assert!(!message.contains('\n'), "multi-line message: {}", message);
    assert!(!message.contains("backtrace"));

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(dir);
}

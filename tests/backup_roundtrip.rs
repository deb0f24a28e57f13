mod test_support;

use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use test_support::{
    error_code, open_workspace_with_template, request_err, request_ok, spawn_sidecar, temp_dir,
    valid_form,
};

#[test]
fn bundle_restore_brings_back_records_config_and_presets() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_workspace_with_template(&mut stdin, &mut reader, "assetd-backup-src");
    let out_dir = temp_dir("assetd-backup-out");
    let bundle = out_dir.join("assets-backup.zip");

    let _ = request_ok(&mut stdin, &mut reader, "1", "assets.submit", json!({ "values": valid_form("SN-5001") }));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "presets.save",
        json!({ "name": "Retire", "changes": [{ "field": "Status", "value": "Retired" }] }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "backup.create",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(created["bundleFormat"], json!("assetd-workspace-v1"));
    assert_eq!(created["automatic"], json!(false));
    assert_eq!(created["dbSha256"].as_str().map(|s| s.len()), Some(64));

    let _ = request_ok(&mut stdin, &mut reader, "4", "assets.submit", json!({ "values": valid_form("SN-5002") }));
    let _ = request_ok(&mut stdin, &mut reader, "5", "presets.delete", json!({ "name": "Retire" }));

    let restored = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "backup.restore",
        json!({ "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(restored["bundleFormatDetected"], json!("assetd-workspace-v1"));
    assert_eq!(restored["checksumVerified"], json!(true));

    let all = request_ok(&mut stdin, &mut reader, "7", "assets.search", json!({}));
    assert_eq!(all["count"], json!(1));
    assert_eq!(all["assets"][0]["values"]["Serial Number"], json!("SN-5001"));

    let listed = request_ok(&mut stdin, &mut reader, "8", "presets.list", json!({}));
    assert_eq!(listed["names"], json!(["Retire", "Update Audit Date"]));

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn tampered_bundle_is_rejected_and_workspace_stays_usable() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_workspace_with_template(&mut stdin, &mut reader, "assetd-backup-tamper");
    let out_dir = temp_dir("assetd-backup-tamper-out");
    let bundle = out_dir.join("good.zip");
    let tampered = out_dir.join("tampered.zip");

    let _ = request_ok(&mut stdin, &mut reader, "1", "assets.submit", json!({ "values": valid_form("SN-5101") }));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "backup.create",
        json!({ "outPath": bundle.to_string_lossy() }),
    );

    // Same manifest, different database bytes.
    let mut archive = zip::ZipArchive::new(File::open(&bundle).expect("open bundle")).expect("zip");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    let mut writer = zip::ZipWriter::new(File::create(&tampered).expect("create tampered"));
    let options = zip::write::FileOptions::default();
    writer.start_file("manifest.json", options).expect("manifest");
    writer.write_all(manifest.as_bytes()).expect("write manifest");
    writer.start_file("db/assets.sqlite3", options).expect("db entry");
    writer.write_all(b"not the database").expect("write db");
    writer.finish().expect("finish zip");

    let error = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "backup.restore",
        json!({ "inPath": tampered.to_string_lossy() }),
    );
    assert_eq!(error_code(&error), "restore_failed");
    assert!(error["message"].as_str().unwrap_or("").contains("checksum mismatch"));

    let all = request_ok(&mut stdin, &mut reader, "4", "assets.search", json!({}));
    assert_eq!(all["count"], json!(1));

    let missing = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "backup.restore",
        json!({ "inPath": out_dir.join("nope.zip").to_string_lossy() }),
    );
    assert_eq!(error_code(&missing), "not_found");

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn automatic_backups_rotate_through_fixed_slots() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_workspace_with_template(&mut stdin, &mut reader, "assetd-backup-auto");

    for i in 0..3 {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("{}", i),
            "backup.create",
            json!({ "maxBackups": 2 }),
        );
        assert_eq!(created["automatic"], json!(true));
        assert!(created["path"]
            .as_str()
            .unwrap_or("")
            .ends_with("assets_autobackup_1.zip"));
    }

    let dir = workspace.join("auto_backups");
    assert!(dir.join("assets_autobackup_1.zip").is_file());
    assert!(dir.join("assets_autobackup_2.zip").is_file());
    assert!(!dir.join("assets_autobackup_3.zip").exists());

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn restoring_a_non_database_file_keeps_the_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_workspace_with_template(&mut stdin, &mut reader, "assetd-backup-junk");
    let junk = workspace.join("not-a-backup.txt");
    std::fs::write(&junk, b"this is not a backup").expect("write junk");

    let _ = request_ok(&mut stdin, &mut reader, "1", "assets.submit", json!({ "values": valid_form("SN-5201") }));

    let error = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "backup.restore",
        json!({ "inPath": junk.to_string_lossy() }),
    );
    assert_eq!(error_code(&error), "restore_failed");
    assert!(error["message"]
        .as_str()
        .unwrap_or("")
        .contains("neither a backup bundle nor a sqlite database"));

    let all = request_ok(&mut stdin, &mut reader, "3", "assets.search", json!({}));
    assert_eq!(all["count"], json!(1));
    assert_eq!(all["assets"][0]["values"]["Serial Number"], json!("SN-5201"));

    let db = std::fs::read(workspace.join("assets.sqlite3")).expect("read db");
    assert!(db.starts_with(b"SQLite format 3\0"));

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}

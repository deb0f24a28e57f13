use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "assets.sqlite3";

/// Columns the store manages itself. Never offered as editable fields.
pub const SYSTEM_COLUMNS: [&str; 8] = [
    "id",
    "created_date",
    "modified_date",
    "label_requested_date",
    "created_by",
    "modified_by",
    "data_source",
    "is_deleted",
];

// Header-derived names that would shadow one of these get a `field_` prefix.
const RESERVED_COLUMN_NAMES: [&str; 6] = [
    "id",
    "created_date",
    "modified_date",
    "label_requested_date",
    "created_by",
    "modified_by",
];

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace.to_string_lossy()
        )
    })?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS assets(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_date TEXT,
            modified_date TEXT DEFAULT '1901-01-01 00:00:00',
            label_requested_date TEXT DEFAULT NULL,
            created_by TEXT DEFAULT 'system',
            modified_by TEXT DEFAULT 'system',
            data_source TEXT DEFAULT 'manual',
            is_deleted INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS asset_audit_log(
            id TEXT PRIMARY KEY,
            asset_id INTEGER NOT NULL,
            action TEXT NOT NULL,
            field_name TEXT,
            old_value TEXT,
            new_value TEXT,
            changed_by TEXT NOT NULL DEFAULT 'system',
            change_date TEXT NOT NULL,
            FOREIGN KEY(asset_id) REFERENCES assets(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_asset_audit_log_asset ON asset_audit_log(asset_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    // Workspaces created before soft delete existed lack the flag.
    if !table_has_column(conn, "assets", "is_deleted")? {
        conn.execute(
            "ALTER TABLE assets ADD COLUMN is_deleted INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }

    Ok(())
}

/// Storage column name for a template header: punctuation dropped, runs of
/// whitespace collapsed to `_`, lowercased. Empty when nothing usable is left.
pub fn safe_column_name(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    let mut pending_sep = false;
    for ch in header.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() {
            pending_sep = true;
        }
    }
    if RESERVED_COLUMN_NAMES.contains(&out.as_str()) {
        out = format!("field_{}", out);
    }
    out
}

/// Adds a TEXT column for every template header the assets table does not
/// have yet. Returns the added column names in header order.
pub fn sync_template_columns(conn: &Connection, headers: &[String]) -> anyhow::Result<Vec<String>> {
    let mut existing = table_columns(conn, "assets")?;
    let mut added = Vec::new();
    for header in headers {
        let column = safe_column_name(header);
        if column.is_empty() || existing.iter().any(|c| c == &column) {
            continue;
        }
        conn.execute(
            &format!("ALTER TABLE assets ADD COLUMN \"{}\" TEXT", column),
            [],
        )
        .with_context(|| format!("failed to add column {} for header {:?}", column, header))?;
        tracing::info!(column = %column, header = %header, "added template column");
        existing.push(column.clone());
        added.push(column);
    }
    Ok(added)
}

/// Column names in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => {
            let value = serde_json::from_str(&text)
                .with_context(|| format!("settings value for {} is not valid JSON", key))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, text),
    )?;
    Ok(())
}

use crate::db::{self, SYSTEM_COLUMNS};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use uuid::Uuid;

const MULTILINE_KEYWORDS: [&str; 6] = [
    "notes",
    "description",
    "comments",
    "remarks",
    "details",
    "observations",
];

// Columns an update may never touch.
const IMMUTABLE_COLUMNS: [&str; 3] = ["id", "created_date", "created_by"];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unknown column: {0}")]
    UnknownColumn(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One row of the assets table, keyed by storage name. System columns are
/// included so callers can show audit stamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetRecord {
    pub id: i64,
    pub values: BTreeMap<String, Option<String>>,
}

impl AssetRecord {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(|v| v.as_deref())
    }

    /// Human identity used in conflict and confirmation messages.
    pub fn summary(&self) -> String {
        let non_empty = |col: &str| self.get(col).map(str::trim).filter(|s| !s.is_empty());
        let mut label = if let Some(sn) = non_empty("serial_number") {
            format!("Serial: {}", sn)
        } else if let Some(no) = non_empty("asset_no") {
            format!("Asset No: {}", no)
        } else {
            format!("Asset ID: {}", self.id)
        };
        match (non_empty("manufacturer"), non_empty("model")) {
            (Some(make), Some(model)) => label.push_str(&format!(" ({} {})", make, model)),
            (Some(one), None) | (None, Some(one)) => label.push_str(&format!(" ({})", one)),
            (None, None) => {}
        }
        label
    }
}

/// Query/command contract the engine consumes. Implementations block; the
/// engine adds no timeout or retry.
pub trait AssetStore {
    /// Header -> storage column for every header that yields a usable name.
    fn column_mapping(&self, headers: &[String]) -> HashMap<String, String>;

    /// Live columns of the assets table in declaration order.
    fn active_columns(&self) -> StoreResult<Vec<String>>;

    fn is_multiline(&self, column: &str) -> bool;

    /// Active (non-deleted) records whose `column` equals `value` exactly.
    fn find_by_exact(&self, column: &str, value: &str) -> StoreResult<Vec<AssetRecord>>;

    fn get_by_id(&self, id: i64) -> StoreResult<Option<AssetRecord>>;

    /// Returns false when no row was changed.
    fn update(&self, id: i64, values: &BTreeMap<String, String>) -> StoreResult<bool>;

    fn create(&self, values: &BTreeMap<String, String>) -> StoreResult<i64>;

    fn column_for_header(&self, header: &str) -> String {
        db::safe_column_name(header)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub action: String,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by: String,
    pub change_date: String,
}

pub struct SqliteAssetStore<'a> {
    conn: &'a Connection,
    user: String,
}

impl<'a> SqliteAssetStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            user: current_user(),
        }
    }

    #[cfg(test)]
    pub fn with_user(conn: &'a Connection, user: impl Into<String>) -> Self {
        Self {
            conn,
            user: user.into(),
        }
    }

    fn ensure_column(&self, column: &str) -> StoreResult<()> {
        if self.active_columns()?.iter().any(|c| c == column) {
            Ok(())
        } else {
            Err(StoreError::UnknownColumn(column.to_string()))
        }
    }

    fn log_audit(
        &self,
        conn: &Connection,
        asset_id: i64,
        action: &str,
        field_name: Option<&str>,
        old_value: Option<&str>,
        new_value: Option<&str>,
    ) -> StoreResult<()> {
        conn.execute(
            "INSERT INTO asset_audit_log(id, asset_id, action, field_name, old_value, new_value, changed_by, change_date)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                asset_id,
                action,
                field_name,
                old_value,
                new_value,
                &self.user,
                now_stamp(),
            ),
        )?;
        Ok(())
    }

    /// Soft delete: the row stays but drops out of every active-record query.
    pub fn soft_delete(&self, id: i64) -> StoreResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE assets SET is_deleted = 1, modified_date = ?, modified_by = ?
             WHERE id = ? AND is_deleted = 0",
            (now_stamp(), &self.user, id),
        )?;
        if changed > 0 {
            self.log_audit(&tx, id, "DELETE", None, None, None)?;
        }
        tx.commit()?;
        Ok(changed > 0)
    }

    /// Substring match on every given column, active records only, newest first.
    pub fn search(&self, filters: &BTreeMap<String, String>, limit: i64) -> StoreResult<Vec<AssetRecord>> {
        let columns = self.active_columns()?;
        let mut sql = String::from("SELECT * FROM assets WHERE is_deleted = 0");
        let mut binds: Vec<Value> = Vec::new();
        for (column, value) in filters {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            if !columns.iter().any(|c| c == column) {
                return Err(StoreError::UnknownColumn(column.clone()));
            }
            sql.push_str(&format!(" AND \"{}\" LIKE ?", column));
            binds.push(Value::Text(format!("%{}%", value)));
        }
        sql.push_str(" ORDER BY id DESC LIMIT ?");
        binds.push(Value::Integer(limit));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(binds), |r| record_from_row(r, &columns))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Distinct non-empty values of one column across active records, sorted.
    pub fn distinct_values(&self, column: &str) -> StoreResult<Vec<String>> {
        self.ensure_column(column)?;
        let sql = format!(
            "SELECT DISTINCT \"{c}\" FROM assets
             WHERE \"{c}\" IS NOT NULL AND \"{c}\" != '' AND is_deleted = 0
             ORDER BY \"{c}\"",
            c = column
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let values = stmt
            .query_map([], |r| r.get::<_, Value>(0))?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter_map(value_to_string)
            .collect();
        Ok(values)
    }

    pub fn audit_history(&self, id: i64) -> StoreResult<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT action, field_name, old_value, new_value, changed_by, change_date
             FROM asset_audit_log
             WHERE asset_id = ?
             ORDER BY change_date DESC, rowid DESC",
        )?;
        let rows = stmt
            .query_map([id], |r| {
                Ok(AuditEntry {
                    action: r.get(0)?,
                    field_name: r.get(1)?,
                    old_value: r.get(2)?,
                    new_value: r.get(3)?,
                    changed_by: r.get(4)?,
                    change_date: r.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn next_asset_number(&self, conn: &Connection) -> StoreResult<String> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM assets", [], |r| r.get(0))?;
        Ok(format!("AST{:06}", count + 1))
    }
}

impl AssetStore for SqliteAssetStore<'_> {
    fn column_mapping(&self, headers: &[String]) -> HashMap<String, String> {
        let mut mapping = HashMap::new();
        for header in headers {
            if header.trim().is_empty() {
                continue;
            }
            let column = self.column_for_header(header);
            if !column.is_empty() {
                mapping.insert(header.clone(), column);
            }
        }
        mapping
    }

    fn active_columns(&self) -> StoreResult<Vec<String>> {
        Ok(db::table_columns(self.conn, "assets")?)
    }

    fn is_multiline(&self, column: &str) -> bool {
        let lower = column.to_ascii_lowercase();
        if MULTILINE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return true;
        }
        if SYSTEM_COLUMNS.contains(&column) || self.ensure_column(column).is_err() {
            return false;
        }
        let sql = format!(
            "SELECT 1 FROM assets WHERE \"{}\" LIKE '%' || char(10) || '%' AND is_deleted = 0 LIMIT 1",
            column
        );
        match self.conn.query_row(&sql, [], |r| r.get::<_, i64>(0)).optional() {
            Ok(hit) => hit.is_some(),
            Err(e) => {
                tracing::debug!(column, error = %e, "multiline probe failed");
                false
            }
        }
    }

    fn find_by_exact(&self, column: &str, value: &str) -> StoreResult<Vec<AssetRecord>> {
        let columns = self.active_columns()?;
        if !columns.iter().any(|c| c == column) {
            return Err(StoreError::UnknownColumn(column.to_string()));
        }
        let sql = format!(
            "SELECT * FROM assets WHERE \"{}\" = ? AND is_deleted = 0 ORDER BY id",
            column
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([value], |r| record_from_row(r, &columns))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_by_id(&self, id: i64) -> StoreResult<Option<AssetRecord>> {
        let columns = self.active_columns()?;
        let record = self
            .conn
            .query_row("SELECT * FROM assets WHERE id = ?", [id], |r| {
                record_from_row(r, &columns)
            })
            .optional()?;
        Ok(record)
    }

    fn update(&self, id: i64, values: &BTreeMap<String, String>) -> StoreResult<bool> {
        let Some(current) = self.get_by_id(id)? else {
            return Ok(false);
        };

        let mut set_clauses: Vec<String> = Vec::new();
        let mut binds: Vec<Value> = Vec::new();
        for (column, value) in values {
            if IMMUTABLE_COLUMNS.contains(&column.as_str()) {
                continue;
            }
            if !current.values.contains_key(column) {
                return Err(StoreError::UnknownColumn(column.clone()));
            }
            set_clauses.push(format!("\"{}\" = ?", column));
            binds.push(Value::Text(value.clone()));
        }
        if set_clauses.is_empty() {
            return Ok(false);
        }
        set_clauses.push("modified_date = ?".to_string());
        set_clauses.push("modified_by = ?".to_string());
        binds.push(Value::Text(now_stamp()));
        binds.push(Value::Text(self.user.clone()));
        binds.push(Value::Integer(id));

        let tx = self.conn.unchecked_transaction()?;
        for (column, value) in values {
            if IMMUTABLE_COLUMNS.contains(&column.as_str()) {
                continue;
            }
            self.log_audit(
                &tx,
                id,
                "UPDATE",
                Some(column.as_str()),
                current.get(column),
                Some(value.as_str()),
            )?;
        }
        let sql = format!("UPDATE assets SET {} WHERE id = ?", set_clauses.join(", "));
        let changed = tx.execute(&sql, params_from_iter(binds))?;
        tx.commit()?;
        Ok(changed > 0)
    }

    fn create(&self, values: &BTreeMap<String, String>) -> StoreResult<i64> {
        let columns = self.active_columns()?;
        let mut row: BTreeMap<String, String> = BTreeMap::new();
        for (column, value) in values {
            if SYSTEM_COLUMNS.contains(&column.as_str()) {
                continue;
            }
            if !columns.iter().any(|c| c == column) {
                return Err(StoreError::UnknownColumn(column.clone()));
            }
            row.insert(column.clone(), value.clone());
        }

        let tx = self.conn.unchecked_transaction()?;
        if columns.iter().any(|c| c == "asset_no")
            && row.get("asset_no").map(|v| v.trim().is_empty()).unwrap_or(true)
        {
            row.insert("asset_no".to_string(), self.next_asset_number(&tx)?);
        }
        row.insert("created_date".to_string(), now_stamp());
        row.insert("created_by".to_string(), self.user.clone());
        row.insert("data_source".to_string(), "manual".to_string());

        let names = row
            .keys()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = std::iter::repeat_n("?", row.len())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("INSERT INTO assets({}) VALUES({})", names, placeholders);
        tx.execute(&sql, params_from_iter(row.values()))?;
        let id = tx.last_insert_rowid();

        let snapshot = serde_json::to_string(&row).unwrap_or_default();
        self.log_audit(&tx, id, "INSERT", None, None, Some(snapshot.as_str()))?;
        tx.commit()?;
        Ok(id)
    }
}

fn record_from_row(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<AssetRecord> {
    let mut values = BTreeMap::new();
    let mut id = 0;
    for (i, column) in columns.iter().enumerate() {
        let raw: Value = row.get(i)?;
        if column == "id" {
            if let Value::Integer(v) = raw {
                id = v;
            }
        }
        values.insert(column.clone(), value_to_string(raw));
    }
    Ok(AssetRecord { id, values })
}

fn value_to_string(v: Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(b) => Some(String::from_utf8_lossy(&b).to_string()),
    }
}

fn now_stamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "system".to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn seeded_conn(headers: &[&str]) -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        db::sync_template_columns(&conn, &headers).expect("sync");
        conn
    }

    fn row(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn create_then_find_excludes_soft_deleted() {
        let conn = seeded_conn(&["Serial Number", "Notes"]);
        let store = SqliteAssetStore::with_user(&conn, "tester");
        let a = store.create(&row(&[("serial_number", "SN-1")])).expect("create");
        let b = store.create(&row(&[("serial_number", "SN-1")])).expect("create");

        let hits = store.find_by_exact("serial_number", "SN-1").expect("find");
        assert_eq!(hits.iter().map(|r| r.id).collect::<Vec<_>>(), vec![a, b]);

        assert!(store.soft_delete(a).expect("delete"));
        let hits = store.find_by_exact("serial_number", "SN-1").expect("find");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, b);

        // Exact match is case-sensitive.
        assert!(store.find_by_exact("serial_number", "sn-1").expect("find").is_empty());
    }

    #[test]
    fn find_on_unknown_column_is_an_error() {
        let conn = seeded_conn(&["Serial Number"]);
        let store = SqliteAssetStore::new(&conn);
        let err = store.find_by_exact("ip_address", "10.0.0.1").unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn(c) if c == "ip_address"));
    }

    #[test]
    fn update_stamps_modifier_and_writes_audit_rows() {
        let conn = seeded_conn(&["Serial Number", "Location"]);
        let store = SqliteAssetStore::with_user(&conn, "tester");
        let id = store
            .create(&row(&[("serial_number", "SN-9"), ("location", "Lab")]))
            .expect("create");

        let changed = store
            .update(id, &row(&[("location", "Vault"), ("created_by", "mallory")]))
            .expect("update");
        assert!(changed);

        let rec = store.get_by_id(id).expect("get").expect("present");
        assert_eq!(rec.get("location"), Some("Vault"));
        assert_eq!(rec.get("created_by"), Some("tester"));
        assert_eq!(rec.get("modified_by"), Some("tester"));

        let history = store.audit_history(id).expect("history");
        assert!(history
            .iter()
            .any(|h| h.action == "UPDATE" && h.old_value.as_deref() == Some("Lab")));
        assert!(history.iter().any(|h| h.action == "INSERT"));
    }

    #[test]
    fn update_missing_record_reports_false() {
        let conn = seeded_conn(&["Location"]);
        let store = SqliteAssetStore::new(&conn);
        assert!(!store.update(42, &row(&[("location", "x")])).expect("update"));
    }

    #[test]
    fn multiline_detection_uses_names_and_data() {
        let conn = seeded_conn(&["Notes", "Room", "Label"]);
        let store = SqliteAssetStore::new(&conn);
        assert!(store.is_multiline("notes"));
        assert!(!store.is_multiline("room"));
        store
            .create(&row(&[("label", "first\nsecond")]))
            .expect("create");
        assert!(store.is_multiline("label"));
    }

    #[test]
    fn distinct_values_skip_blank_and_deleted() {
        let conn = seeded_conn(&["Location"]);
        let store = SqliteAssetStore::new(&conn);
        store.create(&row(&[("location", "Lab")])).expect("create");
        store.create(&row(&[("location", "")])).expect("create");
        let gone = store.create(&row(&[("location", "Attic")])).expect("create");
        store.create(&row(&[("location", "Lab")])).expect("create");
        store.soft_delete(gone).expect("delete");
        assert_eq!(store.distinct_values("location").expect("distinct"), vec!["Lab"]);
    }

    #[test]
    fn summary_prefers_serial_then_asset_number() {
        let mut values = BTreeMap::new();
        values.insert("asset_no".to_string(), Some("AST000007".to_string()));
        values.insert("manufacturer".to_string(), Some("Dell".to_string()));
        values.insert("model".to_string(), Some("R740".to_string()));
        let rec = AssetRecord { id: 7, values };
        assert_eq!(rec.summary(), "Asset No: AST000007 (Dell R740)");
    }
}

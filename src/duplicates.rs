//! Create-or-overwrite decision for single-record submission, keyed on the
//! serial number column.

use crate::conflicts::detect_conflicts;
use crate::error::{EngineError, Result};
use crate::fields::FieldDescriptor;
use crate::store::{AssetRecord, AssetStore, StoreError};
use serde::Serialize;
use std::collections::BTreeMap;

pub const SERIAL_COLUMN: &str = "serial_number";

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionPlan {
    Create,
    Overwrite { existing: AssetRecord },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SubmitOutcome {
    Created { id: i64 },
    #[serde(rename_all = "camelCase")]
    Updated { id: i64, changed: bool },
    /// Overwrite was declined. Nothing was written.
    Aborted { id: i64 },
}

/// Exact, case-sensitive lookup of the candidate's serial number. A blank
/// serial, or a store without the column, always plans a create.
pub fn plan_submission<S>(store: &S, values: &BTreeMap<String, String>) -> Result<SubmissionPlan>
where
    S: AssetStore + ?Sized,
{
    let serial = values.get(SERIAL_COLUMN).map(|v| v.trim()).unwrap_or("");
    if serial.is_empty() {
        return Ok(SubmissionPlan::Create);
    }
    match store.find_by_exact(SERIAL_COLUMN, serial) {
        Ok(hits) => Ok(match hits.into_iter().next() {
            Some(existing) => SubmissionPlan::Overwrite { existing },
            None => SubmissionPlan::Create,
        }),
        Err(StoreError::UnknownColumn(_)) => Ok(SubmissionPlan::Create),
        Err(e) => Err(e.into()),
    }
}

/// Plans, checks unique fields, then writes.
///
/// On the overwrite path the existing record is excluded from its own
/// conflict set and `confirm` decides whether the write happens at all.
pub fn submit<S, F>(
    store: &S,
    values: &BTreeMap<String, String>,
    unique_fields: &[String],
    descriptors: &[FieldDescriptor],
    confirm: F,
) -> Result<SubmitOutcome>
where
    S: AssetStore + ?Sized,
    F: FnOnce(&AssetRecord) -> bool,
{
    let plan = plan_submission(store, values)?;
    let exclude = match &plan {
        SubmissionPlan::Create => None,
        SubmissionPlan::Overwrite { existing } => Some(existing.id),
    };
    let conflicts = detect_conflicts(store, values, unique_fields, descriptors, exclude);
    if !conflicts.is_empty() {
        return Err(EngineError::Conflicts(conflicts));
    }

    match plan {
        SubmissionPlan::Create => {
            let id = store.create(values)?;
            tracing::info!(asset_id = id, "asset created");
            Ok(SubmitOutcome::Created { id })
        }
        SubmissionPlan::Overwrite { existing } => {
            if !confirm(&existing) {
                tracing::info!(asset_id = existing.id, "overwrite declined");
                return Ok(SubmitOutcome::Aborted { id: existing.id });
            }
            let changed = store.update(existing.id, values)?;
            tracing::info!(asset_id = existing.id, changed, "asset overwritten");
            Ok(SubmitOutcome::Updated {
                id: existing.id,
                changed,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldKind;
    use crate::store::tests::seeded_conn;
    use crate::store::SqliteAssetStore;

    fn row(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn unique() -> Vec<String> {
        vec!["Serial Number".to_string(), "Tamper Seal".to_string()]
    }

    fn descriptors() -> Vec<FieldDescriptor> {
        ["Serial Number", "Room", "Tamper Seal"]
            .iter()
            .map(|d| FieldDescriptor {
                display_name: d.to_string(),
                storage_name: crate::db::safe_column_name(d),
                kind: FieldKind::Text,
            })
            .collect()
    }

    fn count(conn: &rusqlite::Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM assets", [], |r| r.get(0))
            .expect("count")
    }

    #[test]
    fn blank_serial_always_creates() {
        let conn = seeded_conn(&["Serial Number", "Room"]);
        let store = SqliteAssetStore::new(&conn);
        let plan = plan_submission(&store, &row(&[("room", "1A")])).expect("plan");
        assert_eq!(plan, SubmissionPlan::Create);
    }

    #[test]
    fn missing_serial_column_plans_create() {
        let conn = seeded_conn(&["Room"]);
        let store = SqliteAssetStore::new(&conn);
        let plan = plan_submission(&store, &row(&[("serial_number", "SN-1")])).expect("plan");
        assert_eq!(plan, SubmissionPlan::Create);
    }

    #[test]
    fn existing_serial_takes_overwrite_path() {
        let conn = seeded_conn(&["Serial Number", "Room"]);
        let store = SqliteAssetStore::new(&conn);
        let id = store
            .create(&row(&[("serial_number", "SN-1"), ("room", "1A")]))
            .expect("create");

        let mut asked = None;
        let outcome = submit(
            &store,
            &row(&[("serial_number", "SN-1"), ("room", "2B")]),
            &unique(),
            &descriptors(),
            |existing| {
                asked = Some(existing.id);
                true
            },
        )
        .expect("submit");
        assert_eq!(asked, Some(id));
        assert_eq!(outcome, SubmitOutcome::Updated { id, changed: true });
        assert_eq!(count(&conn), 1);
        let rec = store.get_by_id(id).expect("get").expect("present");
        assert_eq!(rec.get("room"), Some("2B"));
    }

    #[test]
    fn declining_overwrite_leaves_store_untouched() {
        let conn = seeded_conn(&["Serial Number", "Room"]);
        let store = SqliteAssetStore::new(&conn);
        let id = store
            .create(&row(&[("serial_number", "SN-1"), ("room", "1A")]))
            .expect("create");
        let before = store.get_by_id(id).expect("get");
        let audit_before = store.audit_history(id).expect("history").len();

        let outcome = submit(
            &store,
            &row(&[("serial_number", "SN-1"), ("room", "2B")]),
            &unique(),
            &descriptors(),
            |_| false,
        )
        .expect("submit");
        assert_eq!(outcome, SubmitOutcome::Aborted { id });
        assert_eq!(count(&conn), 1);
        assert_eq!(store.get_by_id(id).expect("get"), before);
        assert_eq!(store.audit_history(id).expect("history").len(), audit_before);
    }

    #[test]
    fn serial_match_is_case_sensitive() {
        let conn = seeded_conn(&["Serial Number"]);
        let store = SqliteAssetStore::new(&conn);
        store.create(&row(&[("serial_number", "abc-1")])).expect("create");
        let outcome = submit(
            &store,
            &row(&[("serial_number", "ABC-1")]),
            &unique(),
            &descriptors(),
            |_| panic!("no overwrite expected"),
        )
        .expect("submit");
        assert!(matches!(outcome, SubmitOutcome::Created { .. }));
        assert_eq!(count(&conn), 2);
    }

    #[test]
    fn other_unique_collision_blocks_before_any_write() {
        let conn = seeded_conn(&["Serial Number", "Tamper Seal"]);
        let store = SqliteAssetStore::new(&conn);
        store
            .create(&row(&[("serial_number", "SN-1"), ("tamper_seal", "TS-9")]))
            .expect("create");
        let err = submit(
            &store,
            &row(&[("serial_number", "SN-2"), ("tamper_seal", "TS-9")]),
            &unique(),
            &descriptors(),
            |_| true,
        )
        .unwrap_err();
        match err {
            EngineError::Conflicts(c) => {
                assert_eq!(c.len(), 1);
                assert_eq!(c[0].field_name, "Tamper Seal");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(count(&conn), 1);
    }
}

use crate::error::EngineError;
use crate::fields::{self, FieldDescriptor};
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteAssetStore;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<EngineError> for HandlerErr {
    fn from(e: EngineError) -> Self {
        let details = match &e {
            EngineError::Validation(result) => Some(json!({
                "errors": result.errors,
                "warnings": result.warnings,
            })),
            EngineError::Conflicts(conflicts) => Some(json!({ "conflicts": conflicts })),
            EngineError::DateChoiceRequired(fields) => Some(json!({ "fields": fields })),
            _ => None,
        };
        Self {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

pub fn no_workspace(req: &Request) -> serde_json::Value {
    err(&req.id, "no_workspace", "select a workspace first", None)
}

pub fn get_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    match get_str(req, key) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(HandlerErr::bad_params(format!("missing {}", key))),
    }
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_bool(req: &Request, key: &str) -> bool {
    req.params.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// A `{name: value}` object of form values. Numbers and booleans are
/// accepted as text; null counts as blank.
pub fn string_map(req: &Request, key: &str) -> Result<HashMap<String, String>, HandlerErr> {
    let Some(obj) = req.params.get(key).and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params(format!("{} must be an object", key)));
    };
    let mut out = HashMap::with_capacity(obj.len());
    for (k, v) in obj {
        let text = match v {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            _ => {
                return Err(HandlerErr::bad_params(format!(
                    "{}.{} must be a string",
                    key, k
                )))
            }
        };
        out.insert(k.clone(), text);
    }
    Ok(out)
}

/// Current descriptors, derived from the store when no template is loaded.
pub fn ensure_descriptors(state: &mut AppState) -> Result<Vec<FieldDescriptor>, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    if state.descriptors.is_empty() {
        let store = SqliteAssetStore::new(conn);
        state.descriptors = fields::resolve_descriptors(&state.template_headers, &state.config, &store);
    }
    Ok(state.descriptors.clone())
}

/// Storage-keyed record back to display names for the current descriptors.
pub fn display_values(values: &BTreeMap<String, Option<String>>, descriptors: &[FieldDescriptor]) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    for d in descriptors {
        let v = values
            .get(&d.storage_name)
            .and_then(|v| v.clone())
            .unwrap_or_default();
        out.insert(d.display_name.clone(), json!(v));
    }
    serde_json::Value::Object(out)
}

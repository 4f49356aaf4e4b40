//! Change notifications raised by the object store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ocpi::{LocationId, PartyScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Location,
    Evse,
    Connector,
    Tariff,
    Session,
    Cdr,
    Token,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Evse => "evse",
            Self::Connector => "connector",
            Self::Tariff => "tariff",
            Self::Session => "session",
            Self::Cdr => "cdr",
            Self::Token => "token",
        }
    }
}

/// Old and new value of one changed field. Nested fields use dotted paths
/// (`evses.E1.status`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Value,
    pub new: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub kind: ObjectKind,
    pub owner: PartyScope,
    /// Object id; `location/evse[/connector]` for Location children.
    pub id: String,
    pub location_id: Option<LocationId>,
    pub changes: Vec<FieldChange>,
    pub timestamp: DateTime<Utc>,
}

/// Result of a store write.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created,
    Updated(Vec<FieldChange>),
    /// Nothing changed; no notification was raised.
    Unchanged,
}

impl UpsertOutcome {
    pub fn is_changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Keys of arrays diffed element-wise instead of as a whole.
const KEYED_ARRAYS: &[(&str, &str)] = &[("evses", "uid")];

/// Field-level diff of two serialized objects, ignoring `last_updated`.
pub fn diff(old: &Value, new: &Value) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    diff_into("", old, new, &mut changes);
    changes
}

fn path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn diff_into(prefix: &str, old: &Value, new: &Value, out: &mut Vec<FieldChange>) {
    let (Value::Object(old_map), Value::Object(new_map)) = (old, new) else {
        if old != new {
            out.push(FieldChange {
                field: prefix.to_string(),
                old: old.clone(),
                new: new.clone(),
            });
        }
        return;
    };

    let mut keys: Vec<&String> = old_map.keys().chain(new_map.keys()).collect();
    keys.sort();
    keys.dedup();
    for key in keys {
        if key == "last_updated" {
            continue;
        }
        let old_value = old_map.get(key).unwrap_or(&Value::Null);
        let new_value = new_map.get(key).unwrap_or(&Value::Null);
        if old_value == new_value {
            continue;
        }
        let field = path(prefix, key);
        match KEYED_ARRAYS.iter().find(|(name, _)| name == key) {
            Some((_, id_key)) => diff_keyed(&field, id_key, old_value, new_value, out),
            None => diff_leaf(&field, old_value, new_value, out),
        }
    }
}

/// Compare two values ignoring nested `last_updated` fields.
fn diff_leaf(field: &str, old: &Value, new: &Value, out: &mut Vec<FieldChange>) {
    if strip(old) != strip(new) {
        out.push(FieldChange {
            field: field.to_string(),
            old: old.clone(),
            new: new.clone(),
        });
    }
}

/// Equality ignoring every `last_updated` field.
pub fn content_eq(a: &Value, b: &Value) -> bool {
    strip(a) == strip(b)
}

fn strip(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| k.as_str() != "last_updated")
                .map(|(k, v)| (k.clone(), strip(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip).collect()),
        other => other.clone(),
    }
}

fn diff_keyed(field: &str, id_key: &str, old: &Value, new: &Value, out: &mut Vec<FieldChange>) {
    let index = |value: &Value| -> Vec<(String, Value)> {
        value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        let id = item
                            .get(id_key)
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        (id, item.clone())
                    })
                    .collect()
            })
            .unwrap_or_default()
    };
    let old_items = index(old);
    let new_items = index(new);

    for (id, old_item) in &old_items {
        let item_path = path(field, id);
        match new_items.iter().find(|(other, _)| other == id) {
            Some((_, new_item)) => diff_into(&item_path, old_item, new_item, out),
            None => out.push(FieldChange {
                field: item_path,
                old: old_item.clone(),
                new: Value::Null,
            }),
        }
    }
    for (id, new_item) in &new_items {
        if !old_items.iter().any(|(other, _)| other == id) {
            out.push(FieldChange {
                field: path(field, id),
                old: Value::Null,
                new: new_item.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamps_alone_are_not_changes() {
        let old = json!({"name": "A", "last_updated": "2024-01-01T00:00:00Z"});
        let new = json!({"name": "A", "last_updated": "2024-06-01T00:00:00Z"});
        assert!(diff(&old, &new).is_empty());
    }

    #[test]
    fn evses_are_diffed_per_uid_and_field() {
        let old = json!({
            "name": "Site",
            "evses": [
                {"uid": "E1", "status": "AVAILABLE", "last_updated": "t1"},
                {"uid": "E2", "status": "AVAILABLE", "last_updated": "t1"}
            ]
        });
        let new = json!({
            "name": "Site",
            "evses": [
                {"uid": "E1", "status": "CHARGING", "last_updated": "t2"},
                {"uid": "E3", "status": "AVAILABLE", "last_updated": "t2"}
            ]
        });
        let changes = diff(&old, &new);
        let fields: Vec<_> = changes.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["evses.E1.status", "evses.E2", "evses.E3"]);
        assert_eq!(changes[0].old, json!("AVAILABLE"));
        assert_eq!(changes[0].new, json!("CHARGING"));
    }

    #[test]
    fn nested_timestamps_inside_leaf_fields_are_ignored() {
        let old = json!({"connectors": [{"id": "1", "last_updated": "t1"}]});
        let new = json!({"connectors": [{"id": "1", "last_updated": "t2"}]});
        assert!(diff(&old, &new).is_empty());
    }
}

//! The `{ok, data}` / `{ok, error}` envelope wrapped around JSON responses.

use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope::ok(data))
}

/// Success with no payload: `{"ok": true, "data": null}`.
pub fn done() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true, "data": null }))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewFile {
    pub new_file_uuid: archiiv_types::RecordId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewDir {
    pub new_dir_uuid: archiiv_types::RecordId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shapes() {
        let ok = serde_json::to_value(Envelope::ok(vec![1, 2])).unwrap();
        assert_eq!(ok, serde_json::json!({"ok": true, "data": [1, 2]}));
        let err = serde_json::to_value(Envelope::<()>::error("nope")).unwrap();
        assert_eq!(err, serde_json::json!({"ok": false, "error": "nope"}));
    }

    #[test]
    fn created_record_keys() {
        let id = archiiv_types::RecordId::new();
        let file = serde_json::to_value(NewFile { new_file_uuid: id }).unwrap();
        assert_eq!(file, serde_json::json!({"new_file_uuid": id.to_string()}));
        let dir = serde_json::to_value(NewDir { new_dir_uuid: id }).unwrap();
        assert_eq!(dir, serde_json::json!({"new_dir_uuid": id.to_string()}));
    }
}

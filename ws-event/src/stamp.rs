//! Timestamp envelope: every outbound frame carries a `timestamp`.
//! Producers that already set one (hook payloads do) are left untouched.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

/// Current UTC time as an RFC 3339 string, the wire format for all frames.
pub fn utc_now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Injects a top-level `timestamp` into the frame object when absent.
/// Does not overwrite an existing value; non-objects are left as-is.
pub fn stamp(value: &mut Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    obj.entry("timestamp")
        .or_insert_with(|| Value::String(utc_now_rfc3339()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stamp_adds_timestamp_when_absent() {
        let mut v = json!({"type": "ping"});
        stamp(&mut v);
        let ts = v["timestamp"].as_str().unwrap();
        assert!(ts.contains('T'));
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn stamp_does_not_overwrite() {
        let mut v = json!({"type": "agent_log", "timestamp": "2024-01-01T00:00:00Z"});
        stamp(&mut v);
        assert_eq!(v["timestamp"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn stamp_ignores_non_objects() {
        let mut v = json!(["not", "an", "object"]);
        stamp(&mut v);
        assert!(v.is_array());
    }
}

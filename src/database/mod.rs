pub mod connection;
pub mod donation_store;
#[cfg(test)]
pub mod memory;

use mongodb::bson::{Bson, Document};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use serde_json::{json, Value as JsonValue};

pub const USERS: &str = "users";
pub const CAMPAIGNS: &str = "campaigns";
pub const DONATIONS: &str = "donations";
pub const NOTIFICATIONS: &str = "notifications";
pub const AUDIT_LOGS: &str = "auditlogs";
pub const SETTINGS: &str = "settings";

/// Renders aggregation output for API responses: ids as hex, dates as RFC 3339.
pub fn bson_to_json(bson: &Bson) -> JsonValue {
    match bson {
        Bson::ObjectId(oid) => json!(oid.to_hex()),
        Bson::DateTime(dt) => json!(dt.to_chrono().to_rfc3339()),
        Bson::String(s) => json!(s),
        Bson::Int32(i) => json!(i),
        Bson::Int64(i) => json!(i),
        Bson::Double(d) => json!(d),
        Bson::Boolean(b) => json!(b),
        Bson::Null => JsonValue::Null,
        Bson::Array(arr) => JsonValue::Array(arr.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => document_to_json(doc.clone()),
        other => json!(other.to_string()),
    }
}

pub fn document_to_json(doc: Document) -> JsonValue {
    let mut map = serde_json::Map::new();
    for (key, value) in doc {
        map.insert(key, bson_to_json(&value));
    }
    JsonValue::Object(map)
}

/// Numeric field of an aggregation row, whatever BSON width it came back as.
pub fn number(doc: &Document, key: &str) -> f64 {
    match doc.get(key) {
        Some(Bson::Double(d)) => *d,
        Some(Bson::Int32(i)) => *i as f64,
        Some(Bson::Int64(i)) => *i as f64,
        _ => 0.0,
    }
}

const DUPLICATE_KEY: i32 = 11000;

/// True when a write was rejected by a unique index.
pub fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};

    #[test]
    fn aggregation_rows_render_as_plain_json() {
        let id = ObjectId::new();
        let row = doc! {
            "_id": id,
            "total": 12.5,
            "count": 3_i32,
            "when": BsonDateTime::from_millis(0),
            "nested": { "ids": [id] },
        };
        let json = document_to_json(row.clone());
        assert_eq!(json["_id"], id.to_hex());
        assert_eq!(json["when"], "1970-01-01T00:00:00+00:00");
        assert_eq!(json["nested"]["ids"][0], id.to_hex());
        assert_eq!(number(&row, "count"), 3.0);
        assert_eq!(number(&row, "missing"), 0.0);
    }
}

//! Wire types for the control service
//!
//! These are the messages exchanged with callers. Field names follow the
//! public API (camelCase on the wire); the transport that carries them is
//! provided by the embedding server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskUsageRequest {
    /// Predicate passed through to the cache manager; empty matches all
    #[serde(default)]
    pub filter: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskUsageResponse {
    pub record: Vec<UsageRecord>,
}

/// One cache entry as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    #[serde(rename = "ID")]
    pub id: String,
    pub mutable: bool,
    pub in_use: bool,
    pub size: i64,
    pub parent: Option<String>,
    pub usage_count: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolveRequest {
    /// Build reference correlating this solve with its status stream
    #[serde(rename = "ref")]
    pub ref_: String,
    /// Serialized build definition, opaque to the control layer
    pub definition: Vec<u8>,
    pub exporter: String,
    pub exporter_attrs: HashMap<String, String>,
    /// Session the engine may call back into for this build
    pub session: String,
    pub frontend: String,
    pub frontend_attrs: HashMap<String, String>,
    pub cache: CacheOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheOptions {
    pub export_ref: String,
    pub import_ref: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveResponse {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {
    #[serde(rename = "ref")]
    pub ref_: String,
}

/// One batch of progress, republished as received from the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusResponse {
    pub vertexes: Vec<Vertex>,
    pub statuses: Vec<VertexStatus>,
    pub logs: Vec<VertexLog>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vertex {
    pub digest: String,
    pub inputs: Vec<String>,
    pub name: String,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub error: String,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexStatus {
    #[serde(rename = "ID")]
    pub id: String,
    pub vertex: String,
    pub name: String,
    pub current: i64,
    pub total: i64,
    pub timestamp: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexLog {
    pub vertex: String,
    /// 1 = stdout, 2 = stderr
    pub stream: i64,
    pub msg: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solve_request_uses_wire_names() {
        let json = r#"{
            "ref": "build-1",
            "frontend": "dockerfile.v0",
            "frontendAttrs": {"filename": "Dockerfile"},
            "cache": {"exportRef": "cache/app"}
        }"#;
        let req: SolveRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.ref_, "build-1");
        assert_eq!(req.frontend_attrs["filename"], "Dockerfile");
        assert_eq!(req.cache.export_ref, "cache/app");
        assert!(req.cache.import_ref.is_empty());
        assert!(req.exporter.is_empty());
    }

    #[test]
    fn usage_record_serializes_id_field() {
        let record = UsageRecord {
            id: "abc".to_string(),
            mutable: false,
            in_use: true,
            size: 4096,
            parent: None,
            usage_count: 3,
            description: "layer".to_string(),
            created_at: Utc::now(),
            last_used_at: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["ID"], "abc");
        assert_eq!(value["inUse"], true);
        assert_eq!(value["usageCount"], 3);
    }
}

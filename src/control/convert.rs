//! Engine → wire conversions.

use crate::api;
use crate::engine::{SolveStatus, UsageInfo, Vertex, VertexLog, VertexStatus};

impl From<SolveStatus> for api::StatusResponse {
    fn from(status: SolveStatus) -> Self {
        Self {
            vertexes: status.vertexes.into_iter().map(Into::into).collect(),
            statuses: status.statuses.into_iter().map(Into::into).collect(),
            logs: status.logs.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Vertex> for api::Vertex {
    fn from(v: Vertex) -> Self {
        Self {
            digest: v.digest,
            inputs: v.inputs,
            name: v.name,
            started: v.started,
            completed: v.completed,
            error: v.error,
            cached: v.cached,
        }
    }
}

impl From<VertexStatus> for api::VertexStatus {
    fn from(v: VertexStatus) -> Self {
        Self {
            id: v.id,
            vertex: v.vertex,
            name: v.name,
            current: v.current,
            total: v.total,
            timestamp: v.timestamp,
            started: v.started,
            completed: v.completed,
        }
    }
}

impl From<VertexLog> for api::VertexLog {
    fn from(v: VertexLog) -> Self {
        Self {
            vertex: v.vertex,
            stream: i64::from(v.stream),
            msg: v.data,
            timestamp: v.timestamp,
        }
    }
}

impl From<UsageInfo> for api::UsageRecord {
    fn from(r: UsageInfo) -> Self {
        Self {
            id: r.id,
            mutable: r.mutable,
            in_use: r.in_use,
            size: r.size,
            parent: r.parent,
            usage_count: i64::from(r.usage_count),
            description: r.description,
            created_at: r.created_at,
            last_used_at: r.last_used_at,
        }
    }
}

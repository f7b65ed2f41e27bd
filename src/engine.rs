//! Collaborator interfaces
//!
//! The control layer never executes builds or touches cache storage itself.
//! It talks to the execution engine, cache manager, frontends, exporters and
//! the session manager through the traits below.

use crate::error::{ControlError, ControlResult};
use crate::session::{Conn, SessionOptions};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Per-call context handed to collaborators
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Cancelled when the caller goes away or its deadline passes
    pub cancel: CancellationToken,
    /// Session the engine may call back into, if any
    pub session_id: Option<String>,
}

impl CallContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            session_id: None,
        }
    }

    /// Attach a session id; empty ids are ignored
    pub fn with_session(mut self, session_id: &str) -> Self {
        if !session_id.is_empty() {
            self.session_id = Some(session_id.to_string());
        }
        self
    }
}

/// Request shape accepted by the execution engine
pub struct SolveRequest {
    pub definition: Vec<u8>,
    pub frontend: Option<Arc<dyn Frontend>>,
    pub frontend_opt: HashMap<String, String>,
    pub exporter: Option<Box<dyn ExporterInstance>>,
    pub export_cache_ref: Option<String>,
    pub import_cache_ref: Option<String>,
}

impl fmt::Debug for SolveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolveRequest")
            .field("definition_len", &self.definition.len())
            .field("frontend", &self.frontend.as_ref().map(|fe| fe.name()))
            .field("frontend_opt", &self.frontend_opt)
            .field("exporter", &self.exporter.as_ref().map(|e| e.name()))
            .field("export_cache_ref", &self.export_cache_ref)
            .field("import_cache_ref", &self.import_cache_ref)
            .finish()
    }
}

/// One batch of progress pushed by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolveStatus {
    pub vertexes: Vec<Vertex>,
    pub statuses: Vec<VertexStatus>,
    pub logs: Vec<VertexLog>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vertex {
    pub digest: String,
    pub inputs: Vec<String>,
    pub name: String,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub error: String,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexStatus {
    pub id: String,
    pub vertex: String,
    pub name: String,
    pub current: i64,
    pub total: i64,
    pub timestamp: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLog {
    pub vertex: String,
    pub stream: i32,
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

/// Filter for a disk usage query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskUsageInfo {
    pub filter: String,
}

/// Cache manager view of one cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageInfo {
    pub id: String,
    pub mutable: bool,
    pub in_use: bool,
    pub size: i64,
    pub parent: Option<String>,
    pub usage_count: u32,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Build-graph execution engine
#[async_trait]
pub trait Solver: Send + Sync {
    /// Start solving a build. Returns once the engine has accepted or
    /// finished the request; progress goes to [`Solver::status`] subscribers.
    async fn solve(&self, ctx: &CallContext, id: &str, req: SolveRequest) -> ControlResult<()>;

    /// Push progress for build `id` onto `tx` until the build finishes, then
    /// drop `tx`. Must stop early once `cancel` fires.
    ///
    /// Each call gets its own channel; concurrent subscribers for one build
    /// are fanned out by the engine.
    async fn status(
        &self,
        cancel: CancellationToken,
        id: &str,
        tx: mpsc::Sender<SolveStatus>,
    ) -> ControlResult<()>;
}

/// Content-addressable cache manager
#[async_trait]
pub trait CacheManager: Send + Sync {
    async fn disk_usage(
        &self,
        ctx: &CallContext,
        info: DiskUsageInfo,
    ) -> ControlResult<Vec<UsageInfo>>;
}

/// Named frontend that turns frontend options into a build
pub trait Frontend: Send + Sync {
    fn name(&self) -> &str;
}

/// Named exporter that binds attributes into an instance
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn resolve(
        &self,
        ctx: &CallContext,
        attrs: &HashMap<String, String>,
    ) -> ControlResult<Box<dyn ExporterInstance>>;
}

/// Exporter bound to one request's attributes
pub trait ExporterInstance: Send + Sync {
    fn name(&self) -> &str;
}

/// Session manager: runs a multiplexed protocol over a hijacked connection
#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// Serve the connection until the peer goes away. Owns `conn`.
    ///
    /// When `ctx.cancel` fires the connection is closed underneath the
    /// handler; it is still awaited and its result returned to the caller.
    async fn handle_conn(
        &self,
        ctx: &CallContext,
        conn: Conn,
        opts: SessionOptions,
    ) -> ControlResult<()>;
}

/// Name → implementation lookup for frontends and exporters
pub struct Registry<T: ?Sized> {
    kind: &'static str,
    entries: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> Registry<T> {
    /// Create an empty registry; `kind` names entries in errors
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    /// Register an entry, replacing any previous entry with that name
    pub fn insert(&mut self, name: impl Into<String>, entry: Arc<T>) {
        self.entries.insert(name.into(), entry);
    }

    pub fn with(mut self, name: impl Into<String>, entry: Arc<T>) -> Self {
        self.insert(name, entry);
        self
    }

    /// Look up an entry by name
    pub fn get(&self, name: &str) -> ControlResult<Arc<T>> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| ControlError::NotFound {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

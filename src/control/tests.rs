use super::*;
use crate::api::{CacheOptions, StatusResponse};
use crate::engine::{
    self, DiskUsageInfo, ExporterInstance, SolveStatus, UsageInfo, Vertex,
};
use crate::error::ErrorKind;
use crate::session::{Conn, SessionOptions};
use bytes::Bytes;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct Dispatched {
    id: String,
    session: Option<String>,
    frontend: Option<String>,
    exporter: Option<String>,
    export_cache_ref: Option<String>,
    import_cache_ref: Option<String>,
    frontend_opt: HashMap<String, String>,
}

#[derive(Default)]
struct FakeSolver {
    solves: Mutex<Vec<Dispatched>>,
    batches: usize,
}

impl FakeSolver {
    fn solve_count(&self) -> usize {
        self.solves.lock().unwrap().len()
    }
}

#[async_trait]
impl Solver for FakeSolver {
    async fn solve(
        &self,
        ctx: &CallContext,
        id: &str,
        req: engine::SolveRequest,
    ) -> ControlResult<()> {
        self.solves.lock().unwrap().push(Dispatched {
            id: id.to_string(),
            session: ctx.session_id.clone(),
            frontend: req.frontend.as_ref().map(|f| f.name().to_string()),
            exporter: req.exporter.as_ref().map(|e| e.name().to_string()),
            export_cache_ref: req.export_cache_ref,
            import_cache_ref: req.import_cache_ref,
            frontend_opt: req.frontend_opt,
        });
        Ok(())
    }

    async fn status(
        &self,
        _cancel: CancellationToken,
        id: &str,
        tx: mpsc::Sender<SolveStatus>,
    ) -> ControlResult<()> {
        for n in 0..self.batches {
            let status = SolveStatus {
                vertexes: vec![Vertex {
                    digest: format!("{}-{}", id, n),
                    ..Default::default()
                }],
                ..Default::default()
            };
            if tx.send(status).await.is_err() {
                return Err(ControlError::Cancelled);
            }
        }
        Ok(())
    }
}

struct FakeCache {
    fail: bool,
    filters: Mutex<Vec<String>>,
}

#[async_trait]
impl CacheManager for FakeCache {
    async fn disk_usage(
        &self,
        _ctx: &CallContext,
        info: DiskUsageInfo,
    ) -> ControlResult<Vec<UsageInfo>> {
        self.filters.lock().unwrap().push(info.filter);
        if self.fail {
            return Err(ControlError::upstream("metadata store locked"));
        }
        let now = Utc::now();
        Ok(vec![
            UsageInfo {
                id: "a".to_string(),
                mutable: false,
                in_use: false,
                size: 100,
                parent: None,
                usage_count: 2,
                description: "base layer".to_string(),
                created_at: now,
                last_used_at: Some(now),
            },
            UsageInfo {
                id: "b".to_string(),
                mutable: true,
                in_use: true,
                size: 50,
                parent: Some("a".to_string()),
                usage_count: 1,
                description: "exec mount".to_string(),
                created_at: now,
                last_used_at: None,
            },
        ])
    }
}

struct NamedFrontend(&'static str);

impl Frontend for NamedFrontend {
    fn name(&self) -> &str {
        self.0
    }
}

struct BoundExporter(String);

impl ExporterInstance for BoundExporter {
    fn name(&self) -> &str {
        &self.0
    }
}

/// Resolves to an instance named after its `name` attribute; fails when
/// the attribute is missing
struct ImageExporter;

#[async_trait]
impl Exporter for ImageExporter {
    async fn resolve(
        &self,
        _ctx: &CallContext,
        attrs: &HashMap<String, String>,
    ) -> ControlResult<Box<dyn ExporterInstance>> {
        match attrs.get("name") {
            Some(name) => Ok(Box::new(BoundExporter(format!("image:{}", name)))),
            None => Err(ControlError::upstream("image exporter requires a name attribute")),
        }
    }
}

/// Reads until EOF; reports `Cancelled` if the caller went away meanwhile
#[derive(Default)]
struct DrainHandler {
    finished: Arc<AtomicBool>,
}

#[async_trait]
impl SessionHandler for DrainHandler {
    async fn handle_conn(
        &self,
        ctx: &CallContext,
        mut conn: Conn,
        _opts: SessionOptions,
    ) -> ControlResult<()> {
        let mut buf = Vec::new();
        let read = conn.read_to_end(&mut buf).await;
        self.finished.store(true, Ordering::SeqCst);
        read.map_err(|e| ControlError::io("draining session", e))?;
        if ctx.cancel.is_cancelled() {
            return Err(ControlError::Cancelled);
        }
        Ok(())
    }
}

struct Fixture {
    controller: Controller,
    solver: Arc<FakeSolver>,
    cache: Arc<FakeCache>,
    session_finished: Arc<AtomicBool>,
}

fn fixture_with(solver: FakeSolver, cache_fails: bool) -> Fixture {
    let solver = Arc::new(solver);
    let cache = Arc::new(FakeCache {
        fail: cache_fails,
        filters: Mutex::new(Vec::new()),
    });
    let handler = DrainHandler::default();
    let session_finished = handler.finished.clone();
    let controller = Controller::new(ControllerOpt {
        solver: solver.clone(),
        cache_manager: cache.clone(),
        frontends: Registry::<dyn Frontend>::new("frontend")
            .with("dockerfile.v0", Arc::new(NamedFrontend("dockerfile.v0"))),
        exporters: Registry::<dyn Exporter>::new("exporter").with("image", Arc::new(ImageExporter)),
        session_handler: Arc::new(handler),
        config: Config::default(),
    })
    .unwrap();
    Fixture {
        controller,
        solver,
        cache,
        session_finished,
    }
}

fn fixture() -> Fixture {
    fixture_with(FakeSolver::default(), false)
}

fn solve_request() -> SolveRequest {
    SolveRequest {
        ref_: "build-7".to_string(),
        definition: b"def".to_vec(),
        frontend: "dockerfile.v0".to_string(),
        frontend_attrs: HashMap::from([("target".to_string(), "release".to_string())]),
        exporter: "image".to_string(),
        exporter_attrs: HashMap::from([("name".to_string(), "app".to_string())]),
        session: "sess-1".to_string(),
        cache: CacheOptions {
            export_ref: "cache/app".to_string(),
            import_ref: "registry.local:5000/cache/app:main".to_string(),
        },
    }
}

#[tokio::test]
async fn solve_dispatches_translated_request() {
    let fx = fixture();
    fx.controller
        .solve(&CallContext::default(), solve_request())
        .await
        .unwrap();

    let solves = fx.solver.solves.lock().unwrap();
    let dispatched = &solves[0];
    assert_eq!(dispatched.id, "build-7");
    assert_eq!(dispatched.session.as_deref(), Some("sess-1"));
    assert_eq!(dispatched.frontend.as_deref(), Some("dockerfile.v0"));
    assert_eq!(dispatched.exporter.as_deref(), Some("image:app"));
    assert_eq!(
        dispatched.export_cache_ref.as_deref(),
        Some("docker.io/cache/app:latest")
    );
    assert_eq!(
        dispatched.import_cache_ref.as_deref(),
        Some("registry.local:5000/cache/app:main")
    );
    assert_eq!(dispatched.frontend_opt["target"], "release");
}

#[tokio::test]
async fn solve_without_names_or_cache() {
    let fx = fixture();
    let req = SolveRequest {
        ref_: "plain".to_string(),
        ..Default::default()
    };
    fx.controller.solve(&CallContext::default(), req).await.unwrap();

    let solves = fx.solver.solves.lock().unwrap();
    assert!(solves[0].frontend.is_none());
    assert!(solves[0].exporter.is_none());
    assert!(solves[0].export_cache_ref.is_none());
    assert!(solves[0].import_cache_ref.is_none());
    assert!(solves[0].session.is_none());
}

#[tokio::test]
async fn unknown_frontend_never_reaches_engine() {
    let fx = fixture();
    let req = SolveRequest {
        frontend: "gateway.v9".to_string(),
        ..solve_request()
    };

    let err = fx
        .controller
        .solve(&CallContext::default(), req)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("gateway.v9"));
    assert_eq!(fx.solver.solve_count(), 0);
}

#[tokio::test]
async fn unknown_exporter_never_reaches_engine() {
    let fx = fixture();
    let req = SolveRequest {
        exporter: "tarball".to_string(),
        ..solve_request()
    };

    let err = fx
        .controller
        .solve(&CallContext::default(), req)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("tarball"));
    assert_eq!(fx.solver.solve_count(), 0);
}

#[tokio::test]
async fn exporter_resolution_error_is_propagated() {
    let fx = fixture();
    let req = SolveRequest {
        exporter_attrs: HashMap::new(),
        ..solve_request()
    };

    let err = fx
        .controller
        .solve(&CallContext::default(), req)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "image exporter requires a name attribute");
    assert_eq!(fx.solver.solve_count(), 0);
}

#[tokio::test]
async fn malformed_cache_ref_aborts_solve() {
    let fx = fixture();
    let req = SolveRequest {
        cache: CacheOptions {
            export_ref: "cache/app".to_string(),
            import_ref: "Cache/App".to_string(),
        },
        ..solve_request()
    };

    let err = fx
        .controller
        .solve(&CallContext::default(), req)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(fx.solver.solve_count(), 0);
}

#[tokio::test]
async fn disk_usage_maps_every_record() {
    let fx = fixture();
    let resp = fx
        .controller
        .disk_usage(
            &CallContext::default(),
            DiskUsageRequest {
                filter: "type==regular".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(resp.record.len(), 2);
    assert_eq!(resp.record[0].id, "a");
    assert_eq!(resp.record[0].usage_count, 2);
    assert_eq!(resp.record[1].parent.as_deref(), Some("a"));
    assert!(resp.record[1].in_use);
    assert_eq!(*fx.cache.filters.lock().unwrap(), vec!["type==regular"]);
}

#[tokio::test]
async fn disk_usage_error_is_propagated() {
    let fx = fixture_with(FakeSolver::default(), true);
    let err = fx
        .controller
        .disk_usage(&CallContext::default(), DiskUsageRequest::default())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "metadata store locked");
    assert_eq!(err.kind(), ErrorKind::Upstream);
}

#[tokio::test]
async fn status_streams_batches_for_reference() {
    let fx = fixture_with(
        FakeSolver {
            batches: 3,
            ..Default::default()
        },
        false,
    );
    let (tx, mut rx) = mpsc::channel::<StatusResponse>(16);

    fx.controller
        .status(
            &CallContext::default(),
            StatusRequest {
                ref_: "build-7".to_string(),
            },
            Box::new(tx),
        )
        .await
        .unwrap();

    let mut digests = Vec::new();
    while let Some(resp) = rx.recv().await {
        digests.push(resp.vertexes[0].digest.clone());
    }
    assert_eq!(digests, vec!["build-7-0", "build-7-1", "build-7-2"]);
}

#[tokio::test]
async fn session_runs_until_peer_closes() {
    let fx = fixture();
    let closes = Arc::new(AtomicUsize::new(0));
    let (tx, _rx) = mpsc::channel(1);
    let inbound = stream::iter(vec![Ok(Bytes::from_static(b"hello"))]).boxed();
    let stream = ServerStream::new(HashMap::new(), inbound, tx).on_close({
        let closes = closes.clone();
        move || {
            closes.fetch_add(1, Ordering::SeqCst);
        }
    });

    fx.controller
        .session(&CallContext::default(), stream)
        .await
        .unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn session_cancelled_by_caller_closes_connection() {
    let fx = fixture();
    let closes = Arc::new(AtomicUsize::new(0));
    let (tx, _rx) = mpsc::channel(1);
    let stream = ServerStream::new(HashMap::new(), stream::pending().boxed(), tx).on_close({
        let closes = closes.clone();
        move || {
            closes.fetch_add(1, Ordering::SeqCst);
        }
    });

    let ctx = CallContext::default();
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    let err = fx.controller.session(&ctx, stream).await.unwrap_err();
    // The handler's own verdict, delivered only after it finished
    assert!(matches!(err, ControlError::Cancelled));
    assert!(fx.session_finished.load(Ordering::SeqCst));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn zero_capacity_is_rejected() {
    let mut config = Config::default();
    config.status.channel_capacity = 0;
    let result = Controller::new(ControllerOpt {
        solver: Arc::new(FakeSolver::default()),
        cache_manager: Arc::new(FakeCache {
            fail: false,
            filters: Mutex::new(Vec::new()),
        }),
        frontends: Registry::new("frontend"),
        exporters: Registry::new("exporter"),
        session_handler: Arc::new(DrainHandler::default()),
        config,
    });
    assert!(result.is_err());
}

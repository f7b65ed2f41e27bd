//! Control service
//!
//! The service surface a transport registers: disk usage queries, solve
//! requests, status streams and session tunnels. All build work happens in
//! the engine; this layer translates, bridges and hands off.

mod convert;
mod disk_usage;
pub mod status;
mod translate;

#[cfg(test)]
mod tests;

pub use status::StatusSink;

use crate::api::{
    DiskUsageRequest, DiskUsageResponse, SolveRequest, SolveResponse, StatusRequest,
};
use crate::config::Config;
use crate::engine::{CacheManager, CallContext, Exporter, Frontend, Registry, SessionHandler, Solver};
use crate::error::{ControlError, ControlResult};
use crate::session::{self, ServerStream};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// RPC surface of the control service
#[async_trait]
pub trait Control: Send + Sync {
    async fn disk_usage(
        &self,
        ctx: &CallContext,
        req: DiskUsageRequest,
    ) -> ControlResult<DiskUsageResponse>;

    async fn solve(&self, ctx: &CallContext, req: SolveRequest) -> ControlResult<SolveResponse>;

    /// Stream progress for `req.ref_` onto `sink` until the build ends
    async fn status(
        &self,
        ctx: &CallContext,
        req: StatusRequest,
        sink: Box<dyn StatusSink>,
    ) -> ControlResult<()>;

    /// Hijack `stream` into a session tunnel; returns once the session
    /// handler has returned, caller cancellation included
    async fn session(&self, ctx: &CallContext, stream: ServerStream) -> ControlResult<()>;
}

/// Collaborators and settings for a [`Controller`]
pub struct ControllerOpt {
    pub solver: Arc<dyn Solver>,
    pub cache_manager: Arc<dyn CacheManager>,
    pub frontends: Registry<dyn Frontend>,
    pub exporters: Registry<dyn Exporter>,
    pub session_handler: Arc<dyn SessionHandler>,
    pub config: Config,
}

pub struct Controller {
    opt: ControllerOpt,
}

impl Controller {
    pub fn new(opt: ControllerOpt) -> ControlResult<Self> {
        opt.config.validate().map_err(ControlError::Internal)?;

        info!(
            frontends = ?opt.frontends.names(),
            exporters = ?opt.exporters.names(),
            "control service ready"
        );
        Ok(Self { opt })
    }
}

#[async_trait]
impl Control for Controller {
    async fn disk_usage(
        &self,
        ctx: &CallContext,
        req: DiskUsageRequest,
    ) -> ControlResult<DiskUsageResponse> {
        disk_usage::report(self.opt.cache_manager.as_ref(), ctx, req).await
    }

    async fn solve(&self, ctx: &CallContext, req: SolveRequest) -> ControlResult<SolveResponse> {
        let ctx = ctx.clone().with_session(&req.session);
        let id = req.ref_.clone();

        let engine_req =
            translate::translate(&self.opt.frontends, &self.opt.exporters, &ctx, req).await?;

        info!(build = %id, session = ?ctx.session_id, "solve dispatched");
        self.opt.solver.solve(&ctx, &id, engine_req).await?;
        Ok(SolveResponse {})
    }

    async fn status(
        &self,
        ctx: &CallContext,
        req: StatusRequest,
        sink: Box<dyn StatusSink>,
    ) -> ControlResult<()> {
        status::bridge(
            self.opt.solver.clone(),
            &ctx.cancel,
            req.ref_,
            self.opt.config.status.channel_capacity,
            sink,
        )
        .await
    }

    async fn session(&self, ctx: &CallContext, stream: ServerStream) -> ControlResult<()> {
        session::tunnel::serve(
            self.opt.session_handler.clone(),
            ctx,
            stream,
            self.opt.config.session.max_frame_size,
        )
        .await
    }
}

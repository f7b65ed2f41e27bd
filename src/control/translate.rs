//! Solve request translation
//!
//! Resolves the named frontend and exporter and normalizes cache references
//! before anything reaches the engine. Any failure here aborts the request
//! with no side effects.

use crate::api;
use crate::engine::{self, CallContext, Exporter, Frontend, Registry};
use crate::error::ControlResult;
use crate::reference::normalize_optional;
use tracing::debug;

pub(crate) async fn translate(
    frontends: &Registry<dyn Frontend>,
    exporters: &Registry<dyn Exporter>,
    ctx: &CallContext,
    req: api::SolveRequest,
) -> ControlResult<engine::SolveRequest> {
    let frontend = if req.frontend.is_empty() {
        None
    } else {
        Some(frontends.get(&req.frontend)?)
    };

    let exporter = if req.exporter.is_empty() {
        None
    } else {
        let exporter = exporters.get(&req.exporter)?;
        Some(exporter.resolve(ctx, &req.exporter_attrs).await?)
    };

    let export_cache_ref = normalize_optional(&req.cache.export_ref)?;
    let import_cache_ref = normalize_optional(&req.cache.import_ref)?;

    debug!(
        frontend = %req.frontend,
        exporter = %req.exporter,
        export_cache = ?export_cache_ref,
        import_cache = ?import_cache_ref,
        "translated solve request"
    );

    Ok(engine::SolveRequest {
        definition: req.definition,
        frontend,
        frontend_opt: req.frontend_attrs,
        exporter,
        export_cache_ref,
        import_cache_ref,
    })
}

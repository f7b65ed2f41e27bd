//! Disk usage reporting

use crate::api::{DiskUsageRequest, DiskUsageResponse};
use crate::engine::{CacheManager, CallContext, DiskUsageInfo};
use crate::error::ControlResult;
use tracing::debug;

pub(crate) async fn report(
    cache_manager: &dyn CacheManager,
    ctx: &CallContext,
    req: DiskUsageRequest,
) -> ControlResult<DiskUsageResponse> {
    let records = cache_manager
        .disk_usage(ctx, DiskUsageInfo { filter: req.filter })
        .await?;

    debug!(records = records.len(), "disk usage query answered");

    Ok(DiskUsageResponse {
        record: records.into_iter().map(Into::into).collect(),
    })
}

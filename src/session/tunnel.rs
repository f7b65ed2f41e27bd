//! Session tunnel: hand a hijacked call to the session manager

use crate::engine::{CallContext, SessionHandler};
use crate::error::{ControlError, ControlResult};
use crate::session::hijack::{hijack, CloseHandle, ServerStream};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Closes the connection when the tunnel is left, including when the
/// tunnel future itself is dropped mid-session.
struct CloseGuard(CloseHandle);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Hijack `stream` and serve it with `handler` until the handler returns.
///
/// The connection is closed before this returns on every path. Caller
/// cancellation closes it early, but the handler is still awaited. The
/// handler's result is returned as-is; a handler panic becomes `TaskPanicked`.
pub async fn serve(
    handler: Arc<dyn SessionHandler>,
    ctx: &CallContext,
    stream: ServerStream,
    max_frame_size: usize,
) -> ControlResult<()> {
    let (conn, opts) = hijack(stream, max_frame_size);
    let close = conn.close_handle();
    let guard = CloseGuard(close.clone());

    info!(
        session = opts.uuid().unwrap_or("-"),
        name = opts.name().unwrap_or("-"),
        methods = opts.methods().len(),
        "session tunnel established"
    );

    let handler_ctx = ctx.clone();
    let mut task =
        tokio::spawn(async move { handler.handle_conn(&handler_ctx, conn, opts).await });

    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = ctx.cancel.cancelled() => {
            debug!("caller cancelled, closing session");
            close.close();
            task.await
        }
    };
    drop(guard);

    match joined {
        Ok(Ok(())) => {
            debug!("session tunnel finished");
            Ok(())
        }
        Ok(Err(err)) => {
            warn!(error = %err, "session handler failed");
            Err(err)
        }
        Err(join_err) => {
            warn!(error = %join_err, "session handler panicked");
            Err(ControlError::TaskPanicked(join_err.to_string()))
        }
    }
}

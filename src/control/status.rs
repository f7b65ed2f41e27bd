//! Status bridge
//!
//! Subscribes to the engine's progress channel for one build and republishes
//! every batch on the caller's stream, in receive order.
//!
//! # Failure model
//!
//! Producer (engine) and consumer (stream writer) run as two tasks in one
//! [`TaskGroup`]. Whichever fails first cancels the shared token; the other
//! unwinds and its outcome is discarded. Under normal completion every batch
//! the engine produced is written before the bridge returns.

use crate::api::StatusResponse;
use crate::engine::{SolveStatus, Solver};
use crate::error::{ControlError, ControlResult};
use crate::task_group::TaskGroup;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Outbound half of a status call
#[async_trait]
pub trait StatusSink: Send {
    async fn send(&mut self, msg: StatusResponse) -> ControlResult<()>;
}

#[async_trait]
impl StatusSink for mpsc::Sender<StatusResponse> {
    async fn send(&mut self, msg: StatusResponse) -> ControlResult<()> {
        mpsc::Sender::send(self, msg)
            .await
            .map_err(|_| ControlError::Transport("status stream closed by peer".to_string()))
    }
}

/// Bridge build `id`'s progress onto `sink` until the build finishes, the
/// caller cancels, or either side fails.
pub async fn bridge(
    solver: Arc<dyn Solver>,
    cancel: &CancellationToken,
    id: String,
    capacity: usize,
    sink: Box<dyn StatusSink>,
) -> ControlResult<()> {
    let (tx, rx) = mpsc::channel(capacity);
    // Held here until the group is done so a failing consumer never closes
    // the channel under the producer before its error is recorded
    let rx = Arc::new(Mutex::new(rx));
    let mut group = TaskGroup::with_parent(cancel);

    info!(build = %id, "status stream started");

    let producer_token = group.token();
    let producer_id = id.clone();
    group.spawn(async move { solver.status(producer_token, &producer_id, tx).await });
    group.spawn(forward(group.token(), rx.clone(), sink));

    let result = group.wait().await;
    drop(rx);
    match &result {
        Ok(()) => info!(build = %id, "status stream finished"),
        Err(err) => info!(build = %id, error = %err, "status stream aborted"),
    }
    result
}

async fn forward(
    token: CancellationToken,
    rx: Arc<Mutex<mpsc::Receiver<SolveStatus>>>,
    mut sink: Box<dyn StatusSink>,
) -> ControlResult<()> {
    let mut rx = rx.lock().await;
    let mut forwarded: usize = 0;

    loop {
        let status = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ControlError::Cancelled),
            next = rx.recv() => match next {
                Some(status) => status,
                None => {
                    debug!(forwarded, "progress channel closed");
                    return Ok(());
                }
            },
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ControlError::Cancelled),
            sent = sink.send(status.into()) => sent?,
        }
        forwarded += 1;
    }
}

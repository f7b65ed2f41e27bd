//! First-error-cancels task group
//!
//! A set of tasks sharing one cancellation token. The first task to fail
//! cancels the token so its siblings can unwind; [`TaskGroup::wait`] joins
//! all of them and reports that first error.

use crate::error::{ControlError, ControlResult};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct TaskGroup {
    tasks: JoinSet<()>,
    shared: Arc<Shared>,
}

struct Shared {
    token: CancellationToken,
    first: Mutex<Option<ControlError>>,
}

impl Shared {
    /// Keep `err` if it is the first one, then cancel the group. The slot is
    /// filled before the token fires, so siblings woken by the cancellation
    /// can never win.
    fn record(&self, err: ControlError) {
        let mut first = self.first.lock().unwrap_or_else(PoisonError::into_inner);
        if first.is_none() {
            debug!(error = %err, "task failed, cancelling group");
            *first = Some(err);
            self.token.cancel();
        }
    }
}

impl TaskGroup {
    /// Create a group whose token is a child of `parent`, so cancelling the
    /// parent cancels every task in the group
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            shared: Arc::new(Shared {
                token: parent.child_token(),
                first: Mutex::new(None),
            }),
        }
    }

    /// The shared token tasks should observe
    pub fn token(&self) -> CancellationToken {
        self.shared.token.clone()
    }

    /// Spawn `task`. Its error is recorded from inside the task itself, before
    /// anything it owns is released.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ControlResult<()>> + Send + 'static,
    {
        let shared = self.shared.clone();
        self.tasks.spawn(async move {
            if let Err(err) = task.await {
                shared.record(err);
            }
        });
    }

    /// Wait for every task. Returns the first error recorded, if any; errors
    /// from tasks unwinding after cancellation are discarded.
    pub async fn wait(mut self) -> ControlResult<()> {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(join_err) = joined {
                self.shared
                    .record(ControlError::TaskPanicked(join_err.to_string()));
            }
        }

        let first = self
            .shared
            .first
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn all_ok() {
        let mut group = TaskGroup::with_parent(&CancellationToken::new());
        group.spawn(async { Ok(()) });
        group.spawn(async { Ok(()) });
        assert!(group.wait().await.is_ok());
    }

    #[tokio::test]
    async fn first_error_cancels_siblings() {
        let mut group = TaskGroup::with_parent(&CancellationToken::new());
        let token = group.token();

        group.spawn(async move {
            token.cancelled().await;
            Err(ControlError::Cancelled)
        });
        group.spawn(async { Err(ControlError::Transport("broken pipe".to_string())) });

        let observed = group.token();
        let err = group.wait().await.unwrap_err();
        assert!(matches!(err, ControlError::Transport(_)));
        assert!(observed.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sibling_woken_by_cancellation_never_wins() {
        for _ in 0..500 {
            let mut group = TaskGroup::with_parent(&CancellationToken::new());
            let token = group.token();
            group.spawn(async move {
                token.cancelled().await;
                Err(ControlError::upstream("woken by cancellation"))
            });
            group.spawn(async {
                tokio::task::yield_now().await;
                Err(ControlError::Transport("broken pipe".to_string()))
            });

            let err = group.wait().await.unwrap_err();
            assert!(matches!(err, ControlError::Transport(_)), "got {err}");
        }
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_tasks() {
        let parent = CancellationToken::new();
        let mut group = TaskGroup::with_parent(&parent);
        let token = group.token();
        group.spawn(async move {
            token.cancelled().await;
            Err(ControlError::Cancelled)
        });

        tokio::spawn({
            let parent = parent.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                parent.cancel();
            }
        });

        assert!(matches!(group.wait().await, Err(ControlError::Cancelled)));
    }

    #[tokio::test]
    async fn panic_is_reported() {
        let mut group = TaskGroup::with_parent(&CancellationToken::new());
        group.spawn(async {
            let fail = true;
            if fail {
                panic!("boom");
            }
            Ok(())
        });
        assert!(matches!(group.wait().await, Err(ControlError::TaskPanicked(_))));
    }
}

//! Mutual exclusion of long-running operations.
//!
//! The [`OperationSupervisor`] is a small actor task that owns the running
//! state of each [`OperationKind`]. Jobs run on the blocking pool; at most
//! one job per kind runs at a time, and a second request for a running kind
//! is rejected rather than queued.

use crate::error::{CoreError, CoreResult};
use crate::progress::CancelToken;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Kind of a supervised operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Creating a backup.
    Backup,
    /// Restoring a backup.
    Restore,
}

impl OperationKind {
    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::Restore => "restore",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an operation kind is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationState {
    /// Nothing running.
    #[default]
    Idle,
    /// A job is running.
    Running,
}

enum Command {
    Begin {
        kind: OperationKind,
        cancel: CancelToken,
        reply: oneshot::Sender<bool>,
    },
    End {
        kind: OperationKind,
        cancel: CancelToken,
    },
    State {
        kind: OperationKind,
        reply: oneshot::Sender<OperationState>,
    },
    Cancel {
        kind: OperationKind,
        reply: oneshot::Sender<bool>,
    },
}

/// Handle to the supervisor actor. Cloning shares the actor.
#[derive(Clone)]
pub struct OperationSupervisor {
    tx: mpsc::UnboundedSender<Command>,
}

impl OperationSupervisor {
    /// Starts the actor on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(actor(rx));
        Self { tx }
    }

    /// Runs `job` on the blocking pool as an operation of `kind`.
    ///
    /// The job receives a cancel token that [`cancel`](Self::cancel)
    /// triggers. The kind is marked idle again when the job returns, even
    /// if the returned future is dropped first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AlreadyRunning`] if a job of the same kind is
    /// running, [`CoreError::Worker`] if the job panicked or the actor is
    /// gone, or the job's own error.
    pub async fn run<T, F>(&self, kind: OperationKind, job: F) -> CoreResult<T>
    where
        F: FnOnce(CancelToken) -> CoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let cancel = CancelToken::new();
        // Armed before the handshake so that dropping this future while it
        // waits for the reply still releases the kind.
        let guard = RunningGuard {
            tx: self.tx.clone(),
            kind,
            cancel: cancel.clone(),
        };
        let (reply, accepted) = oneshot::channel();
        self.send(Command::Begin {
            kind,
            cancel: cancel.clone(),
            reply,
        })?;
        if !accepted.await.map_err(|_| actor_gone())? {
            return Err(CoreError::AlreadyRunning {
                operation: kind.as_str(),
            });
        }

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            job(cancel)
        })
        .await
        .map_err(|e| CoreError::worker(format!("{kind} job failed: {e}")))?
    }

    /// Returns the state of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Worker`] if the actor is gone.
    pub async fn state(&self, kind: OperationKind) -> CoreResult<OperationState> {
        let (reply, state) = oneshot::channel();
        self.send(Command::State { kind, reply })?;
        state.await.map_err(|_| actor_gone())
    }

    /// Requests cancellation of the running job of `kind`. Returns false if
    /// none is running.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Worker`] if the actor is gone.
    pub async fn cancel(&self, kind: OperationKind) -> CoreResult<bool> {
        let (reply, canceled) = oneshot::channel();
        self.send(Command::Cancel { kind, reply })?;
        canceled.await.map_err(|_| actor_gone())
    }

    fn send(&self, command: Command) -> CoreResult<()> {
        self.tx.send(command).map_err(|_| actor_gone())
    }
}

impl fmt::Debug for OperationSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationSupervisor")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

fn actor_gone() -> CoreError {
    CoreError::worker("operation supervisor stopped")
}

/// Marks the operation idle when the job ends or the run is abandoned.
///
/// The actor only honours the `End` if `cancel` is the token it accepted,
/// so the guard of a rejected run leaves the running job alone.
struct RunningGuard {
    tx: mpsc::UnboundedSender<Command>,
    kind: OperationKind,
    cancel: CancelToken,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        // A closed channel means the runtime is shutting down.
        let _ = self.tx.send(Command::End {
            kind: self.kind,
            cancel: self.cancel.clone(),
        });
    }
}

async fn actor(mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut running: HashMap<OperationKind, CancelToken> = HashMap::new();
    while let Some(command) = rx.recv().await {
        match command {
            Command::Begin {
                kind,
                cancel,
                reply,
            } => {
                let accepted = !running.contains_key(&kind);
                if accepted {
                    running.insert(kind, cancel);
                    info!(operation = %kind, "operation started");
                } else {
                    debug!(operation = %kind, "operation rejected, already running");
                }
                let _ = reply.send(accepted);
            }
            Command::End { kind, cancel } => {
                if running.get(&kind).is_some_and(|owner| owner.same_as(&cancel)) {
                    running.remove(&kind);
                    info!(operation = %kind, "operation ended");
                }
            }
            Command::State { kind, reply } => {
                let state = if running.contains_key(&kind) {
                    OperationState::Running
                } else {
                    OperationState::Idle
                };
                let _ = reply.send(state);
            }
            Command::Cancel { kind, reply } => {
                let found = running.get(&kind).map(CancelToken::cancel).is_some();
                let _ = reply.send(found);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    async fn wait_for(supervisor: &OperationSupervisor, kind: OperationKind, state: OperationState) {
        while supervisor.state(kind).await.unwrap() != state {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn second_run_of_same_kind_is_rejected() {
        let supervisor = OperationSupervisor::spawn();
        let (release, released) = std_mpsc::channel::<()>();

        let first = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move {
                supervisor
                    .run(OperationKind::Restore, move |_| {
                        released.recv().ok();
                        Ok(7)
                    })
                    .await
            })
        };
        wait_for(&supervisor, OperationKind::Restore, OperationState::Running).await;

        let second = supervisor.run(OperationKind::Restore, |_| Ok(8)).await;
        assert!(matches!(
            second,
            Err(CoreError::AlreadyRunning { operation: "restore" })
        ));
        assert_eq!(
            supervisor.state(OperationKind::Restore).await.unwrap(),
            OperationState::Running
        );

        // Other kinds are independent.
        let backup = supervisor.run(OperationKind::Backup, |_| Ok(9)).await;
        assert_eq!(backup.unwrap(), 9);

        release.send(()).unwrap();
        assert_eq!(first.await.unwrap().unwrap(), 7);
        assert_eq!(
            supervisor.state(OperationKind::Restore).await.unwrap(),
            OperationState::Idle
        );
        assert_eq!(supervisor.run(OperationKind::Restore, |_| Ok(10)).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn cancel_reaches_running_job() {
        let supervisor = OperationSupervisor::spawn();
        assert!(!supervisor.cancel(OperationKind::Backup).await.unwrap());

        let job = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move {
                supervisor
                    .run(OperationKind::Backup, |cancel| loop {
                        cancel.check()?;
                        std::thread::sleep(Duration::from_millis(1));
                    })
                    .await
            })
        };
        wait_for(&supervisor, OperationKind::Backup, OperationState::Running).await;
        assert!(supervisor.cancel(OperationKind::Backup).await.unwrap());

        let result: CoreResult<()> = job.await.unwrap();
        assert!(matches!(result, Err(CoreError::Canceled)));
        wait_for(&supervisor, OperationKind::Backup, OperationState::Idle).await;
    }

    #[tokio::test]
    async fn failed_job_releases_its_kind() {
        let supervisor = OperationSupervisor::spawn();
        let result: CoreResult<()> = supervisor
            .run(OperationKind::Restore, |_| Err(CoreError::invalid_backup("broken")))
            .await;
        assert!(matches!(result, Err(CoreError::InvalidBackup { .. })));
        assert_eq!(
            supervisor.state(OperationKind::Restore).await.unwrap(),
            OperationState::Idle
        );
    }

    #[tokio::test]
    async fn run_dropped_during_handshake_releases_its_kind() {
        let supervisor = OperationSupervisor::spawn();
        {
            let run = supervisor.run(OperationKind::Backup, |_| Ok(()));
            tokio::pin!(run);
            // One poll sends the request; the actor has not answered yet.
            tokio::select! {
                biased;
                _ = &mut run => panic!("run finished without the actor"),
                () = std::future::ready(()) => {}
            }
        }

        assert_eq!(
            supervisor.state(OperationKind::Backup).await.unwrap(),
            OperationState::Idle
        );
        assert_eq!(supervisor.run(OperationKind::Backup, |_| Ok(3)).await.unwrap(), 3);
    }
}

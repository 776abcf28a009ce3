//! Cooperative pause/resume/cancel for a running job.
//!
//! The front end keeps a [`JobHandle`]; the job keeps a [`JobToken`] and
//! consults it at each checkpoint. A paused token waits on the watch channel
//! until the state changes.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use mparchive_crawler::Checkpoint;

/// Externally controlled state of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Paused,
    /// Terminal; a cancelled job cannot be resumed.
    Cancelled,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Paused => f.write_str("paused"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Create a linked handle/token pair in the `Running` state.
pub fn job_control() -> (JobHandle, JobToken) {
    let (tx, rx) = watch::channel(JobState::Running);
    (JobHandle { tx: Arc::new(tx) }, JobToken { rx })
}

/// Controller side, held by whoever drives the job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    tx: Arc<watch::Sender<JobState>>,
}

impl JobHandle {
    /// Pause at the next checkpoint. Returns `false` if the job was not running.
    pub fn pause(&self) -> bool {
        self.transition(JobState::Running, JobState::Paused)
    }

    /// Resume a paused job. Returns `false` if the job was not paused.
    pub fn resume(&self) -> bool {
        self.transition(JobState::Paused, JobState::Running)
    }

    /// Cancel at the next checkpoint. Returns `false` if already cancelled.
    pub fn cancel(&self) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if *state == JobState::Cancelled {
                false
            } else {
                *state = JobState::Cancelled;
                true
            }
        });
        if changed {
            info!("job cancellation requested");
        }
        changed
    }

    pub fn state(&self) -> JobState {
        *self.tx.borrow()
    }

    fn transition(&self, from: JobState, to: JobState) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed {
            info!(state = %to, "job state changed");
        }
        changed
    }
}

/// Job side: observed at every checkpoint.
#[derive(Debug, Clone)]
pub struct JobToken {
    rx: watch::Receiver<JobState>,
}

impl JobToken {
    pub fn state(&self) -> JobState {
        *self.rx.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == JobState::Cancelled
    }

    /// Wait out any pause, then report whether the job may continue.
    ///
    /// A handle dropped while the job is paused counts as cancellation.
    pub async fn checkpoint(&self) -> bool {
        let mut rx = self.rx.clone();
        match rx.wait_for(|state| *state != JobState::Paused).await {
            Ok(state) => *state == JobState::Running,
            Err(_) => false,
        }
    }
}

impl Checkpoint for JobToken {
    async fn proceed(&self) -> bool {
        self.checkpoint().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn running_token_passes_immediately() {
        let (_handle, token) = job_control();
        assert!(token.checkpoint().await);
    }

    #[tokio::test]
    async fn cancelled_token_stops() {
        let (handle, token) = job_control();
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(!token.checkpoint().await);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn paused_token_waits_for_resume() {
        let (handle, token) = job_control();
        assert!(handle.pause());

        let waiter = tokio::spawn(async move { token.checkpoint().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        assert!(handle.resume());
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn cancel_while_paused_wakes_waiter() {
        let (handle, token) = job_control();
        handle.pause();

        let waiter = tokio::spawn(async move { token.checkpoint().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn dropped_handle_while_paused_counts_as_cancel() {
        let (handle, token) = job_control();
        handle.pause();
        drop(handle);
        assert!(!token.checkpoint().await);
    }

    #[test]
    fn invalid_transitions_are_ignored() {
        let (handle, _token) = job_control();
        assert!(!handle.resume());
        handle.cancel();
        assert!(!handle.pause());
        assert!(!handle.resume());
        assert_eq!(handle.state(), JobState::Cancelled);
    }
}

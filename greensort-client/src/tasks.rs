//! Tasks owned by one streaming session
//!
//! Every timer and background loop a session starts is registered here, so
//! tearing the session down cancels all of them at once.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Default)]
pub struct ScheduledTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl ScheduledTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handles.retain(|(_, h)| !h.is_finished());
        self.handles.push((name, tokio::spawn(task)));
    }

    /// Tasks that have not finished yet
    pub fn len(&self) -> usize {
        self.handles.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort everything immediately
    pub fn cancel_all(&mut self) {
        for (name, handle) in self.handles.drain(..) {
            if !handle.is_finished() {
                debug!("Cancelling task {}", name);
                handle.abort();
            }
        }
    }

    /// Give tasks `grace` to finish on their own, then abort the rest
    pub async fn shutdown(&mut self, grace: Duration) {
        let deadline = tokio::time::Instant::now() + grace;
        for (name, mut handle) in self.handles.drain(..) {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                debug!("Task {} did not finish in time; aborting", name);
                handle.abort();
            }
        }
    }
}

impl Drop for ScheduledTasks {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

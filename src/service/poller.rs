use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// A recurring background task owned by whoever holds the handle.
///
/// The task is aborted when the handle is dropped, so a poller never
/// outlives the view that started it.
#[derive(Debug)]
pub struct PollHandle {
    name: &'static str,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Runs `tick` right away and then every `period` until it breaks or
    /// the handle is dropped. A slow tick delays the next one instead of
    /// bursting to catch up.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tick().await.is_break() {
                    debug!(poller = name, "poller finished");
                    break;
                }
            }
        });
        debug!(poller = name, ?period, "poller started");
        Self { name, task }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            debug!(poller = self.name, "poller cancelled");
        }
        self.task.abort();
    }
}

//! Waiting on the running sources and stopping them.

use std::future::Future;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::tailer::TailerError;

type SourceTask = JoinHandle<Result<(), TailerError>>;

/// How the source tasks ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Tasks that stopped cleanly.
    pub stopped: usize,
    /// Tasks that returned an error or panicked.
    pub failed: usize,
    /// Tasks still running when the shutdown timeout expired.
    pub unfinished: usize,
}

impl RunOutcome {
    fn record(&mut self, result: Result<Result<(), TailerError>, JoinError>) {
        match result {
            Ok(Ok(())) => self.stopped += 1,
            // The tailer has already logged its own error.
            Ok(Err(_)) => self.failed += 1,
            Err(e) => {
                error!(error = %e, "Source task panicked");
                self.failed += 1;
            }
        }
    }
}

/// Waits until `interrupt` resolves or every task has ended, then signals
/// shutdown and gives the remaining tasks `timeout` to stop.
pub async fn supervise<F>(
    tasks: Vec<SourceTask>,
    interrupt: F,
    shutdown: &watch::Sender<bool>,
    timeout: Duration,
) -> RunOutcome
where
    F: Future<Output = ()>,
{
    let mut pending: FuturesUnordered<SourceTask> = tasks.into_iter().collect();
    let mut outcome = RunOutcome::default();

    let interrupted = {
        let all_ended = drain(&mut pending, &mut outcome);
        tokio::select! {
            () = interrupt => {
                info!("Received shutdown signal, stopping sources");
                true
            }
            () = all_ended => {
                warn!("Every source has stopped");
                false
            }
        }
    };

    if shutdown.send(true).is_err() {
        debug!("No task is listening for shutdown");
    }

    if interrupted
        && tokio::time::timeout(timeout, drain(&mut pending, &mut outcome))
            .await
            .is_err()
    {
        warn!(
            timeout_secs = timeout.as_secs(),
            unfinished = pending.len(),
            "Timed out waiting for sources to stop"
        );
    }

    outcome.unfinished = pending.len();
    outcome
}

async fn drain(pending: &mut FuturesUnordered<SourceTask>, outcome: &mut RunOutcome) {
    while let Some(result) = pending.next().await {
        outcome.record(result);
    }
}

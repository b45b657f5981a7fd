//! Background poller — runs the reply processor on a fixed interval.
//!
//! Each tick awaits the full run before waiting for the next tick, so
//! scheduled runs never overlap. Ticks missed during a long run are
//! skipped rather than fired back to back.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::config::{MAX_POLL_INTERVAL, PollConfig};
use crate::pipeline::processor::ReplyProcessor;

/// Handle to a running poller.
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PollerHandle {
    /// Cancel future ticks. A run already in flight is left to finish.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the poll loop to exit (after `stop()`).
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!("SMS reply poller task panicked: {e}");
        }
    }
}

/// Spawn the poll loop. Returns `None` when polling is disabled or the
/// interval is zero. Intervals above `MAX_POLL_INTERVAL` are clamped.
///
/// The first run starts immediately, then once per `config.interval`.
/// Run errors are logged here and never stop the loop.
pub fn spawn_reply_poller(
    config: &PollConfig,
    processor: Arc<ReplyProcessor>,
) -> Option<PollerHandle> {
    if !config.enabled {
        info!("SMS reply poller disabled");
        return None;
    }

    if config.interval.is_zero() {
        error!("SMS reply poll interval is zero, poller not started");
        return None;
    }
    let interval = config.interval.min(MAX_POLL_INTERVAL);
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            "SMS reply poller started"
        );

        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    // A dropped handle also stops the loop.
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("SMS reply poller shutting down");
                        return;
                    }
                    continue;
                }
                _ = tick.tick() => {}
            }

            poll_once(&processor).await;
        }
    });

    Some(PollerHandle { shutdown, handle })
}

async fn poll_once(processor: &ReplyProcessor) {
    match processor.run().await {
        Ok(summary) => {
            if summary.processed > 0 || summary.failed > 0 {
                info!(
                    total = summary.total,
                    processed = summary.processed,
                    failed = summary.failed,
                    "Scheduled SMS reply run finished"
                );
            }
        }
        Err(e) => {
            error!(error = %e, "Scheduled SMS reply run failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::pipeline::testing::{StubBackend, StubFetcher, reply};
    use crate::store::{LibSqlBackend, ReplyLedger};

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    fn poll_every(interval: Duration) -> PollConfig {
        PollConfig {
            enabled: true,
            interval,
            ..Default::default()
        }
    }

    async fn build(
        fetcher: &Arc<StubFetcher>,
        backend: &Arc<StubBackend>,
    ) -> (Arc<ReplyProcessor>, Arc<LibSqlBackend>) {
        let ledger = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let processor = Arc::new(ReplyProcessor::new(
            fetcher.clone(),
            backend.clone(),
            ledger.clone(),
        ));
        (processor, ledger)
    }

    #[tokio::test]
    async fn disabled_poller_is_not_spawned() {
        let fetcher = StubFetcher::new(vec![]);
        let backend = StubBackend::answering(200);
        let (processor, _ledger) = build(&fetcher, &backend).await;

        let config = PollConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(spawn_reply_poller(&config, processor).is_none());

        sleep(Duration::from_millis(50)).await;
        assert_eq!(fetcher.fetches(), 0);
    }

    #[tokio::test]
    async fn zero_interval_is_not_spawned() {
        let fetcher = StubFetcher::new(vec![]);
        let backend = StubBackend::answering(200);
        let (processor, _ledger) = build(&fetcher, &backend).await;

        assert!(spawn_reply_poller(&poll_every(Duration::ZERO), processor).is_none());
    }

    #[tokio::test]
    async fn huge_interval_is_clamped() {
        timeout(TEST_TIMEOUT, async {
            let fetcher = StubFetcher::new(vec![]);
            let backend = StubBackend::answering(200);
            let (processor, _ledger) = build(&fetcher, &backend).await;

            let poller = spawn_reply_poller(&poll_every(Duration::MAX), processor).unwrap();
            sleep(Duration::from_millis(20)).await;
            assert_eq!(fetcher.fetches(), 1);

            poller.stop();
            poller.join().await;
        })
        .await
        .expect("test timed out");
    }

    #[tokio::test]
    async fn runs_immediately_then_on_interval() {
        timeout(TEST_TIMEOUT, async {
            let fetcher = StubFetcher::new(vec![reply("m1", "+1111", "stop")]);
            let backend = StubBackend::answering(200);
            let (processor, ledger) = build(&fetcher, &backend).await;

            let poller = spawn_reply_poller(&poll_every(Duration::from_millis(40)), processor)
                .unwrap();

            sleep(Duration::from_millis(20)).await;
            assert!(fetcher.fetches() >= 1);
            assert!(ledger.is_ledgered("m1").await.unwrap());

            sleep(Duration::from_millis(150)).await;
            assert!(fetcher.fetches() >= 3);
            // Repeated polls never repeat the opt-out.
            assert_eq!(backend.calls().len(), 1);

            poller.stop();
            poller.join().await;
        })
        .await
        .expect("test timed out");
    }

    #[tokio::test]
    async fn stop_cancels_future_ticks() {
        timeout(TEST_TIMEOUT, async {
            let fetcher = StubFetcher::new(vec![]);
            let backend = StubBackend::answering(200);
            let (processor, _ledger) = build(&fetcher, &backend).await;

            let poller = spawn_reply_poller(&poll_every(Duration::from_millis(30)), processor)
                .unwrap();
            sleep(Duration::from_millis(10)).await;

            poller.stop();
            poller.join().await;
            let after_stop = fetcher.fetches();

            sleep(Duration::from_millis(100)).await;
            assert_eq!(fetcher.fetches(), after_stop);
        })
        .await
        .expect("test timed out");
    }

    #[tokio::test]
    async fn stop_lets_in_flight_run_finish() {
        timeout(TEST_TIMEOUT, async {
            let fetcher = StubFetcher::new(vec![reply("m1", "+1111", "stop")]);
            let backend = StubBackend::slow(200, Duration::from_millis(200));
            let (processor, ledger) = build(&fetcher, &backend).await;

            let poller = spawn_reply_poller(&poll_every(Duration::from_secs(60)), processor)
                .unwrap();

            // The first run is now blocked inside the backend call.
            sleep(Duration::from_millis(50)).await;
            assert_eq!(backend.calls().len(), 1);
            assert!(!ledger.is_ledgered("m1").await.unwrap());

            poller.stop();
            poller.join().await;

            assert!(ledger.is_ledgered("m1").await.unwrap());
        })
        .await
        .expect("test timed out");
    }

    #[tokio::test]
    async fn failing_runs_do_not_stop_polling() {
        timeout(TEST_TIMEOUT, async {
            let fetcher = StubFetcher::failing();
            let backend = StubBackend::answering(200);
            let (processor, _ledger) = build(&fetcher, &backend).await;

            let poller = spawn_reply_poller(&poll_every(Duration::from_millis(30)), processor)
                .unwrap();
            sleep(Duration::from_millis(120)).await;

            assert!(fetcher.fetches() >= 2);

            poller.stop();
            poller.join().await;
        })
        .await
        .expect("test timed out");
    }
}

//! Termination detection
//!
//! Independent probes are polled on a fixed interval. The first probe that
//! reports the meeting as over raises the one termination signal; every
//! later result is ignored.

mod probes;

use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, Instrument};

pub use probes::{KickedProbe, ParticipantCountProbe};

use crate::session::StopReason;

/// A polling detector for "the meeting is over"
#[async_trait::async_trait]
pub trait TerminationProbe: Send + Sync {
    /// Probe name for logging
    fn name(&self) -> &str;

    /// Stop reason reported when this probe fires
    fn reason(&self) -> StopReason;

    /// Whether the meeting is over for the bot
    async fn check(&self) -> Result<bool>;
}

/// The single termination signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationSignal {
    pub probe: String,
    pub reason: StopReason,
}

/// Watcher lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Polling,
    Signaled,
    Cancelled,
}

struct Shared {
    state: WatcherState,
    signal_tx: Option<oneshot::Sender<TerminationSignal>>,
}

/// Polls termination probes and raises one signal
pub struct TerminationWatcher {
    probes: Vec<Arc<dyn TerminationProbe>>,
    interval: Duration,
    shared: Arc<Mutex<Shared>>,
    tasks: Vec<JoinHandle<()>>,
}

impl TerminationWatcher {
    pub fn new(probes: Vec<Arc<dyn TerminationProbe>>, interval: Duration) -> Self {
        Self {
            probes,
            interval,
            shared: Arc::new(Mutex::new(Shared {
                state: WatcherState::Idle,
                signal_tx: None,
            })),
            tasks: Vec::new(),
        }
    }

    pub fn state(&self) -> WatcherState {
        lock(&self.shared).state
    }

    /// Begin polling every probe
    ///
    /// The returned receiver resolves with the first signal, or errors if
    /// the watcher is stopped first. Calling `start` on a watcher that is
    /// not idle returns an already-closed receiver.
    pub fn start(&mut self) -> oneshot::Receiver<TerminationSignal> {
        let (tx, rx) = oneshot::channel();

        {
            let mut shared = lock(&self.shared);
            if shared.state != WatcherState::Idle {
                return rx;
            }
            shared.state = WatcherState::Polling;
            shared.signal_tx = Some(tx);
        }

        info!(
            "Termination watcher polling {} probes every {}ms",
            self.probes.len(),
            self.interval.as_millis()
        );

        for probe in &self.probes {
            let probe = Arc::clone(probe);
            let shared = Arc::clone(&self.shared);
            let period = self.interval;

            let task = tokio::spawn(
                async move {
                    let mut ticker = interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                    loop {
                        ticker.tick().await;

                        if lock(&shared).state != WatcherState::Polling {
                            break;
                        }

                        match probe.check().await {
                            Ok(true) => {
                                raise(&shared, probe.as_ref());
                                break;
                            }
                            Ok(false) => {}
                            Err(e) => debug!("Probe {} failed: {}", probe.name(), e),
                        }
                    }
                }
                .in_current_span(),
            );

            self.tasks.push(task);
        }

        rx
    }

    /// Cancel every probe
    pub async fn stop(&mut self) {
        {
            let mut shared = lock(&self.shared);
            if shared.state != WatcherState::Signaled {
                shared.state = WatcherState::Cancelled;
            }
            shared.signal_tx = None;
        }

        for task in &self.tasks {
            task.abort();
        }
        // Cancelled tasks report a JoinError, which is expected here
        futures::future::join_all(self.tasks.drain(..)).await;

        debug!("Termination watcher stopped");
    }
}

fn raise(shared: &Mutex<Shared>, probe: &dyn TerminationProbe) {
    let mut shared = lock(shared);
    if shared.state != WatcherState::Polling {
        return;
    }
    shared.state = WatcherState::Signaled;

    info!("Probe {} detected the end of the meeting", probe.name());

    if let Some(tx) = shared.signal_tx.take() {
        let _ = tx.send(TerminationSignal {
            probe: probe.name().to_string(),
            reason: probe.reason(),
        });
    }
}

fn lock(shared: &Mutex<Shared>) -> std::sync::MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

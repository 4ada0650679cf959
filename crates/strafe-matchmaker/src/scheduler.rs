//! Background queue driver
//!
//! Owns a [`MatchQueue`] behind a mutex and ticks it from a spawned tokio
//! task at a fixed cadence. Formed matches and timeouts stream out on an
//! event channel; enqueue and cancel go straight through the handle under
//! the same lock, so every mutation sees a consistent pool.
//!
//! Time comes from an injected [`Clock`], which keeps the queue logic
//! deterministic under test while the tick cadence stays on tokio time.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use strafe_core::{Clock, StrafeResult, TicketId};

use crate::participant::Participant;
use crate::queue::{Match, MatchQueue, QueueConfig, QueueStats, QueueTimeout};

/// Driver tunables.
#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    /// Cadence of queue evaluation passes.
    pub tick_interval: Duration,
    pub queue: QueueConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            tick_interval: Duration::from_secs(1),
            queue: QueueConfig::default(),
        }
    }
}

/// What the queue resolved an entry into.
#[derive(Clone, Debug)]
pub enum QueueEvent {
    MatchFound(Match),
    TimedOut(QueueTimeout),
}

/// Receiving end of the queue event stream.
pub type EventReceiver = mpsc::UnboundedReceiver<QueueEvent>;

/// Front door to a queue driven by a background tick task.
pub struct MatchmakerHandle {
    queue: Arc<Mutex<MatchQueue>>,
    clock: Arc<dyn Clock>,
    worker: JoinHandle<()>,
}

impl MatchmakerHandle {
    /// Spawn the tick task on the current tokio runtime.
    pub fn spawn(config: SchedulerConfig, clock: Arc<dyn Clock>) -> (Self, EventReceiver) {
        let queue = Arc::new(Mutex::new(MatchQueue::new(config.queue)));
        let (events, events_rx) = mpsc::unbounded_channel();

        let worker_queue = Arc::clone(&queue);
        let worker_clock = Arc::clone(&clock);
        let worker = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.tick_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let outcome = {
                    let mut queue = worker_queue.lock();
                    queue.tick(worker_clock.now())
                };
                for m in outcome.matches {
                    if events.send(QueueEvent::MatchFound(m)).is_err() {
                        debug!("event receiver dropped, stopping queue driver");
                        return;
                    }
                }
                for t in outcome.timeouts {
                    if events.send(QueueEvent::TimedOut(t)).is_err() {
                        debug!("event receiver dropped, stopping queue driver");
                        return;
                    }
                }
            }
        });

        info!(
            tick_ms = config.tick_interval.as_millis() as u64,
            "matchmaker started"
        );
        (
            MatchmakerHandle {
                queue,
                clock,
                worker,
            },
            events_rx,
        )
    }

    /// Add a participant, stamped with the injected clock.
    pub fn enqueue(&self, participant: Participant) -> StrafeResult<TicketId> {
        self.queue.lock().enqueue(participant, self.clock.now())
    }

    pub fn cancel(&self, ticket: TicketId) -> StrafeResult<()> {
        self.queue.lock().cancel(ticket)
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.lock().stats()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Stop the tick task. Entries still waiting are dropped with the queue.
    pub fn shutdown(self) {
        self.worker.abort();
        info!("matchmaker stopped");
    }
}

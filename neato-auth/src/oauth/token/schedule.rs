//! One-shot, re-armable refresh timer whose lifetime is tied to its owner.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Armed {
    at: Instant,
    generation: u64,
}

/// A single pending deadline plus the background task waiting for it.
///
/// Arming replaces the previous deadline, clearing removes it, and every
/// change bumps a generation counter so a callback can tell whether the
/// deadline it was fired for is still the current one. Once the
/// cancellation token fires (explicit shutdown or the owner's drop guard),
/// the task exits and further arming is ignored.
pub struct RefreshSchedule {
    armed: watch::Sender<Option<Armed>>,
    generation: AtomicU64,
    cancel: CancellationToken,
}

impl RefreshSchedule {
    /// Create a schedule and spawn its timer task. Must be called inside a Tokio runtime.
    ///
    /// `on_fire` receives the generation of the deadline that elapsed and
    /// returns the work to run, or `None` when the owner is gone, which ends
    /// the task.
    pub fn spawn<F, Fut>(cancel: CancellationToken, on_fire: F) -> Self
    where
        F: Fn(u64) -> Option<Fut> + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (armed, receiver) = watch::channel(None);
        tokio::spawn(run(receiver, cancel.clone(), on_fire));
        Self {
            armed,
            generation: AtomicU64::new(0),
            cancel,
        }
    }

    /// Arm the timer to fire once after `delay`, replacing any pending deadline.
    /// Returns the new generation, or `None` if the schedule was cancelled.
    pub fn arm(&self, delay: Duration) -> Option<u64> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.armed.send_replace(Some(Armed {
            at: deadline_after(delay),
            generation,
        }));
        Some(generation)
    }

    /// Drop the pending deadline, if any.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.armed.send_replace(None);
    }

    /// Stop the timer task for good.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.clear();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether `generation` still identifies the pending deadline.
    pub fn is_current(&self, generation: u64) -> bool {
        !self.cancel.is_cancelled() && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Time left until the pending deadline, if one is armed.
    pub fn remaining(&self) -> Option<Duration> {
        self.armed
            .borrow()
            .map(|armed| armed.at.saturating_duration_since(Instant::now()))
    }
}

/// Deadlines too far out for the clock are pushed to roughly thirty years.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

async fn run<F, Fut>(
    mut receiver: watch::Receiver<Option<Armed>>,
    cancel: CancellationToken,
    on_fire: F,
) where
    F: Fn(u64) -> Option<Fut>,
    Fut: Future<Output = ()>,
{
    let mut last_fired: Option<u64> = None;

    loop {
        let armed = (*receiver.borrow_and_update()).filter(|a| Some(a.generation) != last_fired);

        let elapsed = async move {
            match armed {
                Some(armed) => {
                    tokio::time::sleep_until(armed.at).await;
                    armed.generation
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = receiver.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            generation = elapsed => {
                last_fired = Some(generation);
                match on_fire(generation) {
                    Some(work) => work.await,
                    None => break,
                }
            }
        }
    }

    debug!("Refresh timer task stopped");
}

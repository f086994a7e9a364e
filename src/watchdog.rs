//! ==============================================================================
//! watchdog.rs - single-deadline idle timer
//! ==============================================================================
//!
//! purpose:
//!     holds at most one pending deadline. arming always cancels the previous
//!     deadline before scheduling the new one, so timers never stack.
//!
//! firing:
//!     the timer task hands its generation to the callback. the owner calls
//!     `claim(generation)` before acting on it; a timer that was superseded
//!     between firing and being handled fails the claim and is ignored.
//!
//! relationships:
//!     - owned by: controller.rs (inside the controller state lock)
//!
//! ==============================================================================

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

struct Pending {
    handle: JoinHandle<()>,
    deadline: Instant,
}

#[derive(Default)]
pub struct Watchdog {
    generation: u64,
    pending: Option<Pending>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// cancel any pending deadline and schedule `on_fire` after `delay`
    ///
    /// must be called from inside a tokio runtime. returns the generation
    /// the callback will receive.
    pub fn arm<F>(&mut self, delay: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();

        self.generation += 1;
        let generation = self.generation;
        let deadline = Instant::now() + delay;

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_fire(generation);
        });

        self.pending = Some(Pending { handle, deadline });
        generation
    }

    /// drop the pending deadline, if any; returns whether one was pending
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    /// accept a fired timer if it is still the current one
    pub fn claim(&mut self, generation: u64) -> bool {
        if self.generation == generation && self.pending.is_some() {
            // the firing task is finishing on its own; detach instead of abort
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("generation", &self.generation)
            .field("deadline", &self.deadline())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Fired = Arc<Mutex<Vec<u64>>>;

    fn recorder(fired: &Fired) -> impl FnOnce(u64) + Send + 'static {
        let fired = fired.clone();
        move |generation| fired.lock().unwrap().push(generation)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let fired = Fired::default();
        let mut dog = Watchdog::new();
        let generation = dog.arm(Duration::from_secs(15), recorder(&fired));

        tokio::time::sleep(Duration::from_secs(14)).await;
        assert!(fired.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*fired.lock().unwrap(), vec![generation]);
        assert!(dog.claim(generation));
        assert_eq!(dog.deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_previous_deadline() {
        let fired = Fired::default();
        let mut dog = Watchdog::new();
        let first = dog.arm(Duration::from_secs(5), recorder(&fired));
        let second = dog.arm(Duration::from_secs(20), recorder(&fired));
        assert_ne!(first, second);
        assert_eq!(dog.deadline(), Some(Instant::now() + Duration::from_secs(20)));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(fired.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(*fired.lock().unwrap(), vec![second]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let fired = Fired::default();
        let mut dog = Watchdog::new();
        dog.arm(Duration::from_secs(10), recorder(&fired));
        assert!(dog.cancel());
        assert!(!dog.cancel());
        assert_eq!(dog.deadline(), None);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(fired.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_generation_cannot_claim() {
        let mut dog = Watchdog::new();
        let old = dog.arm(Duration::from_secs(1), |_| {});
        let current = dog.arm(Duration::from_secs(1), |_| {});

        assert!(!dog.claim(old));
        assert!(dog.deadline().is_some());
        assert!(dog.claim(current));
        assert!(!dog.claim(current));
    }
}

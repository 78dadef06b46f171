use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Widest spacing between two request starts, whatever asked for it.
pub const MAX_SPACING: Duration = Duration::from_secs(60);

/// Longest cool-down a single 429 can impose.
pub const MAX_COOL_DOWN: Duration = Duration::from_secs(24 * 3600);

/// Spaces out request starts and applies the cool-down requested by a 429 response.
///
/// Every request, listing or artifact, goes through [`Pacer::wait`] so that the spacing holds
/// across the whole worker pool rather than per task.
#[derive(Debug, Clone)]
pub struct Pacer {
    state: Arc<Mutex<PacerState>>,
}

#[derive(Debug)]
struct PacerState {
    spacing: Duration,
    next_slot: Instant,
    cool_until: Option<Instant>,
}

impl Pacer {
    pub fn new(spacing: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(PacerState {
                spacing: spacing.min(MAX_SPACING),
                next_slot: Instant::now(),
                cool_until: None,
            })),
        }
    }

    /// Widens the spacing between request starts, never narrows it.
    pub fn at_least(&self, spacing: Duration) {
        let spacing = spacing.min(MAX_SPACING);
        let mut state = self.lock();
        if spacing > state.spacing {
            state.spacing = spacing;
        }
    }

    pub fn spacing(&self) -> Duration {
        self.lock().spacing
    }

    /// Pushes every request started from now on to at least `delay` in the future.
    pub fn cool_down(&self, delay: Duration) {
        let delay = delay.min(MAX_COOL_DOWN);
        let Some(until) = Instant::now().checked_add(delay) else {
            log::warn!("Ignoring unrepresentable cool-down of {delay:?}");
            return;
        };
        let mut state = self.lock();
        if state.cool_until.map_or(true, |c| c < until) {
            log::warn!("Throttled by remote, cooling down for {delay:?}");
            state.cool_until = Some(until);
        }
    }

    /// Resolves once the caller is allowed to start a request.
    pub async fn wait(&self) {
        let slot = {
            let mut state = self.lock();
            let mut at = Instant::now().max(state.next_slot);
            if let Some(cool_until) = state.cool_until {
                if cool_until > at {
                    at = cool_until;
                } else {
                    state.cool_until = None;
                }
            }
            state.next_slot = at.checked_add(state.spacing).unwrap_or(at);
            at
        };
        sleep_until(slot).await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PacerState> {
        // The state holds plain instants, a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

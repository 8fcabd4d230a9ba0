//! Display refresh pacing.
//!
//! Both loops run one iteration per display refresh. A [`Refresh`] yields those refresh ticks.
//! Ticks are never queued: a loop that is still busy when the next refresh happens simply misses
//! it, so a slow detector lowers the effective detection rate instead of falling behind.

use std::time::{Duration, Instant};

use crossbeam::{
    channel::{self, Receiver, Sender, TrySendError},
    select,
};

use crate::task::CancelToken;

/// A source of display refresh ticks.
pub struct Refresh {
    ticks: Receiver<Instant>,
}

impl Refresh {
    /// Creates a refresh source ticking `hz` times per second.
    ///
    /// # Panics
    ///
    /// This method panics if `hz` is 0.
    pub fn fixed_rate(hz: u32) -> Self {
        assert!(hz > 0, "refresh rate must be positive");
        Self {
            ticks: channel::tick(Duration::from_secs(1) / hz),
        }
    }

    /// Blocks until the next refresh.
    ///
    /// Returns `None` when `cancel` fires or when the refresh source is closed. Cancellation that
    /// was requested before the call is also reported as `None`.
    pub fn wait(&self, cancel: &CancelToken) -> Option<Instant> {
        if cancel.is_cancelled() {
            return None;
        }
        select! {
            recv(self.ticks) -> tick => tick.ok(),
            recv(cancel.receiver()) -> _ => None,
        }
    }
}

/// Creates a [`Refresh`] that is driven by calls to [`RefreshTrigger::trigger`].
///
/// This is meant for hosts that own the display event loop: they trigger a refresh whenever the
/// display asks for a new frame. Dropping the trigger closes the [`Refresh`].
pub fn manual() -> (RefreshTrigger, Refresh) {
    let (sender, ticks) = channel::bounded(1);
    (RefreshTrigger { sender }, Refresh { ticks })
}

/// The driving half of a manual [`Refresh`].
#[derive(Clone)]
pub struct RefreshTrigger {
    sender: Sender<Instant>,
}

impl RefreshTrigger {
    /// Signals a display refresh.
    ///
    /// Returns `false` if the previous refresh has not been picked up yet (this one is dropped),
    /// or if the [`Refresh`] no longer exists.
    pub fn trigger(&self) -> bool {
        match self.sender.try_send(Instant::now()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::trace!("refresh missed, loop still busy");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

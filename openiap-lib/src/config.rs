//! Engine configuration.

use std::time::Duration;

/// Tunables for the reconciliation engine.
///
/// The dedup window is an inherited constant whose correctness depends on
/// store notification timing, so it is a parameter rather than a hard-coded
/// value. Same for the expiring-soon horizon used by subscription views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a processed transaction id suppresses repeat notifications.
    pub dedup_window: Duration,
    /// How close to expiry a subscription is flagged `willExpireSoon`.
    pub expiring_soon: Duration,
}

impl EngineConfig {
    pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(5);
    pub const DEFAULT_EXPIRING_SOON: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    pub fn new() -> Self {
        Self {
            dedup_window: Self::DEFAULT_DEDUP_WINDOW,
            expiring_soon: Self::DEFAULT_EXPIRING_SOON,
        }
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn with_expiring_soon(mut self, horizon: Duration) -> Self {
        self.expiring_soon = horizon;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

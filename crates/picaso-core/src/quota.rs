//! Usage Quota
//!
//! Rolling, time-windowed count of generation attempts per profile.
//!
//! The window is reset lazily: every read first checks whether the stored
//! reset time has passed and, if so, starts a fresh window. There is no
//! background timer. State that cannot be read or decoded is treated as an
//! implicit reset so a damaged store never locks a user out.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::store::{KeyValueStore, StoreError, StoreResult};

/// Store key holding the JSON attempt log
pub const ATTEMPTS_KEY: &str = "picaso_generations";

/// Store key holding the window reset time (epoch ms, decimal string)
pub const RESET_KEY: &str = "picaso_limit_reset";

const HOUR_MS: i64 = 60 * 60 * 1000;
const MINUTE_MS: i64 = 60 * 1000;

/// Quota policy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuotaPolicy {
    /// Attempts allowed per window
    pub max_attempts: u32,

    /// Window length
    pub window: Duration,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl QuotaPolicy {
    /// Load from `PICASO_MAX_ATTEMPTS` and `PICASO_WINDOW_HOURS`, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_attempts = std::env::var("PICASO_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_attempts);
        let window = std::env::var("PICASO_WINDOW_HOURS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(defaults.window, |hours| Duration::from_secs(hours * 60 * 60));

        Self { max_attempts, window }
    }

    fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }
}

/// One recorded generation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub timestamp: i64,
    pub image_url: String,
    pub prompt: String,
}

/// Quota decision handed to the presentation layer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: i64,
}

impl QuotaStatus {
    /// Time left until the window resets, e.g. `"5h 12m"`, `"42m"` or `"Now"`
    pub fn time_until_reset(&self, now_ms: i64) -> String {
        let left = self.reset_at - now_ms;
        if left <= 0 {
            return "Now".into();
        }

        let hours = left / HOUR_MS;
        let minutes = (left % HOUR_MS) / MINUTE_MS;
        if hours > 0 {
            format!("{hours}h {minutes}m")
        } else {
            format!("{minutes}m")
        }
    }
}

/// Active window as read from the store
#[derive(Clone, Debug)]
struct QuotaWindow {
    attempts: Vec<AttemptRecord>,
    reset_at: i64,
}

/// Tracks generation attempts against a [`QuotaPolicy`]
pub struct QuotaTracker {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    policy: QuotaPolicy,
}

impl QuotaTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, policy: QuotaPolicy) -> Self {
        Self { store, clock, policy }
    }

    pub const fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    /// Current quota status, resetting an expired window first
    pub fn check_status(&self) -> QuotaStatus {
        let now = self.clock.now_ms();

        match self.load_window(now) {
            Ok(window) => self.status_of(&window),
            Err(e) => {
                tracing::warn!(error = %e, "Quota state unreadable, resetting");
                self.clear();
                QuotaStatus {
                    allowed: true,
                    remaining: self.policy.max_attempts,
                    reset_at: now + self.policy.window_ms(),
                }
            }
        }
    }

    /// Record a successful generation and return the recomputed status
    ///
    /// Call once per successful generation only. When the window is already
    /// full the attempt is not appended.
    pub fn record_attempt(&self, image_url: &str, prompt: &str) -> QuotaStatus {
        let now = self.clock.now_ms();

        let window = match self.load_window(now) {
            Ok(window) => Ok(window),
            Err(e) => {
                tracing::warn!(error = %e, "Quota state unreadable while recording, starting new window");
                self.clear();
                self.start_window(now)
            }
        };

        match window {
            Ok(mut window) => {
                if window.attempts.len() >= self.policy.max_attempts as usize {
                    tracing::warn!(
                        max_attempts = self.policy.max_attempts,
                        "Quota exhausted, attempt not recorded"
                    );
                } else {
                    window.attempts.push(AttemptRecord {
                        timestamp: now,
                        image_url: image_url.to_string(),
                        prompt: prompt.to_string(),
                    });
                    if let Err(e) = self.save_attempts(&window.attempts) {
                        tracing::warn!(error = %e, "Failed to persist quota attempt");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to record quota attempt"),
        }

        self.check_status()
    }

    /// Attempts recorded in the current window
    pub fn attempts(&self) -> Vec<AttemptRecord> {
        self.load_window(self.clock.now_ms())
            .map(|w| w.attempts)
            .unwrap_or_default()
    }

    fn status_of(&self, window: &QuotaWindow) -> QuotaStatus {
        let used = u32::try_from(window.attempts.len()).unwrap_or(u32::MAX);
        let remaining = self.policy.max_attempts.saturating_sub(used);
        QuotaStatus {
            allowed: remaining > 0,
            remaining,
            reset_at: window.reset_at,
        }
    }

    fn load_window(&self, now: i64) -> StoreResult<QuotaWindow> {
        let Some(raw_reset) = self.store.get(RESET_KEY)? else {
            return self.start_window(now);
        };

        let reset_at = raw_reset.trim().parse::<i64>().map_err(|e| StoreError::Corrupt {
            key: RESET_KEY.into(),
            reason: e.to_string(),
        })?;

        if now >= reset_at {
            tracing::debug!(reset_at, now, "Quota window expired");
            return self.start_window(now);
        }

        let attempts = match self.store.get(ATTEMPTS_KEY)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
                key: ATTEMPTS_KEY.into(),
                reason: e.to_string(),
            })?,
            None => Vec::new(),
        };

        Ok(QuotaWindow { attempts, reset_at })
    }

    fn start_window(&self, now: i64) -> StoreResult<QuotaWindow> {
        let reset_at = now + self.policy.window_ms();
        self.save_attempts(&[])?;
        self.store.set(RESET_KEY, &reset_at.to_string())?;

        Ok(QuotaWindow {
            attempts: Vec::new(),
            reset_at,
        })
    }

    fn save_attempts(&self, attempts: &[AttemptRecord]) -> StoreResult<()> {
        let encoded = serde_json::to_string(attempts).map_err(|e| StoreError::Corrupt {
            key: ATTEMPTS_KEY.into(),
            reason: e.to_string(),
        })?;
        self.store.set(ATTEMPTS_KEY, &encoded)
    }

    fn clear(&self) {
        for key in [ATTEMPTS_KEY, RESET_KEY] {
            if let Err(e) = self.store.delete(key) {
                tracing::warn!(key, error = %e, "Failed to clear quota state");
            }
        }
    }
}

// logmask-core/src/limiter.rs
//! Sliding-window admission control keyed by string.
//!
//! Each key owns a [`RateWindow`] holding the instants of its admitted events.
//! A key admits up to `max_events + burst_allowance` events in any trailing
//! window of `window_seconds`. Stale windows are swept lazily on access once
//! every `cleanup_interval_seconds`, so memory stays bounded regardless of
//! key cardinality.
//!
//! License: MIT OR APACHE 2.0

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::errors::MaskingError;

pub const MAX_EVENTS_LIMIT: u32 = 1_000_000;
pub const MAX_WINDOW_SECONDS: u64 = 86_400;
pub const MAX_KEY_LENGTH: usize = 250;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_events: u32,
    pub window_seconds: u64,
    pub burst_allowance: u32,
    pub cleanup_interval_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_events: 100,
            window_seconds: 60,
            burst_allowance: 0,
            cleanup_interval_seconds: 300,
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_events: u32, window_seconds: u64) -> Self {
        Self {
            max_events,
            window_seconds,
            ..Self::default()
        }
    }

    pub fn with_burst(mut self, burst_allowance: u32) -> Self {
        self.burst_allowance = burst_allowance;
        self
    }

    pub fn validate(&self) -> Result<(), MaskingError> {
        if self.max_events == 0 || self.max_events > MAX_EVENTS_LIMIT {
            return Err(MaskingError::InvalidRateLimitConfig(format!(
                "max_events must be between 1 and {}, got {}",
                MAX_EVENTS_LIMIT, self.max_events
            )));
        }
        if self.window_seconds == 0 || self.window_seconds > MAX_WINDOW_SECONDS {
            return Err(MaskingError::InvalidRateLimitConfig(format!(
                "window_seconds must be between 1 and {}, got {}",
                MAX_WINDOW_SECONDS, self.window_seconds
            )));
        }
        if self.burst_allowance > self.max_events {
            return Err(MaskingError::InvalidRateLimitConfig(format!(
                "burst_allowance ({}) cannot exceed max_events ({})",
                self.burst_allowance, self.max_events
            )));
        }
        if self.cleanup_interval_seconds == 0 {
            return Err(MaskingError::InvalidRateLimitConfig(
                "cleanup_interval_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn capacity(&self) -> usize {
        (self.max_events as usize).saturating_add(self.burst_allowance as usize)
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// The admitted-event history of one key.
#[derive(Debug)]
struct RateWindow {
    timestamps: VecDeque<Instant>,
    window_start: Instant,
}

impl RateWindow {
    fn new(now: Instant) -> Self {
        Self {
            timestamps: VecDeque::new(),
            window_start: now,
        }
    }

    fn evict(&mut self, now: Instant, window: Duration) {
        while self
            .timestamps
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= window)
        {
            self.timestamps.pop_front();
        }
        if let Some(&oldest) = self.timestamps.front() {
            self.window_start = oldest;
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: RwLock<HashMap<String, Arc<Mutex<RateWindow>>>>,
    last_cleanup: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Result<Self, MaskingError> {
        config.validate()?;
        Ok(Self {
            config,
            windows: RwLock::new(HashMap::new()),
            last_cleanup: Mutex::new(Instant::now()),
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Records an event for `key` if the window has room.
    pub fn is_allowed(&self, key: &str) -> Result<bool, MaskingError> {
        self.is_allowed_at(key, Instant::now())
    }

    /// Like [`Self::is_allowed`], but reports a denial as `RateLimitExceeded`.
    pub fn check(&self, key: &str) -> Result<(), MaskingError> {
        let now = Instant::now();
        if self.is_allowed_at(key, now)? {
            Ok(())
        } else {
            Err(MaskingError::RateLimitExceeded {
                key: key.to_string(),
                retry_after: self.time_until_reset_at(key, now)?,
            })
        }
    }

    /// Events `key` may still emit in the current window.
    pub fn remaining(&self, key: &str) -> Result<usize, MaskingError> {
        self.remaining_at(key, Instant::now())
    }

    /// Time until the oldest admitted event of `key` leaves the window.
    /// Zero when the key has room.
    pub fn time_until_reset(&self, key: &str) -> Result<Duration, MaskingError> {
        self.time_until_reset_at(key, Instant::now())
    }

    /// Forgets the history of `key`.
    pub fn reset(&self, key: &str) -> Result<(), MaskingError> {
        validate_key(key)?;
        self.windows.write().unwrap_or_else(PoisonError::into_inner).remove(key);
        Ok(())
    }

    pub fn clear(&self) {
        self.windows.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub(crate) fn is_allowed_at(&self, key: &str, now: Instant) -> Result<bool, MaskingError> {
        validate_key(key)?;
        self.maybe_sweep(now);
        let window = self.window_for(key, now);
        let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);
        window.evict(now, self.config.window());
        if window.timestamps.len() < self.config.capacity() {
            if window.timestamps.is_empty() {
                window.window_start = now;
            }
            window.timestamps.push_back(now);
            Ok(true)
        } else {
            trace!("Rate limit reached for key '{}'.", key);
            Ok(false)
        }
    }

    pub(crate) fn remaining_at(&self, key: &str, now: Instant) -> Result<usize, MaskingError> {
        validate_key(key)?;
        let Some(window) = self.existing(key) else {
            return Ok(self.config.capacity());
        };
        let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);
        window.evict(now, self.config.window());
        Ok(self.config.capacity().saturating_sub(window.timestamps.len()))
    }

    pub(crate) fn time_until_reset_at(&self, key: &str, now: Instant) -> Result<Duration, MaskingError> {
        validate_key(key)?;
        let Some(window) = self.existing(key) else {
            return Ok(Duration::ZERO);
        };
        let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);
        window.evict(now, self.config.window());
        if window.timestamps.len() < self.config.capacity() {
            return Ok(Duration::ZERO);
        }
        Ok(match window.timestamps.front() {
            Some(&oldest) => self.config.window().saturating_sub(now.saturating_duration_since(oldest)),
            None => Duration::ZERO,
        })
    }

    fn existing(&self, key: &str) -> Option<Arc<Mutex<RateWindow>>> {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn window_for(&self, key: &str, now: Instant) -> Arc<Mutex<RateWindow>> {
        if let Some(window) = self.existing(key) {
            return window;
        }
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            windows
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(RateWindow::new(now)))),
        )
    }

    fn maybe_sweep(&self, now: Instant) {
        let interval = Duration::from_secs(self.config.cleanup_interval_seconds);
        {
            let mut last = self.last_cleanup.lock().unwrap_or_else(PoisonError::into_inner);
            if now.saturating_duration_since(*last) < interval {
                return;
            }
            *last = now;
        }
        let stale_after = interval.max(self.config.window());
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, window| {
            let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);
            window.evict(now, self.config.window());
            !window.timestamps.is_empty() || now.saturating_duration_since(window.window_start) < stale_after
        });
        let evicted = before - windows.len();
        if evicted > 0 {
            debug!("Rate limiter swept {} stale window(s).", evicted);
        }
    }
}

fn validate_key(key: &str) -> Result<(), MaskingError> {
    if key.is_empty() {
        return Err(MaskingError::InvalidRateLimitConfig("rate limit key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(MaskingError::InvalidRateLimitConfig(format!(
            "rate limit key exceeds {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if key.chars().any(char::is_control) {
        return Err(MaskingError::InvalidRateLimitConfig(
            "rate limit key contains control characters".to_string(),
        ));
    }
    Ok(())
}

//! Room lifecycle configuration.

use std::env;

/// Lifecycle configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Rooms without financial activity for this long are auto-settled
    pub inactivity_threshold: chrono::Duration,

    /// How often the inactivity watcher sweeps active rooms
    pub check_period: std::time::Duration,

    /// Attempts at drawing an unused room code
    pub code_attempts: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold: chrono::Duration::hours(12),
            check_period: std::time::Duration::from_secs(3600),
            code_attempts: 10,
        }
    }
}

impl LifecycleConfig {
    /// Create configuration from environment variables
    ///
    /// - `ROOM_INACTIVITY_HOURS` (default: 12)
    /// - `ROOM_INACTIVITY_CHECK_SECS` (default: 3600)
    /// - `ROOM_CODE_ATTEMPTS` (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let threshold = env::var("ROOM_INACTIVITY_HOURS").ok().and_then(|v| {
            let parsed = v
                .parse::<i64>()
                .ok()
                .filter(|h| *h > 0)
                .and_then(chrono::Duration::try_hours);
            if parsed.is_none() {
                log::warn!("Ignoring invalid ROOM_INACTIVITY_HOURS={:?}, using default", v);
            }
            parsed
        });
        let check_secs = env::var("ROOM_INACTIVITY_CHECK_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|s| *s > 0);
        let attempts = env::var("ROOM_CODE_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|a| *a > 0);

        Self {
            inactivity_threshold: threshold.unwrap_or(defaults.inactivity_threshold),
            check_period: check_secs
                .map(std::time::Duration::from_secs)
                .unwrap_or(defaults.check_period),
            code_attempts: attempts.unwrap_or(defaults.code_attempts),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.inactivity_threshold <= chrono::Duration::zero() {
            return Err("Inactivity threshold must be positive".to_string());
        }

        if self.check_period.is_zero() {
            return Err("Inactivity check period must be positive".to_string());
        }

        let threshold = self.inactivity_threshold.to_std().unwrap_or_default();
        if self.check_period >= threshold {
            return Err("Inactivity check period must be shorter than the threshold".to_string());
        }

        if self.code_attempts == 0 {
            return Err("Room code attempts must be at least 1".to_string());
        }

        Ok(())
    }
}

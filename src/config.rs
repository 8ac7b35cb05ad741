use std::time::Duration;

use crate::geo::DEFAULT_APPROX_DECIMALS;
use crate::location::WatchOptions;
use crate::PinsError;

/// Connection settings for the hosted backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Project base URL, e.g. `https://xyzcompany.example.co`.
    pub url: String,
    /// Public anonymous API key. Sent as `apikey` on every request.
    pub anon_key: String,
    /// Access token of the signed-in member, if any.
    pub session_token: Option<String>,
}

impl BackendConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        BackendConfig {
            url: url.into(),
            anon_key: anon_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Reads `BACKEND_URL`, `BACKEND_ANON_KEY` and the optional `BACKEND_SESSION_TOKEN`.
    pub fn from_env() -> Result<Self, PinsError> {
        let url = std::env::var("BACKEND_URL")
            .map_err(|_| PinsError::InvalidInput("BACKEND_URL is not set".to_string()))?;
        let anon_key = std::env::var("BACKEND_ANON_KEY")
            .map_err(|_| PinsError::InvalidInput("BACKEND_ANON_KEY is not set".to_string()))?;
        let session_token = std::env::var("BACKEND_SESSION_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
        Ok(BackendConfig {
            url,
            anon_key,
            session_token,
        })
    }
}

/// Policy values for [`DeviceLocationTracker`](crate::location::DeviceLocationTracker).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// Fractional digits kept in the approximate coordinate.
    pub approx_decimals: u32,
    pub high_accuracy: bool,
    /// Oldest cached fix the platform may hand back.
    pub maximum_age: Duration,
    /// How long the platform may take to acquire a fix.
    pub timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            approx_decimals: DEFAULT_APPROX_DECIMALS,
            high_accuracy: true,
            maximum_age: Duration::from_secs(60),
            timeout: Duration::from_secs(10),
        }
    }
}

impl TrackerConfig {
    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            enable_high_accuracy: self.high_accuracy,
            maximum_age: self.maximum_age,
            timeout: self.timeout,
        }
    }
}

/// Which response a pin feed keeps when refreshes overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseOrdering {
    /// Only the response to the most recently issued request is applied.
    #[default]
    LatestRequest,
    /// Whichever response settles last is applied, even if it answers an older request.
    LatestResolution,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedConfig {
    pub default_radius_km: f64,
    pub default_limit: u32,
    pub ordering: ResponseOrdering,
    /// Capacity of the notice broadcast channel.
    pub notice_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            default_radius_km: 50.0,
            default_limit: 200,
            ordering: ResponseOrdering::LatestRequest,
            notice_capacity: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_defaults_match_policy() {
        let cfg = TrackerConfig::default();
        assert_eq!(cfg.approx_decimals, 2);
        let opts = cfg.watch_options();
        assert!(opts.enable_high_accuracy);
        assert_eq!(opts.maximum_age, Duration::from_secs(60));
        assert_eq!(opts.timeout, Duration::from_secs(10));
    }

    #[test]
    fn feed_defaults_guard_against_stale_responses() {
        assert_eq!(FeedConfig::default().ordering, ResponseOrdering::LatestRequest);
    }
}

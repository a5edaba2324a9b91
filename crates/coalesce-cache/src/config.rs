use std::time::Duration;

use serde::Deserialize;

/// Freshness windows and the per-request time budget.
///
/// All fields deserialize from humantime strings (`"150ms"`, `"2h"`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Age after which a cached result is considered stale.
    ///
    /// Stale results are still returned to readers, but reading one triggers
    /// a background refresh. An age of exactly `refresh_after` still counts
    /// as fresh.
    #[serde(with = "humantime_serde")]
    pub refresh_after: Duration,
    /// Age after which a cached result must no longer be returned.
    ///
    /// Readers finding an expired result block on a fresh load, exactly as
    /// if the entry were empty.
    #[serde(with = "humantime_serde")]
    pub expire_after: Duration,
    /// Maximum time a single [`get`](crate::LoadingCache::get) may wait
    /// before failing with [`CacheError::Timeout`](crate::CacheError).
    ///
    /// The timeout is per caller; it never cancels the underlying load.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            refresh_after: Duration::from_secs(60),
            expire_after: Duration::from_secs(600),
            timeout: Duration::from_secs(30),
        }
    }
}

impl CacheConfig {
    /// Enforces `refresh_after <= expire_after`.
    ///
    /// An expiry shorter than the refresh window would make every stale
    /// result unusable, so the expiry is raised to the refresh window
    /// instead of rejecting the configuration.
    pub(crate) fn sanitize(mut self) -> Self {
        if self.expire_after < self.refresh_after {
            tracing::warn!(
                refresh_after = ?self.refresh_after,
                expire_after = ?self.expire_after,
                "expire_after is shorter than refresh_after, raising it"
            );
            self.expire_after = self.refresh_after;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    #[test]
    fn deserializes_humantime_durations() -> Result<()> {
        let yaml = r#"
            refresh_after: 150ms
            expire_after: 2h
            timeout: 30s
        "#;
        let config: CacheConfig = serde_yaml::from_str(yaml)?;

        assert_eq!(config.refresh_after, Duration::from_millis(150));
        assert_eq!(config.expire_after, Duration::from_secs(2 * 3600));
        assert_eq!(config.timeout, Duration::from_secs(30));

        Ok(())
    }

    #[test]
    fn missing_fields_use_defaults() -> Result<()> {
        let config: CacheConfig = serde_yaml::from_str("timeout: 5s")?;

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.refresh_after, CacheConfig::default().refresh_after);
        assert_eq!(config.expire_after, CacheConfig::default().expire_after);

        Ok(())
    }

    #[test]
    fn sanitize_raises_short_expiry() {
        let config = CacheConfig {
            refresh_after: Duration::from_secs(120),
            expire_after: Duration::from_secs(30),
            ..Default::default()
        }
        .sanitize();

        assert_eq!(config.expire_after, Duration::from_secs(120));
    }
}

use std::time::Duration;

/// Client socket configuration.
///
/// Defaults match the gateway's production settings; tests shrink the
/// timings through the builder-style setters.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway socket endpoint (e.g. `ws://localhost:5000/socket`).
    pub url: String,
    /// Automatic reconnect attempts before the manager gives up and enters `failed`.
    pub max_reconnect_attempts: u32,
    /// Fixed delay before reconnecting after an established link drops.
    pub reconnect_delay: Duration,
    /// First backoff step after a failed connection attempt.
    pub backoff_base: Duration,
    /// Upper bound for the exponential backoff.
    pub backoff_ceiling: Duration,
    /// A connection attempt that has not completed in this window is a transport error.
    pub connect_timeout: Duration,
    /// How often a `heartbeat` is sent on an idle link.
    pub heartbeat_interval: Duration,
    /// Silence longer than this marks the link as stale.
    pub heartbeat_timeout: Duration,
    /// Notifications for the same entity inside this window are dropped.
    pub dedup_window: Duration,
    /// Capacity of the processed notification id cache.
    pub processed_cache_capacity: usize,
    /// Capacity of the per-entity last-seen table.
    pub entity_cache_capacity: usize,
    /// How long `connecting` may last before the status banner shows it.
    pub banner_grace: Duration,
    /// Most notifications the inbox keeps; older ones fall off the end.
    pub inbox_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:5000/socket".to_string(),
            max_reconnect_attempts: 30,
            reconnect_delay: Duration::from_secs(1),
            backoff_base: Duration::from_secs(1),
            backoff_ceiling: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(20),
            heartbeat_interval: Duration::from_secs(25),
            heartbeat_timeout: Duration::from_secs(30),
            dedup_window: Duration::from_secs(2),
            processed_cache_capacity: 100,
            entity_cache_capacity: 100,
            banner_grace: Duration::from_secs(3),
            inbox_capacity: 100,
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn backoff(mut self, base: Duration, ceiling: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_ceiling = ceiling;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    /// Backoff delay before retry number `attempt` (zero-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_ceiling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_ceiling() {
        let config = ClientConfig::default()
            .backoff(Duration::from_millis(100), Duration::from_millis(1000));
        assert_eq!(config.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(config.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(800));
        assert_eq!(config.backoff_delay(4), Duration::from_millis(1000));
        assert_eq!(config.backoff_delay(29), Duration::from_millis(1000));
    }

    #[test]
    fn defaults_cap_attempts_at_thirty() {
        let config = ClientConfig::new("ws://gateway/socket");
        assert_eq!(config.url, "ws://gateway/socket");
        assert_eq!(config.max_reconnect_attempts, 30);
        assert_eq!(config.dedup_window, Duration::from_secs(2));
    }
}

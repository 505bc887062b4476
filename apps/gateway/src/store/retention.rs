//! Background purge of notifications past the retention window.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time;

use super::NotificationStore;

/// How often the sweeper runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Run one purge pass. Returns how many notifications were removed.
pub async fn sweep_once(store: &dyn NotificationStore, retention_days: i64) -> u64 {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);
    match store.purge_older_than(cutoff).await {
        Ok(purged) => {
            if purged > 0 {
                tracing::info!(purged, %cutoff, "purged expired notifications");
            }
            purged
        }
        Err(e) => {
            tracing::error!(error = %e, "notification purge failed");
            0
        }
    }
}

/// Spawn the hourly sweeper. The first pass runs immediately.
pub fn spawn_sweeper(
    store: Arc<dyn NotificationStore>,
    retention_days: i64,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(every);
        loop {
            ticker.tick().await;
            sweep_once(store.as_ref(), retention_days).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use parlay_common::{EntityType, Notification, NotificationKind, UserRef};

    #[tokio::test]
    async fn sweep_respects_configured_window() {
        let store = MemoryStore::new();
        let mut old = Notification::new(
            "u1",
            UserRef::Id("u2".into()),
            NotificationKind::Mention,
            EntityType::Bet,
            "bet1",
            "u2 mentioned you",
        );
        old.created_at = Utc::now() - chrono::Duration::days(8);
        store.create(old.clone()).await.unwrap();

        assert_eq!(sweep_once(&store, 30).await, 0);
        assert_eq!(sweep_once(&store, 7).await, 1);
    }
}

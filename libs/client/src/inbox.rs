//! Notification inbox fed by the socket.
//!
//! [`Inbox`] is the plain state machine: it applies `notifications_init`,
//! `new_notification` and `notification_count_updated` events, runs inbound
//! notifications through the [`NotificationFilter`], and decides when an
//! [`Alert`] should be raised. [`NotificationCenter`] wires an inbox to a
//! [`ConnectionManager`].

use std::sync::Arc;

use parking_lot::Mutex;

use parlay_common::{EntityType, EventName, Notification, NotificationKind, ServerEvent};

use crate::config::ClientConfig;
use crate::dedup::{NotificationFilter, Verdict};
use crate::dispatch::ListenerHandle;
use crate::manager::ConnectionManager;

/// A user-visible alert for one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub body: String,
    /// Click-through path, e.g. `/messages/{chatId}`.
    pub link: String,
}

impl Alert {
    fn for_notification(notification: &Notification) -> Self {
        let title = match notification.kind {
            NotificationKind::Message => "New message",
            NotificationKind::BetInteraction => "Activity on your bet",
            NotificationKind::Follow => "New follower",
            NotificationKind::BetOutcome => "Bet settled",
            NotificationKind::Mention => "You were mentioned",
        };
        Self {
            title: title.to_string(),
            body: notification.content.clone(),
            link: notification.deep_link(),
        }
    }
}

/// Surface that raises alerts (native notifications, toasts, ...).
pub trait Alerter: Send + Sync + 'static {
    fn alert(&self, alert: Alert);
}

pub struct Inbox {
    notifications: Vec<Notification>,
    unread_count: u64,
    filter: NotificationFilter,
    focused_chat: Option<String>,
    alerts_enabled: bool,
    capacity: usize,
}

impl Inbox {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            notifications: Vec::new(),
            unread_count: 0,
            filter: NotificationFilter::new(
                config.dedup_window,
                config.processed_cache_capacity,
                config.entity_cache_capacity,
            ),
            focused_chat: None,
            alerts_enabled: true,
            capacity: config.inbox_capacity.max(1),
        }
    }

    /// Apply one server event. Returns the alert to raise, if any.
    pub fn apply(&mut self, event: &ServerEvent) -> Option<Alert> {
        match event {
            ServerEvent::NotificationsInit(list) => {
                self.replace_all(list.clone());
                None
            }
            ServerEvent::NewNotification(notification) => self.receive(notification.clone()),
            ServerEvent::NotificationCountUpdated(update) => {
                self.unread_count = update.unread_count;
                None
            }
            _ => None,
        }
    }

    fn replace_all(&mut self, mut list: Vec<Notification>) {
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let mut seen = std::collections::HashSet::new();
        list.retain(|n| seen.insert(n.id.clone()));
        for notification in &list {
            self.filter.mark_processed(&notification.id);
        }
        self.unread_count = list.iter().filter(|n| !n.read).count() as u64;
        list.truncate(self.capacity);
        self.notifications = list;
    }

    fn receive(&mut self, notification: Notification) -> Option<Alert> {
        match self.filter.check(&notification) {
            Verdict::Admit => {}
            verdict => {
                tracing::debug!(id = %notification.id, ?verdict, "notification suppressed");
                return None;
            }
        }
        if self.notifications.iter().any(|n| n.id == notification.id) {
            return None;
        }

        let alert = self.should_alert(&notification).then(|| Alert::for_notification(&notification));
        if !notification.read {
            self.unread_count += 1;
        }
        self.notifications.insert(0, notification);
        // The unread count stays server-authoritative; only the list is capped.
        self.notifications.truncate(self.capacity);
        alert
    }

    fn should_alert(&self, notification: &Notification) -> bool {
        if !self.alerts_enabled {
            return false;
        }
        let in_focused_chat = notification.entity_type == EntityType::Chat
            && self.focused_chat.as_deref() == Some(notification.entity_id.as_str());
        !in_focused_chat
    }

    /// Mark one notification read locally. Returns whether anything changed.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(notification) if !notification.read => {
                notification.read = true;
                self.unread_count = self.unread_count.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    pub fn set_focused_chat(&mut self, chat_id: Option<String>) {
        self.focused_chat = chat_id;
    }

    pub fn set_alerts_enabled(&mut self, enabled: bool) {
        self.alerts_enabled = enabled;
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn unread_count(&self) -> u64 {
        self.unread_count
    }
}

/// An [`Inbox`] attached to a live connection.
pub struct NotificationCenter {
    manager: ConnectionManager,
    inbox: Arc<Mutex<Inbox>>,
    handles: Vec<ListenerHandle>,
}

impl NotificationCenter {
    /// Register the inbox listeners and mark the notifications channel wanted.
    pub fn attach(manager: &ConnectionManager, alerter: Option<Arc<dyn Alerter>>) -> Self {
        let inbox = Arc::new(Mutex::new(Inbox::new(manager.config())));

        let handles = [
            EventName::NOTIFICATIONS_INIT,
            EventName::NEW_NOTIFICATION,
            EventName::NOTIFICATION_COUNT_UPDATED,
        ]
        .into_iter()
        .map(|event| {
            let inbox = inbox.clone();
            let alerter = alerter.clone();
            manager.on(event, move |payload| {
                let alert = inbox.lock().apply(payload);
                if let (Some(alert), Some(alerter)) = (alert, alerter.as_ref()) {
                    alerter.alert(alert);
                }
            })
        })
        .collect();

        manager.subscribe_notifications();

        Self {
            manager: manager.clone(),
            inbox,
            handles,
        }
    }

    /// Mark read locally and tell the server.
    pub fn mark_read(&self, id: &str) {
        if self.inbox.lock().mark_read(id) {
            if let Err(e) = self.manager.read_notification(id) {
                tracing::debug!(error = %e, id, "read_notification not sent");
            }
        }
    }

    pub fn set_focused_chat(&self, chat_id: Option<&str>) {
        self.inbox.lock().set_focused_chat(chat_id.map(str::to_string));
    }

    pub fn set_alerts_enabled(&self, enabled: bool) {
        self.inbox.lock().set_alerts_enabled(enabled);
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inbox.lock().notifications().to_vec()
    }

    pub fn unread_count(&self) -> u64 {
        self.inbox.lock().unread_count()
    }

    /// Stop listening. The notifications subscription is left to the caller.
    pub fn detach(&self) {
        for handle in &self.handles {
            handle.remove();
        }
    }
}

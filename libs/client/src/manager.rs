//! Connection manager: one logical socket, its lifecycle, and recovery.
//!
//! States: `disconnected -> connecting -> connected`, `connecting -> error ->
//! connecting` while backing off, and `failed` once automatic reconnects are
//! exhausted. Every connection attempt goes through one coalescing slot, so
//! concurrent callers share a single in-flight attempt and at most one link
//! exists at any time.
//!
//! A `generation` counter tags the current link epoch. Teardown bumps it;
//! background tasks (link reader, retry timers, in-flight attempts) compare
//! their captured generation before touching state and go quiet when stale.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use parlay_common::events::{BetInteraction, ChatMessage, ReadNotification, TypingPayload};
use parlay_common::{ClientEventName, Envelope, ServerEvent};

use crate::config::ClientConfig;
use crate::dispatch::{Dispatcher, ListenerHandle};
use crate::error::{ClientError, Result};
use crate::observer::{LifecycleEvent, Observer};
use crate::state::{ConnectionSnapshot, ConnectionStatus};
use crate::subscriptions::SubscriptionSet;
use crate::transport::{Connector, Link, LinkEvent};

type PendingConnect = Shared<BoxFuture<'static, Result<()>>>;

/// How long to wait before the next automatic attempt.
#[derive(Debug, Clone, Copy)]
enum RetryDelay {
    /// After an established link dropped.
    Fixed,
    /// After a connection attempt failed.
    Backoff,
}

struct ActiveLink {
    outbound: mpsc::UnboundedSender<Envelope>,
    task: JoinHandle<()>,
}

struct Core {
    status: ConnectionStatus,
    since: Instant,
    reconnect_attempts: u32,
    last_error: Option<String>,
    generation: u64,
    has_connected: bool,
    pending: Option<PendingConnect>,
    link: Option<ActiveLink>,
    retry: Option<JoinHandle<()>>,
    subscriptions: SubscriptionSet,
}

impl Core {
    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            self.status = status;
            self.since = Instant::now();
        }
    }

    fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            status: self.status,
            reconnect_attempts: self.reconnect_attempts,
            last_error: self.last_error.clone(),
            since: self.since,
        }
    }

    /// Send on the live link, if any. Returns whether it was handed off.
    fn send(&self, envelope: Envelope) -> bool {
        match &self.link {
            Some(link) if self.status == ConnectionStatus::Connected => {
                link.outbound.send(envelope).is_ok()
            }
            _ => false,
        }
    }
}

struct Inner {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    token: RwLock<Option<String>>,
    core: Mutex<Core>,
    dispatcher: Dispatcher,
    observer: Observer,
}

/// Owned handle to the client socket service. Cheap to clone; clones share
/// the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                token: RwLock::new(None),
                core: Mutex::new(Core {
                    status: ConnectionStatus::Disconnected,
                    since: Instant::now(),
                    reconnect_attempts: 0,
                    last_error: None,
                    generation: 0,
                    has_connected: false,
                    pending: None,
                    link: None,
                    retry: None,
                    subscriptions: SubscriptionSet::new(),
                }),
                dispatcher: Dispatcher::new(),
                observer: Observer::new(),
            }),
        }
    }

    /// Set or clear the bearer token presented at handshake.
    pub fn set_token(&self, token: Option<String>) {
        *self.inner.token.write() = token;
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Resolve once the connection is up, starting an attempt if needed.
    ///
    /// Concurrent callers share the same attempt and observe the same result.
    /// Returns `MissingToken` without doing anything when no token is set, and
    /// `ConnectionFailed` while the manager sits in `failed`.
    pub async fn connect(&self) -> Result<()> {
        Inner::connect_shared(&self.inner).await
    }

    /// Alias for [`connect`](Self::connect): the single awaitable readiness point.
    pub async fn ready(&self) -> Result<()> {
        self.connect().await
    }

    /// Manual reconnect: resets the attempt counter, drops any current link
    /// and connects again. Leaves subscriptions and listeners in place.
    pub async fn reconnect(&self) -> Result<()> {
        let (link, retry) = {
            let mut core = self.inner.core.lock();
            core.generation += 1;
            core.pending = None;
            core.reconnect_attempts = 0;
            core.last_error = None;
            core.set_status(ConnectionStatus::Disconnected);
            self.inner.observer.publish(core.snapshot());
            (core.link.take(), core.retry.take())
        };
        if let Some(retry) = retry {
            retry.abort();
        }
        if let Some(link) = link {
            link.task.abort();
        }
        tracing::info!("manual reconnect requested");
        self.connect().await
    }

    /// Tear everything down: listeners, subscriptions, link, counters.
    /// Safe to call repeatedly.
    pub fn disconnect(&self) {
        let (was_connected, link, retry) = {
            let mut core = self.inner.core.lock();
            core.generation += 1;
            core.pending = None;
            core.subscriptions.clear();
            let was_connected = core.status == ConnectionStatus::Connected;
            core.set_status(ConnectionStatus::Disconnected);
            core.reconnect_attempts = 0;
            core.last_error = None;
            core.has_connected = false;
            self.inner.observer.publish(core.snapshot());
            (was_connected, core.link.take(), core.retry.take())
        };

        self.inner.dispatcher.clear();
        if let Some(retry) = retry {
            retry.abort();
        }
        if let Some(link) = link {
            link.task.abort();
        }
        if was_connected {
            tracing::info!("socket disconnected by client");
            self.inner.observer.emit(LifecycleEvent::Disconnected {
                reason: "client disconnect".to_string(),
            });
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.core.lock().status
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.inner.core.lock().snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Lifecycle events (`socket_connected`, `socket_disconnected`, ...).
    pub fn lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.observer.lifecycle()
    }

    /// Latest status snapshot, for banners and indicators.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.inner.observer.status()
    }

    // -----------------------------------------------------------------------
    // Subscription registry
    // -----------------------------------------------------------------------

    pub fn subscribe_notifications(&self) {
        self.update_subscriptions(SubscriptionSet::subscribe_notifications);
    }

    pub fn unsubscribe_notifications(&self) {
        self.update_subscriptions(SubscriptionSet::unsubscribe_notifications);
    }

    pub fn join_room(&self, chat_id: &str) {
        self.update_subscriptions(|set| set.join_room(chat_id));
    }

    pub fn leave_room(&self, chat_id: &str) {
        self.update_subscriptions(|set| set.leave_room(chat_id));
    }

    pub fn subscribe_bet(&self, bet_id: &str) {
        self.update_subscriptions(|set| set.subscribe_bet(bet_id));
    }

    pub fn unsubscribe_bet(&self, bet_id: &str) {
        self.update_subscriptions(|set| set.unsubscribe_bet(bet_id));
    }

    pub fn subscriptions(&self) -> SubscriptionSet {
        self.inner.core.lock().subscriptions.clone()
    }

    fn update_subscriptions<F>(&self, change: F)
    where
        F: FnOnce(&mut SubscriptionSet) -> Option<Envelope>,
    {
        // Same lock as the replay in `on_open`, so an intent is either
        // replayed or announced here, never both and never neither.
        let mut core = self.inner.core.lock();
        if let Some(announcement) = change(&mut core.subscriptions) {
            core.send(announcement);
        }
    }

    // -----------------------------------------------------------------------
    // Event dispatch
    // -----------------------------------------------------------------------

    /// Register a listener for a server event. Works before the first
    /// connect; the returned handle detaches it.
    pub fn on<F>(&self, event: &str, callback: F) -> ListenerHandle
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on(event, callback)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Send on the current link without waiting.
    pub fn send(&self, envelope: Envelope) -> Result<()> {
        if self.inner.core.lock().send(envelope) {
            Ok(())
        } else {
            Err(ClientError::Closed)
        }
    }

    /// Wait for readiness, then send.
    pub async fn emit(&self, event: &str, data: Value) -> Result<()> {
        self.ready().await?;
        self.send(Envelope::new(event, data))
    }

    pub fn send_typing(&self, chat_id: &str, is_typing: bool) -> Result<()> {
        self.send(Envelope::with_payload(
            ClientEventName::TYPING,
            &TypingPayload {
                chat_id: chat_id.to_string(),
                is_typing,
            },
        ))
    }

    pub fn mark_messages_read(&self, chat_id: &str) -> Result<()> {
        self.send(Envelope::new(ClientEventName::READ_MESSAGES, json!(chat_id)))
    }

    pub fn read_notification(&self, notification_id: &str) -> Result<()> {
        self.send(Envelope::with_payload(
            ClientEventName::READ_NOTIFICATION,
            &ReadNotification {
                notification_id: notification_id.to_string(),
            },
        ))
    }

    /// Echo a message that was already persisted over REST.
    pub async fn relay_message(&self, message: &ChatMessage) -> Result<()> {
        self.ready().await?;
        self.send(Envelope::with_payload(ClientEventName::NEW_MESSAGE, message))
    }

    pub async fn bet_interaction(&self, bet_id: &str, kind: &str, data: Value) -> Result<()> {
        self.ready().await?;
        self.send(Envelope::with_payload(
            ClientEventName::BET_INTERACTION,
            &BetInteraction {
                bet_id: bet_id.to_string(),
                kind: kind.to_string(),
                data,
            },
        ))
    }

    pub fn ping(&self) -> Result<()> {
        self.send(Envelope::bare(ClientEventName::PING))
    }
}

impl Inner {
    fn connect_shared(this: &Arc<Self>) -> PendingConnect {
        let mut core = this.core.lock();

        if core.status == ConnectionStatus::Connected && core.link.is_some() {
            return futures_util::future::ready(Ok(())).boxed().shared();
        }
        if core.status == ConnectionStatus::Failed {
            let attempts = core.reconnect_attempts;
            return futures_util::future::ready(Err(ClientError::ConnectionFailed { attempts }))
                .boxed()
                .shared();
        }
        if let Some(pending) = &core.pending {
            return pending.clone();
        }

        let Some(token) = this.token.read().clone() else {
            tracing::debug!("connect skipped: no auth token");
            return futures_util::future::ready(Err(ClientError::MissingToken))
                .boxed()
                .shared();
        };

        // A fresh attempt supersedes any timer still waiting to retry.
        if let Some(retry) = core.retry.take() {
            retry.abort();
        }
        core.set_status(ConnectionStatus::Connecting);
        this.observer.publish(core.snapshot());

        // The attempt runs on its own task so it settles even if every
        // caller stops polling.
        let generation = core.generation;
        let task = tokio::spawn(Self::establish(this.clone(), token, generation));
        let attempt = async move {
            task.await
                .unwrap_or_else(|e| Err(ClientError::Transport(e.to_string())))
        }
        .boxed()
        .shared();
        core.pending = Some(attempt.clone());
        attempt
    }

    async fn establish(self: Arc<Self>, token: String, generation: u64) -> Result<()> {
        tracing::debug!(generation, "opening socket link");
        let opened = match time::timeout(self.config.connect_timeout, self.connector.open(&token)).await
        {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout),
        };

        match opened {
            Ok(link) => self.on_open(link, generation),
            Err(err) => self.on_attempt_failed(err, generation),
        }
    }

    fn on_open(self: &Arc<Self>, link: Link, generation: u64) -> Result<()> {
        let Link { outbound, inbound } = link;

        let reconnected = {
            let mut core = self.core.lock();
            if core.generation != generation {
                // Torn down while the attempt was in flight; dropping
                // `outbound` closes the fresh link.
                return Err(ClientError::Closed);
            }
            core.pending = None;

            // Replay before anything else can be queued on the link.
            let replay = core.subscriptions.replay();
            let replayed = replay.len();
            for envelope in replay {
                let _ = outbound.send(envelope);
            }

            let task = tokio::spawn(run_link(self.clone(), inbound, outbound.clone(), generation));
            core.link = Some(ActiveLink { outbound, task });
            core.set_status(ConnectionStatus::Connected);
            core.reconnect_attempts = 0;
            core.last_error = None;
            let reconnected = core.has_connected;
            core.has_connected = true;
            self.observer.publish(core.snapshot());

            tracing::info!(generation, replayed, reconnected, "socket connected");
            reconnected
        };

        self.observer.emit(if reconnected {
            LifecycleEvent::Reconnected
        } else {
            LifecycleEvent::Connected
        });
        Ok(())
    }

    fn on_attempt_failed(self: &Arc<Self>, err: ClientError, generation: u64) -> Result<()> {
        let mut core = self.core.lock();
        if core.generation != generation {
            return Err(err);
        }
        core.pending = None;
        core.last_error = Some(err.to_string());

        if err.is_recoverable() {
            tracing::warn!(error = %err, attempts = core.reconnect_attempts, "connection attempt failed");
            self.schedule_retry(&mut core, RetryDelay::Backoff);
        } else {
            // Credential problems are not retried with the same token.
            tracing::warn!(error = %err, "connection rejected");
            core.set_status(ConnectionStatus::Error);
            self.observer.publish(core.snapshot());
            let attempts = core.reconnect_attempts;
            drop(core);
            self.observer.emit(LifecycleEvent::ConnectionFailed {
                attempts,
                reason: err.to_string(),
            });
        }
        Err(err)
    }

    /// The established link at `generation` is gone.
    fn on_link_lost(self: &Arc<Self>, generation: u64, err: ClientError) {
        let mut core = self.core.lock();
        if core.generation != generation {
            return;
        }
        core.generation += 1;
        core.link = None;
        core.last_error = Some(err.to_string());
        tracing::warn!(error = %err, "socket link lost");

        self.observer.emit(LifecycleEvent::Disconnected {
            reason: err.to_string(),
        });
        self.schedule_retry(&mut core, RetryDelay::Fixed);
    }

    fn schedule_retry(self: &Arc<Self>, core: &mut Core, delay: RetryDelay) {
        if core.reconnect_attempts >= self.config.max_reconnect_attempts {
            core.set_status(ConnectionStatus::Failed);
            self.observer.publish(core.snapshot());
            tracing::error!(
                attempts = core.reconnect_attempts,
                "reconnect attempts exhausted; waiting for manual reconnect"
            );
            self.observer.emit(LifecycleEvent::ConnectionFailed {
                attempts: core.reconnect_attempts,
                reason: core.last_error.clone().unwrap_or_default(),
            });
            return;
        }

        let attempt = core.reconnect_attempts;
        core.reconnect_attempts += 1;
        let wait = match delay {
            RetryDelay::Fixed => {
                core.set_status(ConnectionStatus::Disconnected);
                self.config.reconnect_delay
            }
            RetryDelay::Backoff => {
                core.set_status(ConnectionStatus::Error);
                self.config.backoff_delay(attempt)
            }
        };
        self.observer.publish(core.snapshot());
        tracing::info!(
            attempt = core.reconnect_attempts,
            delay_ms = wait.as_millis() as u64,
            "scheduling reconnect"
        );

        let inner = self.clone();
        let generation = core.generation;
        core.retry = Some(tokio::spawn(async move {
            time::sleep(wait).await;
            {
                let mut core = inner.core.lock();
                if core.generation != generation {
                    return;
                }
                core.retry = None;
            }
            // Outcome is handled by `on_open` / `on_attempt_failed`.
            drop(Inner::connect_shared(&inner));
        }));
    }

    fn deliver(&self, envelope: &Envelope) {
        match ServerEvent::from_envelope(envelope) {
            Ok(event) => {
                self.dispatcher.dispatch(&envelope.event, &event);
            }
            Err(e) => {
                tracing::warn!(event = %envelope.event, error = %e, "dropping undecodable event");
            }
        }
    }
}

/// Per-link task: delivers inbound events in order and keeps the heartbeat.
async fn run_link(
    inner: Arc<Inner>,
    mut inbound: mpsc::UnboundedReceiver<LinkEvent>,
    outbound: mpsc::UnboundedSender<Envelope>,
    generation: u64,
) {
    let heartbeat_timeout = inner.config.heartbeat_timeout;
    let mut ticker = time::interval(heartbeat_interval(&inner.config));
    ticker.tick().await; // First tick fires immediately; skip it.
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            event = inbound.recv() => {
                match event {
                    Some(LinkEvent::Frame(envelope)) => {
                        last_seen = Instant::now();
                        inner.deliver(&envelope);
                    }
                    Some(LinkEvent::Closed { reason, server_initiated }) => {
                        tracing::debug!(%reason, server_initiated, "link closed");
                        inner.on_link_lost(generation, ClientError::Transport(reason));
                        return;
                    }
                    None => {
                        inner.on_link_lost(generation, ClientError::Transport("link dropped".to_string()));
                        return;
                    }
                }
            }

            _ = ticker.tick() => {
                if last_seen.elapsed() > heartbeat_timeout {
                    tracing::warn!(
                        silent_ms = last_seen.elapsed().as_millis() as u64,
                        "heartbeat timeout; forcing reconnect"
                    );
                    inner.on_link_lost(generation, ClientError::Stale);
                    return;
                }
                let beat = Envelope::new(
                    ClientEventName::HEARTBEAT,
                    json!({ "ts": chrono::Utc::now().timestamp_millis() }),
                );
                if outbound.send(beat).is_err() {
                    inner.on_link_lost(generation, ClientError::Transport("link closed".to_string()));
                    return;
                }
            }
        }
    }
}

fn heartbeat_interval(config: &ClientConfig) -> Duration {
    if config.heartbeat_interval.is_zero() {
        Duration::from_millis(1)
    } else {
        config.heartbeat_interval
    }
}

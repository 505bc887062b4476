//! Client side of the real-time layer: one managed socket connection, the
//! subscriptions it should carry, typed event dispatch and the notification
//! inbox built on top of it.

pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod inbox;
pub mod manager;
mod observer;
pub mod state;
pub mod subscriptions;
pub mod transport;

pub use config::ClientConfig;
pub use dispatch::{Dispatcher, ListenerHandle};
pub use error::{ClientError, Result};
pub use inbox::{Alert, Alerter, Inbox, NotificationCenter};
pub use manager::ConnectionManager;
pub use observer::LifecycleEvent;
pub use state::{ConnectionSnapshot, ConnectionStatus};
pub use subscriptions::SubscriptionSet;
pub use transport::{Connector, Link, LinkEvent, WsConnector};

//! Real-time socket gateway.
//!
//! Clients connect to `/socket` with a bearer token and exchange JSON
//! envelopes (`{"event": ..., "data": ...}`). Each connection has a
//! [`session::GatewaySession`] tracking the rooms it joined; events fan out
//! through [`fanout::GatewayBroadcast`] and are filtered per session.

pub mod bridge;
pub mod fanout;
pub mod handler;
pub mod presence;
pub mod rooms;
pub mod server;
pub mod session;

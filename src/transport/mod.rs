//! Delivery of broadcast messages to remote clients
//!
//! The application layer only knows the [`Subscriber`](sandbox_app::Subscriber)
//! trait; this module provides the WebSocket endpoint that registers one
//! subscriber per connected client.

pub mod ws;

pub use ws::{WsServer, WELCOME_MESSAGE};

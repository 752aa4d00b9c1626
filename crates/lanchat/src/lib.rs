//! Client-side engine for a LAN chat service speaking a pipe-delimited
//! text protocol over short-lived TCP connections.
//!
//! Presentation is left to the caller: inbound events arrive through an
//! [`EventSink`], and outbound operations are methods on [`ChatClient`].

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod session;
pub mod wait_loop;

pub use client::{ChatClient, ClientOptions};
pub use config::ClientConfig;
pub use dispatch::{ChannelSink, EventSink, SessionEvent};
pub use error::ChatError;
pub use protocol::{InboundEvent, Request};
pub use session::Session;

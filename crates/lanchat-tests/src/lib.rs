//! Integration test helpers for lanchat end-to-end scenarios.
//!
//! The harness stands in for the chat server: it speaks the wire protocol
//! from the server side and records every request it sees.

pub mod harness;

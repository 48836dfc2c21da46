//! Envelope definitions for the WebSocket protocol.
//!
//! This module contains both client->server and server->client envelopes.
//! Every envelope is a JSON object discriminated by its `type` field.

mod client;
mod server;

pub use client::*;
pub use server::*;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon <-> CLI IPC protocol (§6). Wire format: 4-byte big-endian length
//! prefix + JSON payload.

mod request;
mod response;
mod types;
mod wire;

pub use request::Request;
pub use response::Response;
pub use types::{AgentSummary, PrSummary, StatusReport};
pub use wire::{decode, encode, read_message, read_request, write_message, write_response, ProtocolError};

/// Bumped on any breaking change to [`Request`]/[`Response`]; exchanged in
/// the `Hello` handshake so a stale CLI talking to a newer daemon fails
/// fast instead of silently misparsing frames.
pub const PROTOCOL_VERSION: &str = "1";

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin client over the daemon's Unix socket (§6).

use crate::exit_error::ExitError;
use conclave_wire::{read_message, write_message, Request, Response, PROTOCOL_VERSION};
use std::path::PathBuf;
use tokio::net::UnixStream;

pub struct DaemonClient {
    stream: UnixStream,
}

impl DaemonClient {
    /// Connect and perform the version handshake (§6). A connection
    /// refused/not-found is the CLI's signal that no daemon is running.
    pub async fn connect(work_dir: Option<&PathBuf>) -> Result<Self, ExitError> {
        let socket_path = match work_dir {
            Some(dir) => dir.join("daemon.sock"),
            None => crate::env::state_dir()?.join("daemon.sock"),
        };
        let stream = UnixStream::connect(&socket_path)
            .await
            .map_err(|e| ExitError::new(1, format!("daemon not reachable at {}: {e}", socket_path.display())))?;
        let mut client = Self { stream };
        client.hello().await?;
        Ok(client)
    }

    async fn hello(&mut self) -> Result<(), ExitError> {
        match self.call(Request::Hello { version: PROTOCOL_VERSION.to_string() }).await? {
            Response::Hello { version } if version == PROTOCOL_VERSION => Ok(()),
            Response::Hello { version } => Err(ExitError::new(1, format!("daemon speaks protocol {version}, expected {PROTOCOL_VERSION}"))),
            other => Err(ExitError::new(1, format!("unexpected handshake reply: {other:?}"))),
        }
    }

    pub async fn call(&mut self, request: Request) -> Result<Response, ExitError> {
        let wait = crate::env::ipc_timeout();
        write_message(&mut self.stream, &request, wait).await.map_err(|e| ExitError::new(1, e.to_string()))?;
        read_message(&mut self.stream, wait).await.map_err(|e| ExitError::new(1, e.to_string()))
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unix-socket IPC server (§6): one task per connection, each handling
//! `Ping`/`Hello`/`Status`/`Shutdown` requests framed by `conclave-wire`.

use conclave_engine::Supervisor;
use conclave_wire::{read_request, write_response, ProtocolError, Request, Response, PROTOCOL_VERSION};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Accept loop: handed the bound listener from [`crate::lifecycle::startup`];
/// returns once `cancellation` fires, letting `main` await it alongside the
/// supervisor's own shutdown.
pub async fn accept_loop(listener: UnixListener, supervisor: Arc<Supervisor>, started_at: Instant, cancellation: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                info!("listener accept loop stopping");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let supervisor = supervisor.clone();
                        let cancellation = cancellation.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, supervisor, started_at, cancellation).await {
                                warn!(error = %e, "connection handler failed");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
        }
    }
}

async fn handle_connection(mut stream: UnixStream, supervisor: Arc<Supervisor>, started_at: Instant, cancellation: CancellationToken) -> Result<(), ProtocolError> {
    let timeout = crate::env::ipc_timeout();
    loop {
        let request = match read_request(&mut stream, timeout).await {
            Ok(r) => r,
            Err(ProtocolError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };

        let response = match request {
            Request::Ping => Response::Pong,
            Request::Hello { version } => {
                if version != PROTOCOL_VERSION {
                    warn!(peer_version = %version, daemon_version = %PROTOCOL_VERSION, "protocol version mismatch");
                }
                Response::Hello { version: PROTOCOL_VERSION.to_string() }
            }
            Request::Status { verbose } => {
                let uptime_secs = started_at.elapsed().as_secs();
                Response::Status(crate::status::build(&supervisor, verbose, uptime_secs).await)
            }
            Request::Shutdown { drain } => {
                write_response(&mut stream, &Response::ShuttingDown, timeout).await?;
                if drain {
                    let cancellation = cancellation.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(crate::env::drain_timeout()).await;
                        cancellation.cancel();
                    });
                } else {
                    cancellation.cancel();
                }
                return Ok(());
            }
        };

        write_response(&mut stream, &response, timeout).await?;
    }
}

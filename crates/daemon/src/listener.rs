// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task: accepts socket connections and serves the command
//! surface without blocking the kernel.
//!
//! A `subscribe` request upgrades the connection to an event stream; every
//! other request is one framed request/response exchange.

use std::sync::Arc;

use li_wire::{read_frame, write_frame, Request, Response, WireError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::dispatch;
use crate::kernel::{topic_matches, Kernel};

/// Accepts connections until the stop token fires.
pub struct Listener {
    unix: UnixListener,
    tcp: Option<TcpListener>,
    kernel: Arc<Kernel>,
    /// Notified when a client requests daemon shutdown.
    pub shutdown_requested: Arc<Notify>,
    stop: CancellationToken,
}

impl Listener {
    pub fn new(unix: UnixListener, tcp: Option<TcpListener>, kernel: Arc<Kernel>) -> Self {
        Self {
            unix,
            tcp,
            kernel,
            shutdown_requested: Arc::new(Notify::new()),
            stop: CancellationToken::new(),
        }
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Accept loop. Each connection runs in its own task.
    pub async fn run(self) {
        info!("listener accepting connections");
        loop {
            tokio::select! {
                _ = self.stop.cancelled() => {
                    debug!("listener stopping");
                    return;
                }
                accepted = self.unix.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let (reader, writer) = stream.into_split();
                            self.spawn_connection(reader, writer);
                        }
                        Err(e) => error!(error = %e, "unix accept error"),
                    }
                }
                accepted = accept_tcp(self.tcp.as_ref()) => {
                    match accepted {
                        Ok((stream, addr)) => {
                            debug!(peer = %addr, "tcp connection");
                            let (reader, writer) = stream.into_split();
                            self.spawn_connection(reader, writer);
                        }
                        Err(e) => error!(error = %e, "tcp accept error"),
                    }
                }
            }
        }
    }

    fn spawn_connection<R, W>(&self, reader: R, writer: W)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let kernel = Arc::clone(&self.kernel);
        let shutdown = Arc::clone(&self.shutdown_requested);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(reader, writer, &kernel, &shutdown).await {
                match e {
                    WireError::Closed => {}
                    other => warn!(error = %other, "connection error"),
                }
            }
        });
    }
}

async fn accept_tcp(
    listener: Option<&TcpListener>,
) -> std::io::Result<(tokio::net::TcpStream, std::net::SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

async fn handle_connection<R, W>(
    mut reader: R,
    mut writer: W,
    kernel: &Kernel,
    shutdown: &Notify,
) -> Result<(), WireError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let request: Request = read_frame(&mut reader).await?;
        match request {
            Request::Shutdown => {
                write_frame(&mut writer, &Response::ShuttingDown).await?;
                shutdown.notify_one();
                return Ok(());
            }
            Request::Subscribe { topics } => {
                write_frame(&mut writer, &Response::Subscribed { topics: topics.clone() })
                    .await?;
                return stream_events(reader, writer, kernel, topics).await;
            }
            other => {
                let response = dispatch(kernel, other).await;
                write_frame(&mut writer, &response).await?;
            }
        }
    }
}

/// Push matching events until the client goes away.
async fn stream_events<R, W>(
    mut reader: R,
    mut writer: W,
    kernel: &Kernel,
    topics: Vec<String>,
) -> Result<(), WireError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut events = kernel.subscribe();
    loop {
        tokio::select! {
            // The client sends nothing after subscribing; a frame or EOF
            // here means it is done.
            done = read_frame::<_, Request>(&mut reader) => {
                match done {
                    Ok(_) | Err(WireError::Closed) => return Ok(()),
                    Err(e) => return Err(e),
                }
            }
            event = events.recv() => {
                match event {
                    Ok((topic, payload)) => {
                        let matches = topics.iter().any(|prefix| topic_matches(prefix, &topic));
                        if matches {
                            write_frame(&mut writer, &Response::Event { topic, payload }).await?;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        write_frame(&mut writer, &Response::Lagged { skipped }).await?;
                    }
                    Err(RecvError::Closed) => return Ok(()),
                }
            }
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin endpoint: a loopback HTTP/1.1 surface for status and runtime
//! config overrides.
//!
//! Two routes:
//! - `GET /status`: queue depth and per-task statuses as JSON
//! - `POST /config`: JSON body of overrides, applied atomically
//!
//! Everything else is 404. Responses always carry `Content-Length`.
//! Binding port 0 picks an ephemeral port, which is written back into
//! the orchestrator's config.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use stoker_core::Clock;
use stoker_engine::Orchestrator;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Per-read timeout for admin connections
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Cap on request size (headers + body)
const MAX_REQUEST_SIZE: usize = 64 * 1024;

/// Running admin endpoint.
pub struct AdminServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl AdminServer {
    /// Bind to loopback and start serving.
    pub async fn bind<C: Clock + 'static>(
        orch: Arc<Orchestrator<C>>,
        port: u16,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;
        orch.config_handle().set_admin_port(addr.port());
        info!(port = addr.port(), "admin endpoint listening");

        let shutdown = CancellationToken::new();
        let accept_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_shutdown.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => {
                            let orch = Arc::clone(&orch);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, &orch).await {
                                    debug!(error = %e, "admin connection error");
                                }
                            });
                        }
                        Err(e) => error!(error = %e, "admin accept error"),
                    }
                }
            }
        });

        Ok(Self {
            addr,
            shutdown,
            handle,
        })
    }

    /// Port the server actually bound.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    /// In-flight requests run to completion on their own tasks.
    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.handle.await;
    }
}

struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

/// Handle a single request/response exchange.
async fn handle_connection<C: Clock + 'static>(
    mut stream: TcpStream,
    orch: &Orchestrator<C>,
) -> io::Result<()> {
    let request = read_request(&mut stream).await?;
    let response = route(&request, orch);
    stream.write_all(&response).await?;
    stream.shutdown().await?;
    Ok(())
}

fn route<C: Clock + 'static>(request: &HttpRequest, orch: &Orchestrator<C>) -> Vec<u8> {
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/status") => {
            let body = serde_json::to_vec(&orch.status()).unwrap_or_default();
            http_response(200, "OK", &body)
        }
        ("POST", "/config") => {
            let overrides: serde_json::Map<String, serde_json::Value> =
                serde_json::from_slice(&request.body).unwrap_or_default();
            let changes = orch.update_config(&overrides);
            let body = serde_json::to_vec(&serde_json::json!({"ok": true, "changes": changes}))
                .unwrap_or_default();
            http_response(200, "OK", &body)
        }
        _ => http_response(404, "Not Found", b""),
    }
}

fn http_response(status: u16, reason: &str, body: &[u8]) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body);
    response
}

/// Read one HTTP/1.1 request: header block, then `Content-Length`
/// bytes of body.
async fn read_request(stream: &mut TcpStream) -> io::Result<HttpRequest> {
    let mut buf: Vec<u8> = Vec::with_capacity(1024);

    let header_end = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_REQUEST_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "request too large",
            ));
        }
        if read_chunk(stream, &mut buf).await? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
    };

    let header_text = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = header_text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_REQUEST_SIZE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "body too large"));
    }

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        if read_chunk(stream, &mut body).await? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
    }
    body.truncate(content_length);

    Ok(HttpRequest { method, path, body })
}

async fn read_chunk(stream: &mut TcpStream, buf: &mut Vec<u8>) -> io::Result<usize> {
    let mut chunk = [0u8; 1024];
    let n = tokio::time::timeout(READ_TIMEOUT, stream.read(&mut chunk))
        .await
        .map_err(|_| io::Error::from(io::ErrorKind::TimedOut))??;
    buf.extend_from_slice(&chunk[..n]);
    Ok(n)
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

#[cfg(test)]
#[path = "admin_tests.rs"]
mod tests;

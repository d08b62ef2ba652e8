//! TCP front end: one blocking transfer per accepted connection.

pub mod auth;
pub mod request;

use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::fd::AsFd;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use streamproxy_common::StreamAction;
use streamproxy_ts::TsFile;

use crate::config::Config;
use crate::encoder::HardwareEncoder;
use crate::transfer::{stream_passthrough, SocketWriter, Transfer, TransferSettings};
use request::{header, parse_stream_request, read_request_head};

const NOT_FOUND: &[u8] = b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
const UNAVAILABLE: &[u8] =
    b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Bind the configured address and serve until SIGINT or SIGTERM.
pub async fn start_server(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    tracing::info!("Listening on {addr}");

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    run_accept_loop(listener, Arc::new(config), cancel).await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Accept connections until `cancel` fires.
pub async fn run_accept_loop(listener: TcpListener, config: Arc<Config>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        tokio::spawn(handle_connection(stream, peer, config.clone()));
                    }
                    Err(e) => {
                        tracing::debug!("Accept error: {e}");
                    }
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

/// Move the connection onto a blocking thread; the transfer loop does its
/// own readiness polling.
async fn handle_connection(stream: tokio::net::TcpStream, peer: SocketAddr, config: Arc<Config>) {
    let std_stream = match stream.into_std() {
        Ok(s) => s,
        Err(e) => {
            tracing::debug!("Failed to convert to std TcpStream: {e}");
            return;
        }
    };
    // Request heads are read blocking with a timeout; the transfer switches
    // back to non-blocking once headers are consumed.
    let _ = std_stream.set_nonblocking(false);
    let _ = std_stream.set_read_timeout(Some(Duration::from_secs(config.server.request_timeout_secs)));

    tokio::task::spawn_blocking(move || {
        let _span = tracing::info_span!("client", %peer).entered();
        if let Err(e) = serve_stream(std_stream, &config) {
            if e.kind() == io::ErrorKind::BrokenPipe {
                tracing::trace!("Client disconnected: {e}");
            } else {
                tracing::debug!("Connection error: {e}");
            }
        }
    })
    .await
    .ok();
}

/// Serve one stream request on a blocking socket.
///
/// Credential and lookup failures are answered with an empty status
/// response. Once the transfer is set up nothing further is written here;
/// the transfer owns the response from its first byte.
pub fn serve_stream(mut stream: TcpStream, config: &Config) -> io::Result<()> {
    let head = read_request_head(&mut stream)?;
    if !auth::authorize(&config.server.auth, header(&head, "authorization")) {
        tracing::info!("Rejected request without valid credentials");
        return stream.write_all(&auth::unauthorized(&config.server.identity));
    }

    let Some(request) = parse_stream_request(&head) else {
        tracing::debug!(request = head.lines().next().unwrap_or(""), "Not a stream request");
        return stream.write_all(NOT_FOUND);
    };

    let action = request.action.unwrap_or(config.server.default_action);
    tracing::info!(
        file = %request.path.display(),
        ?action,
        byte_offset = request.seek.byte_offset,
        pct_offset = request.seek.pct_offset,
        time_offset_s = request.seek.time_offset_s,
        "Stream request"
    );

    let source = match TsFile::open(&request.path, request.seek.wants_time_seek()) {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!("{e}");
            return stream.write_all(NOT_FOUND);
        }
    };

    if action == StreamAction::Stream {
        stream.set_read_timeout(None)?;
        let settings = TransferSettings::from_config(config);
        let mut client = SocketWriter(stream.as_fd());
        match stream_passthrough(source, &request.seek, &mut client, &settings) {
            Ok(report) => tracing::debug!(?report, "Passthrough report"),
            Err(e) => {
                tracing::warn!("Failed to set up passthrough: {e}");
                return stream.write_all(NOT_FOUND);
            }
        }
        return Ok(());
    }

    let device = match HardwareEncoder::open(&config.encoder) {
        Ok(device) => device,
        Err(e) => {
            tracing::warn!("No encoder available: {e}");
            return stream.write_all(UNAVAILABLE);
        }
    };

    let params = request.params.or_defaults(&config.defaults);
    stream.set_read_timeout(None)?;
    stream.set_nonblocking(true)?;

    let transfer = match Transfer::new(
        source,
        device,
        request.seek,
        &params,
        stream.as_fd(),
        TransferSettings::from_config(config),
    ) {
        Ok(transfer) => transfer,
        Err(e) => {
            tracing::warn!("Failed to set up transfer: {e}");
            return Ok(());
        }
    };

    let report = transfer.run();
    tracing::debug!(?report, "Transfer report");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}

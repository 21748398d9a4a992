//! TCP front end: one connection pipeline per accepted socket.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::config::ServeConfig;
use crate::error::Result;
use crate::server::Server;
use crate::session::serve_connection;

/// Accept connections on `listener` until `shutdown` is cancelled.
///
/// Each socket is served on its own task. Connection errors are logged and
/// never stop the listener; only a failing `accept` does.
pub async fn serve<S: Server>(
    listener: TcpListener,
    server: Arc<S>,
    config: ServeConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("listening on {addr}");
    }
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("listener shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted?,
        };
        debug!("accepted connection from {peer}");
        tokio::spawn(handle_stream(stream, peer, server.clone(), config.clone()));
    }
}

async fn handle_stream<S: Server>(
    stream: TcpStream,
    peer: SocketAddr,
    server: Arc<S>,
    config: ServeConfig,
) {
    if let Err(err) = stream.set_nodelay(true) {
        debug!("{peer}: could not disable nagle: {err}");
    }
    let (reader, writer) = stream.into_split();
    match serve_connection(server, reader, writer, &config).await {
        Ok(()) => debug!("{peer}: connection closed"),
        Err(err) if err.is_fatal() => error!("{peer}: {err}"),
        Err(err) => warn!("{peer}: {err}"),
    }
}

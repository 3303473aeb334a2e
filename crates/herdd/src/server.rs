//! Accept loop and per-connection request processing

use anyhow::Result;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, warn};

use crate::handler::CommandHandler;
use crate::protocol::Frame;

/// Serve connections until the listener fails
pub async fn serve(listener: TcpListener, handler: CommandHandler) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("New connection from {}", addr);
                let handler = handler.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, handler).await {
                        error!("Error handling client {}: {:#}", addr, e);
                    }
                    debug!("Connection closed: {}", addr);
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

async fn handle_client(mut stream: TcpStream, handler: CommandHandler) -> Result<()> {
    let mut buffer = BytesMut::with_capacity(4096);
    let mut out = BytesMut::with_capacity(4096);

    loop {
        if stream.read_buf(&mut buffer).await? == 0 {
            return Ok(());
        }

        // Answer every complete request in the buffer, in order
        loop {
            match Frame::parse(&mut buffer) {
                Ok(Some(request)) => {
                    let handler = handler.clone();
                    // Lookups may block on peers and loaders
                    let reply = tokio::task::spawn_blocking(move || handler.handle(request)).await?;
                    reply.encode(&mut out);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Parse error: {}", e);
                    Frame::error("ERR", e).encode(&mut out);
                    buffer.clear();
                    break;
                }
            }
        }

        stream.write_all(&out).await?;
        out.clear();
    }
}

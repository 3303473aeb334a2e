//! Peer client: fetches values from the member that owns them

use std::time::Duration;

use anyhow::{bail, Context};
use bytes::BytesMut;
use herdcache::{Error, PeerFetcher, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;

use crate::protocol::Frame;

/// RESP client for one remote member.
///
/// `fetch` is synchronous; it drives the request on `runtime` and must not be
/// called from inside an async task.
pub struct RespPeer {
    addr: String,
    runtime: Handle,
    timeout: Duration,
}

impl RespPeer {
    pub fn new(addr: impl Into<String>, runtime: Handle, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            runtime,
            timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn request(&self, group: &str, key: &str) -> anyhow::Result<Frame> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .context("connect")?;
        stream
            .write_all(&Frame::command(["GET", group, key]).to_bytes())
            .await
            .context("send request")?;

        let mut buf = BytesMut::with_capacity(4096);
        loop {
            if let Some(frame) = Frame::parse(&mut buf).map_err(anyhow::Error::msg)? {
                return Ok(frame);
            }
            if stream.read_buf(&mut buf).await.context("read reply")? == 0 {
                bail!("connection closed before a full reply");
            }
        }
    }
}

impl PeerFetcher for RespPeer {
    fn fetch(&self, group: &str, key: &str) -> Result<Vec<u8>> {
        let reply = self
            .runtime
            .block_on(async { tokio::time::timeout(self.timeout, self.request(group, key)).await })
            .map_err(|_| Error::peer(&self.addr, format_args!("timed out after {:?}", self.timeout)))?
            .map_err(|err| Error::peer(&self.addr, format_args!("{err:#}")))?;

        match reply {
            Frame::Bulk(Some(data)) => Ok(data),
            Frame::Error(msg) => Err(Error::peer(&self.addr, msg)),
            other => Err(Error::peer(&self.addr, format_args!("unexpected reply {other:?}"))),
        }
    }
}

//! Framing for the engine's preview endpoint.
//!
//! An editor or workflow host talks to `fieldmap serve` with one JSON-RPC
//! frame per line. [`LineTransport`] does that framing over any async byte
//! stream, with [`StdioTransport`] as the process-level instance the CLI
//! serves on. [`ChannelTransport`] hands whole frames across tokio channels
//! so a host can embed the server in-process.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::mpsc;

use crate::error::RpcError;

/// Moves `functions/list`, `mappings/test` and `mappings/auto` frames.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Next frame, or `Ok(None)` once the host has hung up.
    async fn read_message(&mut self) -> Result<Option<String>, RpcError>;

    async fn write_message(&mut self, message: &str) -> Result<(), RpcError>;

    async fn close(&mut self) -> Result<(), RpcError>;
}

/// Newline-delimited frames over a reader/writer pair.
///
/// Frames never contain raw newlines since `serde_json` escapes them inside
/// strings. A trailing `\r` from hosts that write CRLF is dropped.
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
    frames_read: u64,
}

/// The transport `fieldmap serve` runs on.
pub type StdioTransport = LineTransport<BufReader<Stdin>, Stdout>;

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send + Sync,
    W: AsyncWrite + Unpin + Send + Sync,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            frames_read: 0,
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

impl StdioTransport {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

#[async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send + Sync,
    W: AsyncWrite + Unpin + Send + Sync,
{
    async fn read_message(&mut self) -> Result<Option<String>, RpcError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            tracing::debug!(frames = self.frames_read, "Host closed the input stream");
            return Ok(None);
        }
        self.frames_read += 1;
        let frame = line.strip_suffix('\n').unwrap_or(&line);
        let frame = frame.strip_suffix('\r').unwrap_or(frame);
        Ok(Some(frame.to_string()))
    }

    async fn write_message(&mut self, message: &str) -> Result<(), RpcError> {
        self.writer.write_all(message.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RpcError> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// Frames passed whole between an embedding host and the server.
pub struct ChannelTransport {
    inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<String>,
}

impl ChannelTransport {
    pub fn new(inbound: mpsc::Receiver<String>, outbound: mpsc::Sender<String>) -> Self {
        Self { inbound, outbound }
    }

    /// Host end first, server end second.
    pub fn pair(buffer: usize) -> (Self, Self) {
        let (to_server, server_inbound) = mpsc::channel(buffer);
        let (to_host, host_inbound) = mpsc::channel(buffer);
        (
            ChannelTransport::new(host_inbound, to_server),
            ChannelTransport::new(server_inbound, to_host),
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn read_message(&mut self) -> Result<Option<String>, RpcError> {
        Ok(self.inbound.recv().await)
    }

    async fn write_message(&mut self, message: &str) -> Result<(), RpcError> {
        self.outbound
            .send(message.to_string())
            .await
            .map_err(|_| RpcError::TransportError {
                message: "host end of the preview channel is gone".to_string(),
            })
    }

    async fn close(&mut self) -> Result<(), RpcError> {
        self.inbound.close();
        Ok(())
    }
}

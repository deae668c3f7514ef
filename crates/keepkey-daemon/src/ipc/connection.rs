//! Line-delimited JSON framing shared by the bridge and its approvers
//!
//! Every message is one JSON document on one line. The platform endpoint
//! (Unix socket or named pipe) is re-exported from here so callers never
//! name a platform module directly.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};

use crate::error::Result;

#[cfg(unix)]
pub use super::unix::{dial, ClientStream, Listener};

#[cfg(windows)]
pub use super::windows::{dial, ClientStream, Listener};

/// Split a connected stream into framed halves
pub fn framed<S>(stream: S) -> (FrameReader<S>, FrameWriter<S>)
where
    S: AsyncRead + AsyncWrite,
{
    let (reader, writer) = tokio::io::split(stream);
    (
        FrameReader {
            inner: BufReader::new(reader),
            line: String::new(),
        },
        FrameWriter { inner: writer },
    )
}

/// Receiving half of a connection
pub struct FrameReader<S> {
    inner: BufReader<ReadHalf<S>>,
    line: String,
}

impl<S: AsyncRead> FrameReader<S> {
    /// Next non-blank line without its terminator; `None` at end of stream
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            self.line.clear();
            if self.inner.read_line(&mut self.line).await? == 0 {
                return Ok(None);
            }
            let line = self.line.trim();
            if !line.is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
    }

    /// Next message; `None` at end of stream
    pub async fn recv<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        match self.next_line().await? {
            Some(line) => Ok(Some(serde_json::from_str(&line)?)),
            None => Ok(None),
        }
    }
}

/// Sending half of a connection
pub struct FrameWriter<S> {
    inner: WriteHalf<S>,
}

impl<S: AsyncWrite> FrameWriter<S> {
    /// Write one message and flush it
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let mut json = serde_json::to_vec(message)?;
        json.push(b'\n');
        self.inner.write_all(&json).await?;
        self.inner.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::{IpcRequest, IpcResponse};

    #[tokio::test]
    async fn test_messages_cross_in_both_directions() {
        let (bridge, approver) = tokio::io::duplex(1024);
        let (mut bridge_rx, mut bridge_tx) = framed(bridge);
        let (mut approver_rx, mut approver_tx) = framed(approver);

        approver_tx.send(&IpcRequest::Ping).await.unwrap();
        assert_eq!(
            bridge_rx.recv::<IpcRequest>().await.unwrap(),
            Some(IpcRequest::Ping)
        );

        bridge_tx.send(&IpcResponse::Subscribed).await.unwrap();
        assert!(matches!(
            approver_rx.recv::<IpcResponse>().await.unwrap(),
            Some(IpcResponse::Subscribed)
        ));
    }

    #[tokio::test]
    async fn test_blank_lines_skipped_and_eof_is_none() {
        let (bridge, mut approver) = tokio::io::duplex(1024);
        let (mut reader, _writer) = framed(bridge);

        approver.write_all(b"\n  \r\n{\"type\":\"Ping\"}\n").await.unwrap();
        drop(approver);

        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("{\"type\":\"Ping\"}"));
        assert_eq!(reader.next_line().await.unwrap(), None);
    }
}

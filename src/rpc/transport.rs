//! Newline-delimited transport.
//!
//! - Messages are JSON-RPC, read as raw bytes (decoding is the router's job)
//! - Messages are delimited by newlines
//! - Incoming lines longer than the size limit are discarded unread
//! - Outgoing messages never contain embedded newlines
//!
//! [`StdioTransport`] binds the transport to the process's stdin and stdout;
//! logging goes to stderr so it never mixes with protocol traffic.

use std::io;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tracing::warn;

/// Default upper bound on one incoming line, excluding its terminator.
pub const MAX_MESSAGE_SIZE_BYTES: usize = 10 * 1024 * 1024;

/// One unit read from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line with its terminator removed.
    Message(Vec<u8>),
    /// A line over the size limit; its content was skipped.
    Oversized,
}

/// A line-oriented transport over any async reader/writer pair.
pub struct LineTransport<R, W> {
    /// Buffered reader for incoming messages.
    reader: R,
    /// Sink for outgoing messages.
    writer: W,
    /// Longest accepted line, in bytes.
    max_message_size: usize,
}

/// A transport bound to stdin and stdout.
pub type StdioTransport = LineTransport<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

impl StdioTransport {
    /// Creates a transport over the process's stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over the given reader and writer.
    pub const fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            max_message_size: MAX_MESSAGE_SIZE_BYTES,
        }
    }

    /// Sets the longest line accepted by [`read_frame`](Self::read_frame).
    #[must_use]
    pub const fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Reads the next line as raw bytes.
    ///
    /// At most `max_message_size + 1` bytes of a line are buffered. The rest
    /// of a longer line is consumed and dropped, and [`Frame::Oversized`] is
    /// returned in its place. Returns `None` once the reader reaches EOF.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_frame(&mut self) -> io::Result<Option<Frame>> {
        let limit = self.max_message_size.saturating_add(1);
        let mut line = Vec::new();
        let bytes_read = (&mut self.reader)
            .take(limit as u64)
            .read_until(b'\n', &mut line)
            .await?;

        if bytes_read == 0 {
            return Ok(None);
        }

        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        } else if line.len() > self.max_message_size {
            let skipped = self.skip_line().await?;
            warn!(
                limit = self.max_message_size,
                size = line.len() + skipped,
                "Discarding oversized message"
            );
            return Ok(Some(Frame::Oversized));
        }

        Ok(Some(Frame::Message(line)))
    }

    /// Consumes input up to and including the next newline.
    ///
    /// Returns the number of bytes dropped before the newline.
    async fn skip_line(&mut self) -> io::Result<usize> {
        let mut skipped = 0;

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(skipped);
            }

            if let Some(pos) = available.iter().position(|&b| b == b'\n') {
                self.reader.consume(pos + 1);
                return Ok(skipped + pos);
            }

            let len = available.len();
            self.reader.consume(len);
            skipped += len;
        }
    }

    /// Writes one encoded message followed by a newline.
    ///
    /// Raw handler results may contain formatting newlines. Outside of
    /// strings a newline in JSON is insignificant whitespace, and inside
    /// strings it is always escaped, so any raw `\n` or `\r` byte is replaced
    /// by a space to keep the framing intact.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub async fn write_message(&mut self, message: &[u8]) -> io::Result<()> {
        if message.iter().any(|b| matches!(b, b'\n' | b'\r')) {
            let flattened: Vec<u8> = message
                .iter()
                .map(|&b| if matches!(b, b'\n' | b'\r') { b' ' } else { b })
                .collect();
            self.writer.write_all(&flattened).await?;
        } else {
            self.writer.write_all(message).await?;
        }

        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// Consumes the transport, returning the writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

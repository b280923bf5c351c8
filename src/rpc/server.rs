//! Serving loop connecting a [`LineTransport`] to a [`Router`].
//!
//! Each incoming line is handed to [`Router::serve`] as raw bytes and the
//! response (if any) is written back as one line. A line that is not valid
//! UTF-8 is just another malformed payload and gets a ParseError; a line over
//! the transport's size limit gets an InvalidRequest. The loop ends on EOF, or for the stdio
//! server also on SIGINT/SIGTERM (Ctrl+C on Windows). On the way out the
//! shared [`Context`] is cancelled so in-flight handlers can wind down.

use std::io;

use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tracing::{debug, info};

use crate::rpc::context::Context;
use crate::rpc::id::Id;
use crate::rpc::protocol::{encode_error, ErrorCode, ErrorObject};
use crate::rpc::router::Router;
use crate::rpc::transport::{Frame, LineTransport};

/// Drives a router over a line transport.
pub struct Server<R, W> {
    /// The router answering requests.
    router: Router,
    /// The transport layer.
    transport: LineTransport<R, W>,
    /// Context shared by every request served by this server.
    context: Context,
}

/// A server bound to stdin and stdout.
pub type StdioServer = Server<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

impl<R, W> Server<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a server over the given transport.
    #[must_use]
    pub fn new(router: Router, transport: LineTransport<R, W>) -> Self {
        Self {
            router,
            transport,
            context: Context::new(),
        }
    }

    /// Returns the context handed to every handler.
    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.context
    }

    /// Serves lines until the reader reaches EOF.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve_until_eof(&mut self) -> io::Result<()> {
        while let Some(frame) = self.transport.read_frame().await? {
            self.handle_frame(frame).await?;
        }

        debug!("Reader closed");
        self.context.cancel();
        Ok(())
    }

    /// Consumes the server, returning the transport.
    pub fn into_transport(self) -> LineTransport<R, W> {
        self.transport
    }

    /// Handles the result from a transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result(
        &mut self,
        frame_result: io::Result<Option<Frame>>,
    ) -> io::Result<bool> {
        let Some(frame) = frame_result? else {
            debug!("Reader closed");
            return Ok(true);
        };

        self.handle_frame(frame).await?;
        Ok(false)
    }

    /// Handles a single frame of input.
    async fn handle_frame(&mut self, frame: Frame) -> io::Result<()> {
        let line = match frame {
            Frame::Message(line) => line,
            Frame::Oversized => {
                let error =
                    ErrorObject::with_message(ErrorCode::InvalidRequest, "Request too large");
                return self.transport.write_message(&encode_error(&Id::Null, &error)).await;
            }
        };

        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }

        if let Some(response) = self.router.serve(&self.context, &line).await {
            self.transport.write_message(&response).await?;
        }

        Ok(())
    }
}

impl StdioServer {
    /// Creates a server over the process's stdin and stdout.
    #[must_use]
    pub fn stdio(router: Router) -> Self {
        Self::new(router, LineTransport::stdio())
    }

    /// Runs the server until EOF or a shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> io::Result<()> {
        let result = self.run_with_shutdown().await;
        self.context.cancel();
        result
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown(&mut self) -> io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                    return Ok(());
                }

                frame_result = self.transport.read_frame() => {
                    if self.handle_transport_result(frame_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown(&mut self) -> io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                    return Ok(());
                }

                frame_result = self.transport.read_frame() => {
                    if self.handle_transport_result(frame_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }
}

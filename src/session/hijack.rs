//! Stream hijacking
//!
//! Turns an established bidirectional call into a plain byte connection.
//! Inbound messages are unframed into a byte stream; each write becomes one
//! outbound message. The bytes themselves are never interpreted here.

use crate::session::options::SessionOptions;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::sync::{CancellationToken, PollSender, WaitForCancellationFutureOwned};
use tracing::debug;

/// Inbound half of a call: one item per received message
pub type MessageStream = BoxStream<'static, io::Result<Bytes>>;

/// Default cap on the payload of one outbound message
pub const DEFAULT_MAX_FRAME_SIZE: usize = 32 * 1024;

type CloseHook = Box<dyn FnOnce() + Send>;

/// An established bidirectional call, as handed over by the RPC layer
pub struct ServerStream {
    metadata: HashMap<String, Vec<String>>,
    inbound: MessageStream,
    outbound: mpsc::Sender<Bytes>,
    on_close: Option<CloseHook>,
}

impl ServerStream {
    pub fn new(
        metadata: HashMap<String, Vec<String>>,
        inbound: MessageStream,
        outbound: mpsc::Sender<Bytes>,
    ) -> Self {
        Self {
            metadata,
            inbound,
            outbound,
            on_close: None,
        }
    }

    /// Run `hook` when the hijacked connection is closed. Runs at most once.
    pub fn on_close(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    /// Call metadata (request headers)
    pub fn metadata(&self) -> &HashMap<String, Vec<String>> {
        &self.metadata
    }
}

impl fmt::Debug for ServerStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerStream")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Shared close state between a [`Conn`] and whoever hijacked it
#[derive(Clone)]
pub struct CloseHandle {
    inner: Arc<CloseState>,
}

struct CloseState {
    done: AtomicBool,
    closed: CancellationToken,
    writer: Mutex<PollSender<Bytes>>,
    hook: Mutex<Option<CloseHook>>,
}

impl CloseHandle {
    fn new(writer: PollSender<Bytes>, hook: Option<CloseHook>) -> Self {
        Self {
            inner: Arc::new(CloseState {
                done: AtomicBool::new(false),
                closed: CancellationToken::new(),
                writer: Mutex::new(writer),
                hook: Mutex::new(hook),
            }),
        }
    }

    /// Close both halves. Idempotent; returns true on the call that
    /// actually closed it.
    pub fn close(&self) -> bool {
        self.writer().close();
        let hook = self
            .inner
            .hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let first = !self.inner.done.swap(true, Ordering::AcqRel);
        self.inner.closed.cancel();
        if let Some(hook) = hook {
            hook();
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Resolves once the connection is closed
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }

    fn closed_owned(&self) -> WaitForCancellationFutureOwned {
        self.inner.closed.clone().cancelled_owned()
    }

    fn writer(&self) -> MutexGuard<'_, PollSender<Bytes>> {
        self.inner
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Raw duplex connection over a hijacked call
pub struct Conn {
    reader: StreamReader<MessageStream, Bytes>,
    max_frame_size: usize,
    close: CloseHandle,
    // Wakes blocked reads and writes when closed from outside
    closed: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl Conn {
    /// Handle that can close this connection from outside
    pub fn close_handle(&self) -> CloseHandle {
        self.close.clone()
    }

    /// Close both halves. Further writes fail, further reads return EOF.
    pub fn close(&mut self) {
        if self.close.close() {
            debug!("hijacked connection closed");
        }
    }

    fn closed_error() -> io::Error {
        io::Error::new(io::ErrorKind::BrokenPipe, "connection closed")
    }
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("max_frame_size", &self.max_frame_size)
            .field("closed", &self.close.is_closed())
            .finish_non_exhaustive()
    }
}

impl AsyncRead for Conn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.close.is_closed() || this.closed.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for Conn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.close.is_closed() || this.closed.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Err(Self::closed_error()));
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let mut writer = this.close.writer();
        ready!(writer.poll_reserve(cx)).map_err(|_| Self::closed_error())?;
        let len = buf.len().min(this.max_frame_size);
        writer
            .send_item(Bytes::copy_from_slice(&buf[..len]))
            .map_err(|_| Self::closed_error())?;
        Poll::Ready(Ok(len))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().close();
        Poll::Ready(Ok(()))
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        self.close();
    }
}

/// Take over a call's transport. The returned connection owns the call;
/// the caller must not touch the stream again.
pub fn hijack(stream: ServerStream, max_frame_size: usize) -> (Conn, SessionOptions) {
    let opts = SessionOptions::from_metadata(&stream.metadata);
    let close = CloseHandle::new(PollSender::new(stream.outbound), stream.on_close);
    let conn = Conn {
        reader: StreamReader::new(stream.inbound),
        max_frame_size: max_frame_size.max(1),
        closed: Box::pin(close.closed_owned()),
        close,
    };
    (conn, opts)
}

//! Progress-tracking reader and writer wrappers for artifact streams.
//!
//! Both wrappers borrow the underlying stream; closing it stays the job of
//! whoever opened it.

use super::progress::PercentageLogger;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Writer wrapper that feeds every written byte into a [`PercentageLogger`]
pub struct ProgressWriter<'a, W: ?Sized> {
    inner: &'a mut W,
    progress: PercentageLogger,
}

impl<'a, W: AsyncWrite + Unpin + ?Sized> ProgressWriter<'a, W> {
    pub fn new(inner: &'a mut W, progress: PercentageLogger) -> Self {
        Self { inner, progress }
    }

    /// Get total bytes written
    pub fn bytes_transferred(&self) -> u64 {
        self.progress.transferred_bytes()
    }
}

impl<W: AsyncWrite + Unpin + ?Sized> AsyncWrite for ProgressWriter<'_, W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        match Pin::new(&mut *this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(written)) => {
                this.progress.record(written as u64);
                Poll::Ready(Ok(written))
            }
            other => other,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.inner).poll_shutdown(cx)
    }
}

/// Reader wrapper that feeds every read byte into a [`PercentageLogger`]
pub struct ProgressReader<'a, R: ?Sized> {
    inner: &'a mut R,
    progress: PercentageLogger,
}

impl<'a, R: AsyncRead + Unpin + ?Sized> ProgressReader<'a, R> {
    pub fn new(inner: &'a mut R, progress: PercentageLogger) -> Self {
        Self { inner, progress }
    }

    /// Get total bytes read
    pub fn bytes_transferred(&self) -> u64 {
        self.progress.transferred_bytes()
    }
}

impl<R: AsyncRead + Unpin + ?Sized> AsyncRead for ProgressReader<'_, R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let before = buf.filled().len();
        let poll = Pin::new(&mut *this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            this.progress.record((buf.filled().len() - before) as u64);
        }
        poll
    }
}

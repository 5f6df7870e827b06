//! DATA-phase payload writer.
//!
//! Wraps the transport during the DATA phase, normalizing line endings
//! to CRLF and doubling any leading `.` so payload lines can never be
//! mistaken for the terminator. The MIME renderer stays oblivious to
//! both concerns.

use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// An [`AsyncWrite`] adapter applying CRLF normalization and
/// dot-stuffing, buffering transformed bytes until the next flush.
#[derive(Debug)]
pub struct DotStuffWriter<W> {
    inner: W,
    pending: Vec<u8>,
    pending_pos: usize,
    at_line_start: bool,
    // A bare CR is held back until the next byte decides whether it was
    // a CRLF pair or a lone terminator.
    pending_cr: bool,
}

impl<W: AsyncWrite + Unpin> DotStuffWriter<W> {
    /// Wraps a transport for one DATA payload.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            pending: Vec::with_capacity(8 * 1024),
            pending_pos: 0,
            at_line_start: true,
            pending_cr: false,
        }
    }

    fn transform(&mut self, buf: &[u8]) {
        for &byte in buf {
            if self.pending_cr && byte != b'\n' {
                self.push_line_break();
            }
            match byte {
                b'\r' => self.pending_cr = true,
                b'\n' => {
                    self.pending_cr = false;
                    self.push_line_break();
                }
                _ => {
                    if self.at_line_start && byte == b'.' {
                        self.pending.push(b'.');
                    }
                    self.pending.push(byte);
                    self.at_line_start = false;
                }
            }
        }
    }

    fn push_line_break(&mut self) {
        self.pending_cr = false;
        self.pending.extend_from_slice(b"\r\n");
        self.at_line_start = true;
    }

    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        while self.pending_pos < self.pending.len() {
            let n = ready!(
                Pin::new(&mut self.inner).poll_write(cx, &self.pending[self.pending_pos..])
            )?;
            if n == 0 {
                return Poll::Ready(Err(std::io::ErrorKind::WriteZero.into()));
            }
            self.pending_pos += n;
        }
        self.pending.clear();
        self.pending_pos = 0;
        Poll::Ready(Ok(()))
    }

    /// Terminates the payload: closes the final line when needed, then
    /// sends the `.` terminator and flushes.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails.
    pub async fn finish(mut self) -> std::io::Result<W> {
        if self.pending_cr {
            self.push_line_break();
        }
        if !self.at_line_start {
            self.pending.extend_from_slice(b"\r\n");
        }
        self.pending.extend_from_slice(b".\r\n");
        self.flush().await?;
        Ok(self.inner)
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for DotStuffWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        this.transform(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn stuff(input: &[u8]) -> String {
        let mut writer = DotStuffWriter::new(Vec::new());
        writer.write_all(input).await.unwrap();
        let out = writer.finish().await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn plain_lines_pass_through() {
        assert_eq!(stuff(b"hello\r\nworld\r\n").await, "hello\r\nworld\r\n.\r\n");
    }

    #[tokio::test]
    async fn leading_dot_is_doubled() {
        assert_eq!(stuff(b".hidden\r\n").await, "..hidden\r\n.\r\n");
        assert_eq!(stuff(b"a\r\n.b\r\n.c\r\n").await, "a\r\n..b\r\n..c\r\n.\r\n");
    }

    #[tokio::test]
    async fn interior_dots_untouched() {
        assert_eq!(stuff(b"a.b\r\n").await, "a.b\r\n.\r\n");
    }

    #[tokio::test]
    async fn bare_lf_normalized() {
        assert_eq!(stuff(b"a\nb\n").await, "a\r\nb\r\n.\r\n");
    }

    #[tokio::test]
    async fn bare_cr_normalized() {
        assert_eq!(stuff(b"a\rb").await, "a\r\nb\r\n.\r\n");
    }

    #[tokio::test]
    async fn terminator_added_after_unterminated_line() {
        assert_eq!(stuff(b"no newline").await, "no newline\r\n.\r\n");
    }

    #[tokio::test]
    async fn lone_dot_line_is_stuffed() {
        assert_eq!(stuff(b".\r\n").await, "..\r\n.\r\n");
    }

    #[tokio::test]
    async fn split_writes_keep_state() {
        let mut writer = DotStuffWriter::new(Vec::new());
        writer.write_all(b"line\r").await.unwrap();
        writer.write_all(b"\n.dot").await.unwrap();
        let out = writer.finish().await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "line\r\n..dot\r\n.\r\n");
    }

    #[tokio::test]
    async fn empty_payload_still_terminates() {
        assert_eq!(stuff(b"").await, ".\r\n");
    }
}

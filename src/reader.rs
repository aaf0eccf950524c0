use anyhow::Result;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::Error;

/// Maximum length of a protocol line, terminator included.
pub(crate) const MAX_LINE_LEN: usize = 8192;

/// Size of the reads performed on the inner reader.
const READ_CHUNK: usize = 4096;

/// Buffered reader splitting a byte stream into lines. Lines are returned as
/// references into the inner buffer and stay valid until the next read.
/// Lines longer than `max_len` are rejected instead of being truncated.
pub(crate) struct LineReader<R> {
    /// Inner reader.
    inner: R,
    /// Buffered data; the part before `cursor` was already handed out.
    buffer: Vec<u8>,
    /// Cursor keeping track of already read data in the buffer.
    cursor: usize,
    /// Maximum line length, terminator included.
    max_len: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self::with_max_len(MAX_LINE_LEN, inner)
    }

    pub(crate) fn with_max_len(max_len: usize, inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(READ_CHUNK),
            cursor: 0,
            max_len,
        }
    }

    /// Get a mutable reference to the inner reader.
    pub(crate) fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Unwraps the inner reader, alongside the data that was buffered but not
    /// read yet.
    pub(crate) fn into_parts(mut self) -> (R, Vec<u8>) {
        self.buffer.drain(..self.cursor);
        (self.inner, self.buffer)
    }

    /// Read the next line, its terminating '\n' included. On end of stream
    /// the unterminated remaining data is returned as the last line, then
    /// `None`.
    pub(crate) async fn read_line(&mut self) -> Result<Option<&[u8]>> {
        // Forget about the previously returned line.
        self.buffer.drain(..self.cursor);
        self.cursor = 0;

        let mut scanned = 0;
        let end = loop {
            if let Some(pos) = self.buffer[scanned..].iter().position(|b| *b == b'\n') {
                let end = scanned + pos + 1;
                if end > self.max_len {
                    return Err(Error::LineTooLong.into());
                }
                break end;
            }
            if self.buffer.len() >= self.max_len {
                return Err(Error::LineTooLong.into());
            }
            scanned = self.buffer.len();

            let mut chunk = [0; READ_CHUNK];
            let read = self.inner.read(&mut chunk).await?;
            if read == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                break self.buffer.len();
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        };

        self.cursor = end;
        Ok(Some(&self.buffer[..end]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines() {
        let mut lr = LineReader::new(&b"GET http://example.net/ HTTP/1.0\r\nAccept: */*\r\n\r\nleft"[..]);

        assert_eq!(
            lr.read_line().await.unwrap(),
            Some(&b"GET http://example.net/ HTTP/1.0\r\n"[..])
        );
        assert_eq!(lr.read_line().await.unwrap(), Some(&b"Accept: */*\r\n"[..]));
        assert_eq!(lr.read_line().await.unwrap(), Some(&b"\r\n"[..]));

        // Unterminated data is returned at the end of the stream.
        assert_eq!(lr.read_line().await.unwrap(), Some(&b"left"[..]));
        assert_eq!(lr.read_line().await.unwrap(), None);
        assert_eq!(lr.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty() {
        let mut lr = LineReader::new(&b""[..]);
        assert_eq!(lr.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn too_long() {
        // Exactly at the limit.
        let mut lr = LineReader::with_max_len(8, &b"1234567\n"[..]);
        assert_eq!(lr.read_line().await.unwrap(), Some(&b"1234567\n"[..]));

        // One byte over, with and without a terminator.
        let mut lr = LineReader::with_max_len(8, &b"12345678\n"[..]);
        let e = lr.read_line().await.unwrap_err();
        assert!(matches!(e.downcast_ref::<Error>(), Some(Error::LineTooLong)));

        let mut lr = LineReader::with_max_len(8, &b"123456789"[..]);
        assert!(lr.read_line().await.is_err());

        let long = vec![b'a'; MAX_LINE_LEN * 2];
        let mut lr = LineReader::new(&long[..]);
        assert!(lr.read_line().await.is_err());
    }

    #[tokio::test]
    async fn into_parts() {
        let mut lr = LineReader::new(&b"HTTP/1.0 200 OK\r\nServer: test\r\n\r\nbody"[..]);
        assert_eq!(lr.read_line().await.unwrap(), Some(&b"HTTP/1.0 200 OK\r\n"[..]));

        let (inner, rest) = lr.into_parts();
        assert_eq!(rest, b"Server: test\r\n\r\nbody");
        assert!(inner.is_empty());
    }
}

use bytes::Buf;
use bytes::Bytes;
use bytes::BytesMut;
use memchr::memchr;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

#[derive(Debug)]
pub struct PacketReader<R> {
    inner: R,
    buf: BytesMut,
    max_packet_len: usize,
}

impl<R> PacketReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(8 * 1024),
            max_packet_len: 8 * 1024,
        }
    }

    pub fn max_packet_len(mut self, max: usize) -> Self {
        self.max_packet_len = max.max(1);
        self
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    /// Read one NUL-terminated packet, stripping the terminator and an
    /// optional `\n` right before it.
    ///
    /// Returns:
    /// - `Ok(Some(bytes))` for a packet payload (may be empty),
    /// - `Ok(None)` on clean EOF with no buffered data.
    pub async fn read_packet(&mut self) -> std::io::Result<Option<Bytes>> {
        loop {
            if let Some(i) = memchr(0, &self.buf) {
                let mut payload = self.buf.split_to(i).freeze();
                self.buf.advance(1);
                if payload.last() == Some(&b'\n') {
                    payload.truncate(payload.len() - 1);
                }
                return Ok(Some(payload));
            }

            if self.buf.len() > self.max_packet_len {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "packet too long",
                ));
            }

            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "eof while reading packet",
                ));
            }
        }
    }
}

#[derive(Debug)]
pub struct PacketWriter<W> {
    inner: W,
}

impl<W> PacketWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> PacketWriter<W> {
    /// Write `payload` followed by the NUL terminator.
    ///
    /// The payload must not itself contain a NUL byte.
    pub async fn write_packet(&mut self, payload: &[u8]) -> std::io::Result<()> {
        if memchr(0, payload).is_some() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "payload contains NUL",
            ));
        }
        self.inner.write_all(payload).await?;
        self.inner.write_all(&[0]).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn round_trips_packet() {
        let (a, b) = tokio::io::duplex(64);
        tokio::spawn(async move {
            let mut pw = PacketWriter::new(b);
            pw.write_packet(b"AT12345").await.unwrap();
            pw.flush().await.unwrap();
        });

        let mut pr = PacketReader::new(a);
        let p = pr.read_packet().await.unwrap().unwrap();
        assert_eq!(&p[..], b"AT12345");
    }

    #[tokio::test]
    async fn strips_trailing_newline() {
        let (a, b) = tokio::io::duplex(64);
        tokio::spawn(async move {
            let mut b = b;
            b.write_all(b"GC1\n\x00BN\x00").await.unwrap();
        });

        let mut pr = PacketReader::new(a);
        assert_eq!(&pr.read_packet().await.unwrap().unwrap()[..], b"GC1");
        assert_eq!(&pr.read_packet().await.unwrap().unwrap()[..], b"BN");
        assert!(pr.read_packet().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_packet_is_returned_empty() {
        let (a, b) = tokio::io::duplex(64);
        tokio::spawn(async move {
            let mut b = b;
            b.write_all(b"\x00").await.unwrap();
        });

        let mut pr = PacketReader::new(a);
        let p = pr.read_packet().await.unwrap().unwrap();
        assert!(p.is_empty());
    }

    #[tokio::test]
    async fn rejects_overlong_packet() {
        let (a, b) = tokio::io::duplex(64);
        tokio::spawn(async move {
            let mut b = b;
            let junk = vec![b'x'; 64];
            loop {
                if b.write_all(&junk).await.is_err() {
                    break;
                }
            }
        });

        let mut pr = PacketReader::new(a).max_packet_len(128);
        let err = pr.read_packet().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn refuses_nul_in_payload() {
        let (a, _b) = tokio::io::duplex(64);
        let mut pw = PacketWriter::new(a);
        let err = pw.write_packet(b"bad\x00payload").await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}

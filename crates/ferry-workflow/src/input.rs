use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::AsyncRead;
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;

/// A byte stream used as a run input, for workflows whose start executor
/// consumes streamed data (audio files, uploads) rather than one value.
///
/// Clones share the same underlying stream, which can be taken exactly once.
#[derive(Clone)]
pub struct InputStream {
    inner: Arc<Mutex<Option<BoxStream<'static, std::io::Result<Bytes>>>>>,
    name: Arc<str>,
}

impl InputStream {
    pub fn from_stream(
        name: impl Into<String>,
        stream: BoxStream<'static, std::io::Result<Bytes>>,
    ) -> Self {
        let name: String = name.into();
        Self {
            inner: Arc::new(Mutex::new(Some(stream))),
            name: Arc::from(name),
        }
    }

    pub fn from_reader<R>(name: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::from_stream(name, ReaderStream::new(reader).boxed())
    }

    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        Self::from_stream(name, stream::once(async move { Ok(data) }).boxed())
    }

    /// Open a file for streaming. The stream name is the file name.
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        Ok(Self::from_reader(name, file))
    }

    /// Name hint (usually a file name) carried alongside the data.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the underlying stream. Returns `None` if it was already taken.
    pub async fn take(&self) -> Option<BoxStream<'static, std::io::Result<Bytes>>> {
        self.inner.lock().await.take()
    }

    /// Drain the stream into memory.
    pub async fn read_to_end(&self) -> std::io::Result<Vec<u8>> {
        let mut stream = self.take().await.ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "input stream already consumed")
        })?;
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf)
    }
}

impl std::fmt::Debug for InputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputStream").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_bytes() {
        let input = InputStream::from_bytes("a.mp3", &b"abc"[..]);
        assert_eq!(input.name(), "a.mp3");
        assert_eq!(input.read_to_end().await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_stream_taken_once_across_clones() {
        let input = InputStream::from_bytes("x", &b"data"[..]);
        let clone = input.clone();
        assert!(clone.take().await.is_some());
        assert!(input.take().await.is_none());
        assert!(input.read_to_end().await.is_err());
    }

    #[tokio::test]
    async fn test_from_reader() {
        let reader = std::io::Cursor::new(b"streamed content".to_vec());
        let input = InputStream::from_reader("mem", reader);
        assert_eq!(input.read_to_end().await.unwrap(), b"streamed content");
    }

    #[tokio::test]
    async fn test_open_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut tmp, b"file bytes").unwrap();
        let input = InputStream::open(tmp.path()).await.unwrap();
        assert_eq!(input.read_to_end().await.unwrap(), b"file bytes");
    }
}

//! Sequential stream interface over the stripe engine
//!
//! Wraps an engine with an implicit cursor: `read`/`write` operate at the
//! cursor and advance it by the confirmed byte count, while `read_at`/
//! `write_at` take an explicit offset and leave the cursor alone. Seeking
//! relative to the end is unsupported: the store enforces no object size,
//! so the end is not reliably known.

use crate::backend::BackendObject;
use crate::engine::StripeEngine;
use crate::session::OpenGuard;
use stripeio_common::{Error, PoolId, Result};

/// Origin of a seek
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    /// Relative to the start of the object
    Start,
    /// Relative to the current cursor
    Current,
    /// Relative to the end of the object (always rejected)
    End,
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStream")
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

/// Byte-addressable stream over one open object
pub struct ObjectStream {
    engine: StripeEngine,
    cursor: u64,
    guard: Option<OpenGuard>,
}

impl ObjectStream {
    /// Wrap an engine, with the cursor at the start of the object
    #[must_use]
    pub fn new(engine: StripeEngine) -> Self {
        Self {
            engine,
            cursor: 0,
            guard: None,
        }
    }

    pub(crate) fn with_guard(engine: StripeEngine, guard: OpenGuard) -> Self {
        Self {
            engine,
            cursor: 0,
            guard: Some(guard),
        }
    }

    #[must_use]
    pub fn object(&self) -> &BackendObject {
        self.engine.object()
    }

    /// Pool the object is bound to
    #[must_use]
    pub fn pool_id(&self) -> PoolId {
        self.engine.object().pool
    }

    /// Cached layout geometry of the object
    #[must_use]
    pub fn geometry(&self) -> &crate::geometry::LayoutGeometry {
        self.engine.geometry()
    }

    /// Check whether the object is bound to the given pool
    #[must_use]
    pub fn in_pool(&self, pool: PoolId) -> bool {
        self.pool_id() == pool
    }

    /// Current cursor position
    #[must_use]
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Declared size extended by confirmed writes
    #[must_use]
    pub fn known_size(&self) -> u64 {
        self.engine.known_size()
    }

    /// Read at the cursor, advancing it by the confirmed byte count.
    /// Returns `Ok(0)` at the end of the stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let (n, err) = self.engine.read_some(buf, self.cursor).await;
        self.cursor += n;
        match err {
            Some(e) => Err(e),
            None => Ok(n as usize),
        }
    }

    /// Write at the cursor, advancing it by the confirmed byte count
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let (n, err) = self.engine.write_some(buf, self.cursor).await;
        self.cursor += n;
        match err {
            Some(e) => Err(e),
            None => Ok(n as usize),
        }
    }

    /// Positional read; the cursor is not consulted or moved
    pub async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.engine.read_at(buf, offset).await
    }

    /// Positional write; the cursor is not consulted or moved
    pub async fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize> {
        self.engine.write_at(buf, offset).await
    }

    /// Move the cursor. Returns the new position.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        match whence {
            Whence::Start => {
                if offset < 0 {
                    return Err(Error::invalid_seek(format!(
                        "offset {offset} must be >= 0 when seeking from the start"
                    )));
                }
                self.cursor = offset as u64;
            }
            Whence::Current => {
                let current = i64::try_from(self.cursor)
                    .map_err(|_| Error::invalid_seek("cursor out of range"))?;
                let target = current.checked_add(offset).ok_or_else(|| {
                    Error::invalid_seek(format!("current+{offset} overflows"))
                })?;
                if target < 0 {
                    return Err(Error::invalid_seek(format!(
                        "current+offset ({current}{offset:+}) must be >= 0"
                    )));
                }
                self.cursor = target as u64;
            }
            Whence::End => {
                return Err(Error::not_supported(
                    "the object end is unknown: objects have no backend-enforced size",
                ));
            }
        }
        Ok(self.cursor)
    }

    /// Close the underlying engine and release the session's hold on the
    /// object id
    pub async fn close(&mut self) -> Result<()> {
        let result = self.engine.close().await;
        self.guard.take();
        result
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.engine.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StoreBackend;
    use crate::backend::memory::MemoryBackend;
    use crate::geometry;
    use std::sync::Arc;
    use stripeio_common::{EngineConfig, ObjectId};

    async fn stream_for(backend: Arc<MemoryBackend>, id: ObjectId) -> ObjectStream {
        let obj = backend.create(id, 0, None).await.unwrap();
        let geom = geometry::resolve(backend.as_ref(), &obj).await.unwrap();
        let engine =
            StripeEngine::new(backend, obj, geom, &EngineConfig::default()).unwrap();
        ObjectStream::new(engine)
    }

    #[tokio::test]
    async fn test_cursor_advances_on_read_write() {
        let backend = Arc::new(MemoryBackend::new(stripeio_common::PoolId::new(1, 1)));
        let mut stream = stream_for(backend, ObjectId::new(20, 1)).await;

        stream.write(b"hello").await.unwrap();
        stream.write(b" world").await.unwrap();
        assert_eq!(stream.position(), 11);

        stream.seek(0, Whence::Start).unwrap();
        let mut buf = vec![0u8; 11];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 11);
        assert_eq!(&buf, b"hello world");
        assert_eq!(stream.position(), 11);

        // at the end of the stream reads return zero and stay put
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
        assert_eq!(stream.position(), 11);
    }

    #[tokio::test]
    async fn test_positional_ops_leave_cursor_alone() {
        let backend = Arc::new(MemoryBackend::new(stripeio_common::PoolId::new(1, 1)));
        let mut stream = stream_for(backend, ObjectId::new(20, 2)).await;

        stream.write_at(b"abcd", 4096).await.unwrap();
        assert_eq!(stream.position(), 0);

        let mut buf = [0u8; 4];
        assert_eq!(stream.read_at(&mut buf, 4096).await.unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(stream.position(), 0);
    }

    #[tokio::test]
    async fn test_seek_matrix() {
        let backend = Arc::new(MemoryBackend::new(stripeio_common::PoolId::new(1, 1)));
        let mut stream = stream_for(backend, ObjectId::new(20, 3)).await;

        assert_eq!(stream.seek(100, Whence::Start).unwrap(), 100);
        assert_eq!(stream.seek(-40, Whence::Current).unwrap(), 60);
        assert_eq!(stream.seek(0, Whence::Current).unwrap(), 60);

        assert!(matches!(
            stream.seek(-1, Whence::Start),
            Err(Error::InvalidSeek(_))
        ));
        assert!(matches!(
            stream.seek(-61, Whence::Current),
            Err(Error::InvalidSeek(_))
        ));
        assert!(matches!(
            stream.seek(0, Whence::End),
            Err(Error::NotSupported(_))
        ));

        // rejected seeks leave the cursor untouched
        assert_eq!(stream.position(), 60);
    }

    #[tokio::test]
    async fn test_pool_binding() {
        let pool = stripeio_common::PoolId::new(3, 9);
        let backend = Arc::new(MemoryBackend::new(pool));
        let stream = stream_for(backend, ObjectId::new(20, 4)).await;
        assert_eq!(stream.pool_id(), pool);
        assert!(stream.in_pool(pool));
        assert!(!stream.in_pool(stripeio_common::PoolId::new(1, 1)));
    }
}

//! Session bootstrap
//!
//! One `Session` is constructed per process (or per store) and handed by
//! reference to everything that opens objects; there is no global client
//! state. The session owns the backend handle, the engine configuration,
//! and the registry that enforces at most one open handle per object
//! identifier at a time.

use crate::backend::{BackendObject, StoreBackend};
use crate::engine::StripeEngine;
use crate::geometry;
use crate::stream::ObjectStream;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use stripeio_common::{EngineConfig, Error, ObjectId, PoolId, Result};
use tracing::info;

/// Registry entry keeping an object id reserved while its stream lives
pub(crate) struct OpenGuard {
    registry: Arc<Mutex<HashSet<ObjectId>>>,
    id: ObjectId,
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
    }
}

/// Shared entry point for opening and creating objects
pub struct Session {
    backend: Arc<dyn StoreBackend>,
    config: EngineConfig,
    open_objects: Arc<Mutex<HashSet<ObjectId>>>,
}

impl Session {
    /// Build a session over a backend with a validated configuration
    pub fn new(backend: Arc<dyn StoreBackend>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            open_objects: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn register(&self, id: ObjectId) -> Result<OpenGuard> {
        let mut open = self.open_objects.lock();
        if !open.insert(id) {
            return Err(Error::AlreadyOpen(id));
        }
        Ok(OpenGuard {
            registry: Arc::clone(&self.open_objects),
            id,
        })
    }

    /// Create an object and open a stream over it.
    ///
    /// The size hint selects the object's layout for best I/O on objects of
    /// roughly that size. A pool hint (argument, falling back to the
    /// configured pool) pins the object to a pool; creating over an object
    /// that lives in a different pool fails with `PoolMismatch`.
    pub async fn create(
        &self,
        id: ObjectId,
        size_hint: u64,
        pool: Option<PoolId>,
    ) -> Result<ObjectStream> {
        let guard = self.register(id)?;
        let pool = pool.or(self.config.pool);
        let obj = self.backend.create(id, size_hint, pool).await?;
        self.attach(obj, guard).await
    }

    /// Open an existing object. The size hint bounds reads; without one the
    /// backend's recorded size is used.
    pub async fn open(&self, id: ObjectId, size_hint: Option<u64>) -> Result<ObjectStream> {
        let guard = self.register(id)?;
        let obj = self.backend.open(id, size_hint).await?;
        self.attach(obj, guard).await
    }

    async fn attach(&self, obj: BackendObject, guard: OpenGuard) -> Result<ObjectStream> {
        // geometry is resolved once here and cached for the handle's lifetime
        let geom = geometry::resolve(self.backend.as_ref(), &obj).await?;
        info!(
            object = %obj.id,
            pool = %obj.pool,
            layout = obj.layout,
            unit_size = geom.unit_size,
            "object attached"
        );
        let engine = StripeEngine::new(Arc::clone(&self.backend), obj, geom, &self.config)?;
        Ok(ObjectStream::with_guard(engine, guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    fn session() -> Session {
        let backend = Arc::new(MemoryBackend::new(PoolId::new(1, 1)));
        Session::new(backend, EngineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_second_open_rejected_while_stream_lives() {
        let session = session();
        let id = ObjectId::new(30, 1);
        let stream = session.create(id, 0, None).await.unwrap();

        assert!(matches!(
            session.open(id, None).await,
            Err(Error::AlreadyOpen(_))
        ));
        drop(stream);

        // the registry entry is released with the stream
        session.open(id, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_releases_registry_entry() {
        let session = session();
        let id = ObjectId::new(30, 2);
        let mut stream = session.create(id, 0, None).await.unwrap();
        stream.close().await.unwrap();

        // reopen while the closed stream is still in scope
        session.open(id, None).await.unwrap();
        drop(stream);
    }

    #[tokio::test]
    async fn test_open_missing_object_unregisters() {
        let session = session();
        let id = ObjectId::new(30, 3);
        assert!(session.open(id, None).await.is_err());

        // the failed open must not leave the id reserved
        session.create(id, 0, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_pool_mismatch() {
        let session = session();
        let id = ObjectId::new(30, 4);
        let stream = session.create(id, 0, None).await.unwrap();
        drop(stream);

        let err = session
            .create(id, 0, Some(PoolId::new(9, 9)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PoolMismatch { .. }));
    }

    #[tokio::test]
    async fn test_configured_pool_is_default() {
        let pool = PoolId::new(5, 5);
        let backend = Arc::new(MemoryBackend::new(PoolId::new(1, 1)));
        let config = EngineConfig {
            pool: Some(pool),
            ..EngineConfig::default()
        };
        let session = Session::new(backend, config).unwrap();
        let stream = session.create(ObjectId::new(30, 5), 0, None).await.unwrap();
        assert_eq!(stream.pool_id(), pool);
    }

    #[tokio::test]
    async fn test_round_trip_through_session() {
        let session = session();
        let mut stream = session
            .create(ObjectId::new(30, 6), 1 << 20, None)
            .await
            .unwrap();
        let payload: Vec<u8> = (0..100_000).map(|i| (i % 241) as u8).collect();
        assert_eq!(stream.write(&payload).await.unwrap(), payload.len());

        stream.seek(0, crate::stream::Whence::Start).unwrap();
        let mut back = vec![0u8; payload.len()];
        assert_eq!(stream.read(&mut back).await.unwrap(), payload.len());
        assert_eq!(back, payload);
        stream.close().await.unwrap();
    }
}

//! Directory-backed reference backend
//!
//! Stores each object as a data file plus a JSON sidecar carrying the
//! object's pool binding, layout id and declared size. Gives the CLI and
//! the gateway a working target on a local filesystem; the wire transport
//! of a real cluster is out of scope.

use crate::backend::{BackendObject, BlockOpKind, Extent, StoreBackend};
use crate::geometry::{self, LayoutGeometry};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use std::path::PathBuf;
use stripeio_common::{Error, ObjectId, PoolId, Result, StoreConfig};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Sidecar attributes persisted next to each object's data file
#[derive(Debug, Serialize, Deserialize)]
struct ObjectMeta {
    pool: PoolId,
    layout: u64,
    size_hint: u64,
}

/// Filesystem-backed store rooted at a data directory
pub struct FsBackend {
    config: StoreConfig,
}

impl FsBackend {
    /// Open (creating if needed) a store rooted at `config.data_dir`
    pub async fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        tokio::fs::create_dir_all(&config.data_dir).await?;
        Ok(Self { config })
    }

    fn data_path(&self, id: ObjectId) -> PathBuf {
        let pair = id.as_u128_pair();
        self.config
            .data_dir
            .join(format!("{:016x}-{:016x}.dat", pair.hi, pair.lo))
    }

    fn meta_path(&self, id: ObjectId) -> PathBuf {
        let pair = id.as_u128_pair();
        self.config
            .data_dir
            .join(format!("{:016x}-{:016x}.json", pair.hi, pair.lo))
    }

    async fn load_meta(&self, id: ObjectId) -> Result<Option<ObjectMeta>> {
        match tokio::fs::read(self.meta_path(id)).await {
            Ok(raw) => {
                let meta = serde_json::from_slice(&raw)
                    .map_err(|e| Error::backend(format!("corrupt object attributes: {e}")))?;
                Ok(Some(meta))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store_meta(&self, id: ObjectId, meta: &ObjectMeta) -> Result<()> {
        let raw = serde_json::to_vec_pretty(meta)
            .map_err(|e| Error::backend(format!("encoding object attributes: {e}")))?;
        tokio::fs::write(self.meta_path(id), raw).await?;
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for FsBackend {
    async fn create(
        &self,
        id: ObjectId,
        size_hint: u64,
        pool: Option<PoolId>,
    ) -> Result<BackendObject> {
        let requested = pool.unwrap_or(self.config.pool);
        if let Some(existing) = self.load_meta(id).await? {
            if existing.pool != requested {
                return Err(Error::PoolMismatch {
                    object: id,
                    requested,
                    actual: existing.pool,
                });
            }
        }
        let layout = geometry::layout_for_size(size_hint, self.config.data_units);
        let meta = ObjectMeta {
            pool: requested,
            layout,
            size_hint,
        };
        self.store_meta(id, &meta).await?;
        // truncate any previous incarnation of the data
        File::create(self.data_path(id)).await?;
        Ok(BackendObject {
            id,
            pool: requested,
            layout,
            size_hint,
        })
    }

    async fn open(&self, id: ObjectId, size_hint: Option<u64>) -> Result<BackendObject> {
        let meta = self
            .load_meta(id)
            .await?
            .ok_or_else(|| Error::backend(format!("no such object: {id}")))?;
        Ok(BackendObject {
            id,
            pool: meta.pool,
            layout: meta.layout,
            size_hint: size_hint.unwrap_or(meta.size_hint),
        })
    }

    async fn close(&self, _obj: &BackendObject) -> Result<()> {
        Ok(())
    }

    async fn resolve_geometry(&self, obj: &BackendObject) -> Result<LayoutGeometry> {
        let unit_size = geometry::unit_size_for(obj.layout)
            .ok_or_else(|| Error::layout_not_found(obj.layout, "unknown layout id"))?;
        Ok(LayoutGeometry {
            unit_size,
            data_units: self.config.data_units,
            parity_units: self.config.parity_units,
            spare_units: self.config.spare_units,
            pool_width: self.config.pool_width,
        })
    }

    async fn dispatch_block_op(
        &self,
        obj: &BackendObject,
        kind: BlockOpKind,
        extent: Extent,
        payload: Bytes,
        _attrs: u64,
    ) -> Result<Bytes> {
        let len = usize::try_from(extent.len)
            .map_err(|_| Error::backend("extent length out of range"))?;
        match kind {
            BlockOpKind::Write => {
                if payload.len() != len {
                    return Err(Error::backend("payload does not cover the extent"));
                }
                let mut file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .open(self.data_path(obj.id))
                    .await?;
                file.seek(SeekFrom::Start(extent.offset)).await?;
                file.write_all(&payload).await?;
                file.flush().await?;
                Ok(Bytes::new())
            }
            BlockOpKind::Read => {
                let mut file = File::open(self.data_path(obj.id)).await?;
                let file_len = file.metadata().await?.len();
                let mut out = vec![0u8; len];
                if extent.offset < file_len {
                    let avail = usize::try_from((file_len - extent.offset).min(extent.len))
                        .map_err(|_| Error::backend("extent length out of range"))?;
                    file.seek(SeekFrom::Start(extent.offset)).await?;
                    file.read_exact(&mut out[..avail]).await?;
                }
                Ok(Bytes::from(out))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> StoreConfig {
        StoreConfig {
            data_dir: dir.path().to_path_buf(),
            ..StoreConfig::default()
        }
    }

    #[tokio::test]
    async fn test_create_persists_attributes() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(config(&dir)).await.unwrap();
        let id = ObjectId::new(0xaa, 0xbb);
        let created = backend.create(id, 1 << 20, None).await.unwrap();

        // a fresh backend over the same directory sees the same attributes
        let backend2 = FsBackend::new(config(&dir)).await.unwrap();
        let opened = backend2.open(id, None).await.unwrap();
        assert_eq!(opened.layout, created.layout);
        assert_eq!(opened.size_hint, 1 << 20);
        assert_eq!(opened.pool, created.pool);
    }

    #[tokio::test]
    async fn test_open_missing_object() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(config(&dir)).await.unwrap();
        let err = backend.open(ObjectId::new(1, 1), None).await.unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(config(&dir)).await.unwrap();
        let obj = backend.create(ObjectId::new(2, 2), 0, None).await.unwrap();
        let gs = 16384usize;
        let payload: Vec<u8> = (0..gs).map(|i| (i % 251) as u8).collect();
        backend
            .dispatch_block_op(
                &obj,
                BlockOpKind::Write,
                Extent::new(0, gs as u64),
                Bytes::from(payload.clone()),
                0,
            )
            .await
            .unwrap();
        let back = backend
            .dispatch_block_op(
                &obj,
                BlockOpKind::Read,
                Extent::new(0, gs as u64),
                Bytes::new(),
                0,
            )
            .await
            .unwrap();
        assert_eq!(&back[..], &payload[..]);
    }
}

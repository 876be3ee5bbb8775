//! Persistent curse state storage.
//!
//! [`RocksStore`] implements [`CurseStore`] with two RocksDB column families:
//! `entities` (16-byte entity id → bincode [`CurseSnapshot`]) and
//! `exemptions` (entity id → empty value). [`MemoryStore`] keeps the same
//! encoded bytes in memory for ephemeral runs and tests.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use parking_lot::RwLock;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};

use abyss_core::error::StorageError;
use abyss_core::traits::CurseStore;
use abyss_core::types::{CurseSnapshot, EntityId};

// --- Column family names ---

const CF_ENTITIES: &str = "entities";
const CF_EXEMPTIONS: &str = "exemptions";

/// All column family names.
const ALL_CFS: &[&str] = &[CF_ENTITIES, CF_EXEMPTIONS];

fn decode_snapshot(id: &EntityId, bytes: &[u8]) -> Result<CurseSnapshot, StorageError> {
    CurseSnapshot::decode(bytes).map_err(|e| StorageError::Corrupt {
        entity: id.to_string(),
        reason: e.to_string(),
    })
}

fn encode_snapshot(snapshot: &CurseSnapshot) -> Result<Vec<u8>, StorageError> {
    snapshot.encode().map_err(|e| StorageError::Encode(e.to_string()))
}

/// RocksDB-backed curse state storage.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a RocksDB database at the given path, creating missing
    /// column families.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(Self { db })
    }

    fn cf_handle(&self, name: &'static str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or(StorageError::MissingColumnFamily(name))
    }

    /// Number of stored entity snapshots. Walks the column family.
    pub fn entity_count(&self) -> Result<usize, StorageError> {
        let cf = self.cf_handle(CF_ENTITIES)?;
        let mut count = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item.map_err(|e| StorageError::Backend(e.to_string()))?;
            count += 1;
        }
        Ok(count)
    }

    /// Write raw bytes for an entity, bypassing the codec.
    pub fn put_raw(&self, id: &EntityId, bytes: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf_handle(CF_ENTITIES)?;
        self.db
            .put_cf(cf, id.as_bytes(), bytes)
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}

impl CurseStore for RocksStore {
    fn load(&self, id: &EntityId) -> Result<Option<CurseSnapshot>, StorageError> {
        let cf = self.cf_handle(CF_ENTITIES)?;
        match self
            .db
            .get_cf(cf, id.as_bytes())
            .map_err(|e| StorageError::Backend(e.to_string()))?
        {
            Some(bytes) => decode_snapshot(id, &bytes).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, id: &EntityId, snapshot: &CurseSnapshot) -> Result<(), StorageError> {
        let bytes = encode_snapshot(snapshot)?;
        self.put_raw(id, &bytes)
    }

    fn load_exemptions(&self) -> Result<Vec<EntityId>, StorageError> {
        let cf = self.cf_handle(CF_EXEMPTIONS)?;
        let mut ids = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StorageError::Backend(e.to_string()))?;
            let bytes = <[u8; 16]>::try_from(&key[..]).map_err(|_| StorageError::Corrupt {
                entity: hex::encode(&key[..]),
                reason: format!("exemption key has {} bytes", key.len()),
            })?;
            ids.push(EntityId::from_bytes(bytes));
        }
        Ok(ids)
    }

    fn save_exemption(&self, id: &EntityId) -> Result<(), StorageError> {
        let cf = self.cf_handle(CF_EXEMPTIONS)?;
        self.db
            .put_cf(cf, id.as_bytes(), b"")
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn remove_exemption(&self, id: &EntityId) -> Result<(), StorageError> {
        let cf = self.cf_handle(CF_EXEMPTIONS)?;
        self.db
            .delete_cf(cf, id.as_bytes())
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn flush(&self) -> Result<(), StorageError> {
        for name in ALL_CFS {
            let cf = self.cf_handle(*name)?;
            self.db
                .flush_cf(cf)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        Ok(())
    }
}

/// In-memory storage holding the same encoded bytes as [`RocksStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: RwLock<HashMap<EntityId, Vec<u8>>>,
    exemptions: RwLock<BTreeSet<EntityId>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write raw bytes for an entity, bypassing the codec.
    pub fn put_raw(&self, id: EntityId, bytes: Vec<u8>) {
        self.entities.write().insert(id, bytes);
    }

    pub fn entity_count(&self) -> usize {
        self.entities.read().len()
    }
}

impl CurseStore for MemoryStore {
    fn load(&self, id: &EntityId) -> Result<Option<CurseSnapshot>, StorageError> {
        match self.entities.read().get(id) {
            Some(bytes) => decode_snapshot(id, bytes).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, id: &EntityId, snapshot: &CurseSnapshot) -> Result<(), StorageError> {
        let bytes = encode_snapshot(snapshot)?;
        self.entities.write().insert(*id, bytes);
        Ok(())
    }

    fn load_exemptions(&self) -> Result<Vec<EntityId>, StorageError> {
        Ok(self.exemptions.read().iter().copied().collect())
    }

    fn save_exemption(&self, id: &EntityId) -> Result<(), StorageError> {
        self.exemptions.write().insert(*id);
        Ok(())
    }

    fn remove_exemption(&self, id: &EntityId) -> Result<(), StorageError> {
        self.exemptions.write().remove(id);
        Ok(())
    }
}

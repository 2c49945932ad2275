//! Key material store: durable per-account seed cache.
//!
//! The store holds seeds, never keypairs. A cached seed lets an identity be
//! re-derived without prompting the signer again.

use std::{
    collections::HashMap,
    path::Path,
    sync::{PoisonError, RwLock},
};

use lockbox_crypto::Seed;
use redb::{Database, ReadableTable, TableDefinition, TableError};

use crate::{error::StoreError, identity::AccountId};

/// Durable key-value store of seeds keyed by account.
///
/// Calls are synchronous and expected to be short.
pub trait KeyMaterialStore: Send + Sync {
    /// Cached seed for `account`, if any.
    fn get(&self, account: &AccountId) -> Result<Option<Seed>, StoreError>;

    /// Cache `seed` for `account`, replacing any previous value.
    fn set(&self, account: &AccountId, seed: &Seed) -> Result<(), StoreError>;

    /// Drop the cached seed. Returns true if one was present.
    fn remove(&self, account: &AccountId) -> Result<bool, StoreError>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    seeds: RwLock<HashMap<AccountId, Seed>>,
}

impl MemoryKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached seeds.
    pub fn len(&self) -> usize {
        self.seeds.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if no seed is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyMaterialStore for MemoryKeyStore {
    fn get(&self, account: &AccountId) -> Result<Option<Seed>, StoreError> {
        let seeds = self.seeds.read().unwrap_or_else(PoisonError::into_inner);
        Ok(seeds.get(account).cloned())
    }

    fn set(&self, account: &AccountId, seed: &Seed) -> Result<(), StoreError> {
        let mut seeds = self.seeds.write().unwrap_or_else(PoisonError::into_inner);
        seeds.insert(account.clone(), seed.clone());
        Ok(())
    }

    fn remove(&self, account: &AccountId) -> Result<bool, StoreError> {
        let mut seeds = self.seeds.write().unwrap_or_else(PoisonError::into_inner);
        Ok(seeds.remove(account).is_some())
    }
}

const SEEDS: TableDefinition<&str, &[u8]> = TableDefinition::new("seeds");

/// Single-file persistent store backed by `redb`.
pub struct RedbKeyStore {
    db: Database,
}

impl RedbKeyStore {
    /// Open the database at `path`, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(backend)?;
        tracing::debug!(path = %path.as_ref().display(), "opened key store");
        Ok(Self { db })
    }
}

impl KeyMaterialStore for RedbKeyStore {
    fn get(&self, account: &AccountId) -> Result<Option<Seed>, StoreError> {
        let txn = self.db.begin_read().map_err(backend)?;
        let table = match txn.open_table(SEEDS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(backend(e)),
        };
        let seed = table.get(account.as_str()).map_err(backend)?;
        Ok(seed.map(|guard| Seed::new(guard.value().to_vec())))
    }

    fn set(&self, account: &AccountId, seed: &Seed) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(SEEDS).map_err(backend)?;
            table.insert(account.as_str(), seed.as_bytes()).map_err(backend)?;
        }
        txn.commit().map_err(backend)?;
        Ok(())
    }

    fn remove(&self, account: &AccountId) -> Result<bool, StoreError> {
        let txn = self.db.begin_write().map_err(backend)?;
        let removed = {
            let mut table = txn.open_table(SEEDS).map_err(backend)?;
            let previous = table.remove(account.as_str()).map_err(backend)?;
            previous.is_some()
        };
        txn.commit().map_err(backend)?;
        Ok(removed)
    }
}

fn backend(e: impl Into<redb::Error>) -> StoreError {
    StoreError::Backend { reason: e.into().to_string() }
}

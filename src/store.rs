//! Key-value storage partition for claims and receipts.
//!
//! The audit keeper only sees the [`KvStore`] trait. A state transition
//! stages its writes in a [`StoreTxn`] and commits them in one step once
//! every check has passed, so a failed transition leaves the store untouched.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::trace;

/// Ordered byte-keyed storage.
pub trait KvStore {
    /// Value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend fails.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend fails.
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;

    /// Remove `key`.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend fails.
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Every entry whose key starts with `prefix`, in key order.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend fails.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Every entry with `start <= key < end`, in key order.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend fails.
    fn scan_range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// In-memory [`KvStore`].
#[derive(Debug, Default, Clone)]
pub struct MemStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn scan_range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(self
            .entries
            .range(start.to_vec()..end.to_vec())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Write buffer over a [`KvStore`].
///
/// Reads see staged writes. Nothing reaches the underlying store until
/// [`StoreTxn::commit`]; dropping the transaction discards it.
pub struct StoreTxn<'a, S: KvStore + ?Sized> {
    base: &'a mut S,
    /// `None` marks a staged delete.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a, S: KvStore + ?Sized> StoreTxn<'a, S> {
    /// Start a transaction over `base`.
    pub fn new(base: &'a mut S) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    /// Number of staged writes.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.writes.len()
    }

    /// Apply staged writes to the underlying store.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend fails.
    pub fn commit(self) -> Result<()> {
        trace!("Committing {} staged writes", self.writes.len());
        for (key, value) in self.writes {
            match value {
                Some(v) => self.base.set(key, v)?,
                None => self.base.delete(&key)?,
            }
        }
        Ok(())
    }
}

impl<S: KvStore + ?Sized> KvStore for StoreTxn<'_, S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(staged) => Ok(staged.clone()),
            None => self.base.get(key),
        }
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.writes.insert(key, Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.base.scan_prefix(prefix)?.into_iter().collect();
        for (key, value) in self
            .writes
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    fn scan_range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        if start >= end {
            return Ok(Vec::new());
        }
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.base.scan_range(start, end)?.into_iter().collect();
        for (key, value) in self.writes.range(start.to_vec()..end.to_vec()) {
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

/// Decode the MessagePack value stored under `key`.
///
/// # Errors
///
/// Returns `Serialization` if the stored bytes do not decode as `T`.
pub fn get_typed<T: DeserializeOwned, S: KvStore + ?Sized>(
    store: &S,
    key: &[u8],
) -> Result<Option<T>> {
    store
        .get(key)?
        .map(|bytes| rmp_serde::from_slice(&bytes).map_err(Error::from))
        .transpose()
}

/// Encode `value` as MessagePack and store it under `key`.
///
/// # Errors
///
/// Returns `Serialization` if encoding fails.
pub fn put_typed<T: Serialize, S: KvStore + ?Sized>(
    store: &mut S,
    key: Vec<u8>,
    value: &T,
) -> Result<()> {
    let bytes = rmp_serde::to_vec_named(value)?;
    store.set(key, bytes)
}

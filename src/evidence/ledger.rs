//! Per-session accumulation of locally observed relay proofs.
//!
//! The ledger is populated by the relay-serving path, which handles many
//! requests in parallel. Each `(session, evidence type)` sequence sits behind
//! its own mutex, so appends to different sessions never contend, while
//! appends to one session are serialized and keep insertion order. The outer
//! map is bounded in sessions; once full, records for new sessions are
//! rejected until a settled or expired session is released. Its lock is only
//! held long enough to find, create or remove a per-session entry.

use crate::config::EvidenceConfig;
use crate::error::{Error, Result};
use crate::evidence::record::RelayProof;
use crate::merkle::{MerkleProof, MerkleRoot, MerkleTree};
use crate::session::EvidenceKey;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Ordered evidence sequence for one session and evidence type.
#[derive(Debug, Clone)]
pub struct Evidence {
    key: EvidenceKey,
    records: Vec<RelayProof>,
    sealed: bool,
}

impl Evidence {
    fn new(key: EvidenceKey) -> Self {
        Self {
            key,
            records: Vec::new(),
            sealed: false,
        }
    }

    /// Key of this sequence.
    #[must_use]
    pub fn key(&self) -> &EvidenceKey {
        &self.key
    }

    /// Records in insertion order.
    #[must_use]
    pub fn records(&self) -> &[RelayProof] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.records.len() as u64
    }

    /// Whether the sequence holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether a claim has sealed this sequence.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Build the Merkle tree over the records.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence is empty.
    pub fn merkle_tree(&self) -> Result<MerkleTree> {
        MerkleTree::from_leaves(self.records.iter().map(RelayProof::leaf_hash).collect())
    }

    /// Root committing to the records.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence is empty.
    pub fn merkle_root(&self) -> Result<MerkleRoot> {
        Ok(self.merkle_tree()?.root())
    }

    /// Record at `index` and its inclusion proof.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of range.
    pub fn merkle_proof(&self, index: u64) -> Result<(RelayProof, MerkleProof)> {
        let record = self.record(index)?;
        let proof = self.merkle_tree()?.proof(index)?;
        Ok((record, proof))
    }

    fn record(&self, index: u64) -> Result<RelayProof> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.records.get(i))
            .cloned()
            .ok_or_else(|| {
                Error::EvidenceNotFound(format!(
                    "{}: no record at index {index} ({} held)",
                    self.key,
                    self.records.len()
                ))
            })
    }
}

/// Ledger statistics for monitoring.
#[derive(Debug, Default, Clone)]
pub struct LedgerStats {
    /// Records appended.
    pub appended: u64,
    /// Appends rejected because the sequence was sealed or full, or the
    /// ledger was at its session capacity.
    pub rejected: u64,
    /// Records dropped by [`EvidenceLedger::clear`] and [`EvidenceLedger::clear_all`].
    pub cleared: u64,
}

/// Process-local store of evidence sequences keyed by session and evidence type.
///
/// Cloning the ledger yields another handle to the same sequences.
///
/// Lock order is always sequence, then session map. A sequence only leaves
/// the map while its own lock is held, so a writer holding that lock can
/// trust a membership check for as long as it keeps the lock.
#[derive(Clone)]
pub struct EvidenceLedger {
    sessions: Arc<Mutex<LruCache<EvidenceKey, Arc<Mutex<Evidence>>>>>,
    stats: Arc<Mutex<LedgerStats>>,
    session_capacity: NonZeroUsize,
    max_records_per_session: usize,
}

impl EvidenceLedger {
    /// Create a ledger with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&EvidenceConfig::default())
    }

    /// Create a ledger with the given limits.
    #[must_use]
    pub fn with_config(config: &EvidenceConfig) -> Self {
        let cap = NonZeroUsize::new(config.session_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Arc::new(Mutex::new(LruCache::new(cap))),
            stats: Arc::new(Mutex::new(LedgerStats::default())),
            session_capacity: cap,
            max_records_per_session: config.max_records_per_session,
        }
    }

    fn entry(&self, key: &EvidenceKey) -> Option<Arc<Mutex<Evidence>>> {
        self.sessions.lock().get(key).cloned()
    }

    fn entry_or_insert(&self, key: &EvidenceKey) -> Result<Arc<Mutex<Evidence>>> {
        let mut sessions = self.sessions.lock();
        if let Some(entry) = sessions.get(key) {
            return Ok(Arc::clone(entry));
        }

        // Held sequences back claims that may still be audited, so a full
        // ledger turns new sessions away instead of evicting.
        if sessions.len() >= self.session_capacity.get() {
            let stalest = sessions
                .peek_lru()
                .map_or_else(String::new, |(k, _)| k.to_string());
            drop(sessions);
            warn!(
                "Evidence ledger holds {} sessions, rejecting {key} (least recently used: {stalest})",
                self.session_capacity
            );
            self.stats.lock().rejected += 1;
            return Err(Error::EvidenceLimitReached {
                key: key.to_string(),
                limit: self.session_capacity.get(),
            });
        }

        let entry = Arc::new(Mutex::new(Evidence::new(key.clone())));
        sessions.put(key.clone(), Arc::clone(&entry));
        trace!("Opened evidence for {key}");
        Ok(entry)
    }

    fn is_held(&self, key: &EvidenceKey, entry: &Arc<Mutex<Evidence>>) -> bool {
        self.sessions
            .lock()
            .peek(key)
            .is_some_and(|held| Arc::ptr_eq(held, entry))
    }

    /// Append a record to the end of its session's sequence.
    ///
    /// Returns the index assigned to the record.
    ///
    /// # Errors
    ///
    /// Returns `EvidenceSealed` if a claim already sealed the sequence, or
    /// `EvidenceLimitReached` if the sequence is full or the ledger already
    /// holds its capacity of other sessions.
    pub fn append(&self, record: RelayProof) -> Result<u64> {
        let key = EvidenceKey::new(record.session_header(), record.evidence_type);
        loop {
            let entry = self.entry_or_insert(&key)?;
            let mut evidence = entry.lock();
            if !self.is_held(&key, &entry) {
                // Cleared between lookup and lock.
                continue;
            }

            if evidence.sealed {
                self.stats.lock().rejected += 1;
                return Err(Error::EvidenceSealed(key.to_string()));
            }
            if evidence.records.len() >= self.max_records_per_session {
                self.stats.lock().rejected += 1;
                return Err(Error::EvidenceLimitReached {
                    key: key.to_string(),
                    limit: self.max_records_per_session,
                });
            }

            let index = evidence.len();
            evidence.records.push(record);
            self.stats.lock().appended += 1;
            trace!("Appended record {index} to {key}");
            return Ok(index);
        }
    }

    /// Number of records held for `key`, zero if none.
    #[must_use]
    pub fn count(&self, key: &EvidenceKey) -> u64 {
        self.entry(key).map_or(0, |e| e.lock().len())
    }

    /// Snapshot of the sequence for `key`.
    #[must_use]
    pub fn get(&self, key: &EvidenceKey) -> Option<Evidence> {
        self.entry(key).map(|e| e.lock().clone())
    }

    /// Run `f` against the sequence for `key` while holding its lock.
    ///
    /// # Errors
    ///
    /// Returns `EvidenceNotFound` if the key is unknown, or whatever `f` returns.
    pub fn with_evidence<R>(
        &self,
        key: &EvidenceKey,
        f: impl FnOnce(&Evidence) -> Result<R>,
    ) -> Result<R> {
        let entry = self
            .entry(key)
            .ok_or_else(|| Error::EvidenceNotFound(key.to_string()))?;
        let evidence = entry.lock();
        f(&evidence)
    }

    /// Record at `index` in the sequence for `key`.
    ///
    /// # Errors
    ///
    /// Returns `EvidenceNotFound` if the key or index is unknown.
    pub fn get_proof(&self, key: &EvidenceKey, index: u64) -> Result<RelayProof> {
        self.with_evidence(key, |evidence| evidence.record(index))
    }

    /// Seal the sequence for `key` against further appends and return a snapshot.
    ///
    /// Sealing is idempotent.
    ///
    /// # Errors
    ///
    /// Returns `EvidenceNotFound` if the key is unknown or holds no records.
    pub fn seal(&self, key: &EvidenceKey) -> Result<Evidence> {
        let entry = self
            .entry(key)
            .ok_or_else(|| Error::EvidenceNotFound(key.to_string()))?;
        let mut evidence = entry.lock();
        if evidence.is_empty() {
            return Err(Error::EvidenceNotFound(format!("{key}: no records")));
        }
        if !evidence.sealed {
            evidence.sealed = true;
            debug!("Sealed {key} with {} records", evidence.len());
        }
        Ok(evidence.clone())
    }

    /// Remove `entry` from the map if it is still the one held for `key`.
    /// Returns the number of records dropped.
    fn remove(&self, key: &EvidenceKey, entry: &Arc<Mutex<Evidence>>) -> Option<u64> {
        let evidence = entry.lock();
        let mut sessions = self.sessions.lock();
        if !sessions
            .peek(key)
            .is_some_and(|held| Arc::ptr_eq(held, entry))
        {
            return None;
        }
        sessions.pop(key);
        drop(sessions);

        let dropped = evidence.len();
        self.stats.lock().cleared += dropped;
        Some(dropped)
    }

    /// Drop the sequence for `key`. Returns whether anything was removed.
    pub fn clear(&self, key: &EvidenceKey) -> bool {
        let Some(entry) = self.entry(key) else {
            return false;
        };
        match self.remove(key, &entry) {
            Some(dropped) => {
                debug!("Cleared {dropped} records for {key}");
                true
            }
            None => false,
        }
    }

    /// Drop every sequence.
    pub fn clear_all(&self) {
        let held: Vec<_> = self
            .sessions
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();
        let dropped: u64 = held
            .iter()
            .filter_map(|(key, entry)| self.remove(key, entry))
            .sum();
        debug!("Cleared {} sessions, {dropped} records", held.len());
    }

    /// Number of sequences held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no sequences are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> LedgerStats {
        self.stats.lock().clone()
    }
}

impl Default for EvidenceLedger {
    fn default() -> Self {
        Self::new()
    }
}

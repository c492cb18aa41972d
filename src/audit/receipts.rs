//! Receipt ledger: settled totals consumed by reward computation.

use crate::error::{Error, Result};
use crate::session::{Address, ClaimKey, EvidenceType, SessionHeader};
use crate::store::{get_typed, put_typed, KvStore};
use serde::{Deserialize, Serialize};

/// Storage table prefix for receipts.
pub(crate) const RECEIPT_PREFIX: u8 = 0x02;

/// Payable outcome of a successfully audited claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Session the work was done in.
    pub header: SessionHeader,
    /// Servicer that did the work.
    pub servicer_address: Address,
    /// Number of records settled.
    pub total: u64,
    /// Kind of evidence settled.
    pub evidence_type: EvidenceType,
}

impl Receipt {
    /// Key under which the receipt is stored.
    #[must_use]
    pub fn key(&self) -> ClaimKey {
        ClaimKey::new(self.servicer_address, self.header.clone(), self.evidence_type)
    }
}

fn receipt_store_key(key: &ClaimKey) -> Vec<u8> {
    let mut buf = vec![RECEIPT_PREFIX];
    key.encode_into(&mut buf);
    buf
}

/// Write `receipt`.
///
/// # Errors
///
/// Returns `DuplicateReceipt` if one already exists for the same key.
pub(crate) fn put_receipt<S: KvStore + ?Sized>(store: &mut S, receipt: &Receipt) -> Result<()> {
    let key = receipt.key();
    let store_key = receipt_store_key(&key);
    if store.get(&store_key)?.is_some() {
        return Err(Error::DuplicateReceipt(key.to_string()));
    }
    put_typed(store, store_key, receipt)
}

/// Receipt for `key`, if any.
pub(crate) fn get_receipt<S: KvStore + ?Sized>(store: &S, key: &ClaimKey) -> Result<Option<Receipt>> {
    get_typed(store, &receipt_store_key(key))
}

/// Every receipt of `servicer`, in key order.
pub(crate) fn receipts_for_servicer<S: KvStore + ?Sized>(
    store: &S,
    servicer: &Address,
) -> Result<Vec<Receipt>> {
    let mut prefix = vec![RECEIPT_PREFIX];
    prefix.extend_from_slice(servicer.as_bytes());
    decode_all(store.scan_prefix(&prefix)?)
}

/// Every receipt, in key order.
pub(crate) fn all_receipts<S: KvStore + ?Sized>(store: &S) -> Result<Vec<Receipt>> {
    decode_all(store.scan_prefix(&[RECEIPT_PREFIX])?)
}

fn decode_all(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<Vec<Receipt>> {
    entries
        .into_iter()
        .map(|(_, bytes)| rmp_serde::from_slice(&bytes).map_err(Error::from))
        .collect()
}

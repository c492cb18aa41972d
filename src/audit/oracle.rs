//! Pseudorandom selection of the leaf a claim must reveal.
//!
//! The index is a pure function of a block hash that does not exist yet when
//! the claim is submitted, the session header and the claimed leaf count.
//! Every validating node reads the same finalized block and derives the same
//! index; nothing node-local enters the computation.

use crate::chain::ChainContext;
use crate::config::AuditParams;
use crate::error::{Error, Result};
use crate::merkle::Hash32;
use crate::session::{BlockHeight, SessionHeader};
use sha2::{Digest, Sha256};
use tracing::debug;

const INDEX_DOMAIN: &[u8] = b"relay-audit/audit-index/v1";

/// Heights bounding the audit of one session's claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditWindow {
    /// Height whose block hash seeds the audit index. Claims must be
    /// submitted before it; proofs are accepted from it onwards.
    pub lookahead_height: BlockHeight,
    /// Last height at which a proof is accepted.
    pub expiry_height: BlockHeight,
}

impl AuditWindow {
    /// Window for `header` under `params`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClaimParameters` if a height overflows.
    pub fn for_session(params: &AuditParams, header: &SessionHeader) -> Result<Self> {
        Ok(Self {
            lookahead_height: params.lookahead_height(header)?,
            expiry_height: params.expiry_height(header)?,
        })
    }

    /// Whether a claim may still be submitted at `height`.
    #[must_use]
    pub fn accepts_claim_at(&self, height: BlockHeight) -> bool {
        height < self.lookahead_height
    }

    /// Whether the window closed before `height`.
    #[must_use]
    pub fn is_expired_at(&self, height: BlockHeight) -> bool {
        height > self.expiry_height
    }

    /// Check that a proof may be submitted at `height`.
    ///
    /// # Errors
    ///
    /// Returns `AuditWindowNotYetOpen` before the lookahead height and
    /// `ClaimExpired` after the expiry height.
    pub fn check_proof_at(&self, height: BlockHeight) -> Result<()> {
        if height < self.lookahead_height {
            return Err(Error::AuditWindowNotYetOpen {
                lookahead_height: self.lookahead_height,
                current_height: height,
            });
        }
        if self.is_expired_at(height) {
            return Err(Error::ClaimExpired {
                expiry_height: self.expiry_height,
                current_height: height,
            });
        }
        Ok(())
    }
}

/// Reduce `entropy`, `header` and `total` to an index in `0..total`.
///
/// The first 16 bytes of the SHA-256 digest are read as a big-endian `u128`
/// and reduced modulo `total`.
///
/// # Errors
///
/// Returns `InvalidClaimParameters` if `total` is zero.
pub fn index_from_entropy(entropy: &Hash32, header: &SessionHeader, total: u64) -> Result<u64> {
    if total == 0 {
        return Err(Error::InvalidClaimParameters(
            "cannot audit a claim with zero records".to_string(),
        ));
    }

    let mut buf = Vec::with_capacity(INDEX_DOMAIN.len() + 64 + header.application_key.len());
    buf.extend_from_slice(INDEX_DOMAIN);
    buf.extend_from_slice(entropy);
    header.encode_into(&mut buf);
    buf.extend_from_slice(&total.to_be_bytes());
    let digest: Hash32 = Sha256::digest(&buf).into();

    let mut wide = [0u8; 16];
    wide.copy_from_slice(&digest[..16]);
    let reduced = u128::from_be_bytes(wide) % u128::from(total);
    // reduced < total <= u64::MAX
    u64::try_from(reduced).map_err(|_| {
        Error::InvalidClaimParameters(format!("index {reduced} does not fit in u64"))
    })
}

/// Derive the audit index for a claim on `header` covering `total` records.
///
/// # Errors
///
/// Returns `FutureContextUnavailable` if the lookahead block cannot be read
/// yet; callers retry once it is finalized. Returns `InvalidClaimParameters`
/// if `total` is zero.
pub fn pseudorandom_index<C: ChainContext + ?Sized>(
    ctx: &C,
    header: &SessionHeader,
    total: u64,
) -> Result<u64> {
    let lookahead = ctx.audit_params().lookahead_height(header)?;
    index_at(ctx, lookahead, header, total)
}

/// Derive the audit index using the block at `lookahead` as entropy.
///
/// Stored claims pin their lookahead height at submission and audit through
/// this function, so later parameter changes do not move their index.
///
/// # Errors
///
/// Same as [`pseudorandom_index`].
pub fn index_at<C: ChainContext + ?Sized>(
    ctx: &C,
    lookahead: BlockHeight,
    header: &SessionHeader,
    total: u64,
) -> Result<u64> {
    let block = ctx.context_at(lookahead)?;
    let index = index_from_entropy(&block.block_hash, header, total)?;
    debug!(
        "Audit index for {header} is {index} of {total} (entropy from height {lookahead})"
    );
    Ok(index)
}

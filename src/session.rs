//! Session identity types shared by the evidence, claim and receipt ledgers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Block height on the chain.
pub type BlockHeight = u64;

/// Length of an account address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Account address of a servicer or claimant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// Raw address bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| Error::InvalidClaimParameters(format!("address is not hex: {e}")))?;
        let raw: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::InvalidClaimParameters(format!(
                "address must be {ADDRESS_LEN} bytes, got {}",
                b.len()
            ))
        })?;
        Ok(Self(raw))
    }
}

/// Kind of service proved by a piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceType {
    /// Relays served to an application.
    Relay,
    /// Challenges raised against another servicer's responses.
    Challenge,
}

impl EvidenceType {
    /// Stable one-byte tag used in hashes and storage keys.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Relay => 1,
            Self::Challenge => 2,
        }
    }
}

impl fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relay => f.write_str("relay"),
            Self::Challenge => f.write_str("challenge"),
        }
    }
}

/// Identifies a unique session: which application, on which target chain,
/// starting at which height.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionHeader {
    /// Hex-encoded public key of the application being served.
    pub application_key: String,
    /// Identifier of the external chain the relays target.
    pub chain: String,
    /// Height at which the session started.
    pub session_start_height: BlockHeight,
}

impl SessionHeader {
    /// Create a new session header.
    #[must_use]
    pub fn new(
        application_key: impl Into<String>,
        chain: impl Into<String>,
        session_start_height: BlockHeight,
    ) -> Self {
        Self {
            application_key: application_key.into(),
            chain: chain.into(),
            session_start_height,
        }
    }

    /// Check that every field is populated.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClaimParameters` if a field is empty or the start height is zero.
    pub fn validate(&self) -> Result<()> {
        if self.application_key.is_empty() {
            return Err(Error::InvalidClaimParameters(
                "session header has empty application key".to_string(),
            ));
        }
        if self.chain.is_empty() {
            return Err(Error::InvalidClaimParameters(
                "session header has empty chain".to_string(),
            ));
        }
        if self.session_start_height == 0 {
            return Err(Error::InvalidClaimParameters(
                "session start height must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Append an unambiguous encoding of the header to `buf`.
    ///
    /// Variable-length fields are length-prefixed so that no two distinct
    /// headers share an encoding.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        put_bytes(buf, self.application_key.as_bytes());
        put_bytes(buf, self.chain.as_bytes());
        buf.extend_from_slice(&self.session_start_height.to_be_bytes());
    }
}

impl fmt::Display for SessionHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.application_key, self.chain, self.session_start_height
        )
    }
}

/// Key of one ordered evidence sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EvidenceKey {
    /// Session the evidence was produced in.
    pub header: SessionHeader,
    /// Kind of evidence.
    pub evidence_type: EvidenceType,
}

impl EvidenceKey {
    /// Create a new evidence key.
    #[must_use]
    pub fn new(header: SessionHeader, evidence_type: EvidenceType) -> Self {
        Self {
            header,
            evidence_type,
        }
    }
}

impl fmt::Display for EvidenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.header, self.evidence_type)
    }
}

/// Unique key of a claim or a receipt: who, for which session, for which evidence type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClaimKey {
    /// Claimant (servicer) address.
    pub address: Address,
    /// Session the claim covers.
    pub header: SessionHeader,
    /// Kind of evidence committed to.
    pub evidence_type: EvidenceType,
}

impl ClaimKey {
    /// Create a new claim key.
    #[must_use]
    pub fn new(address: Address, header: SessionHeader, evidence_type: EvidenceType) -> Self {
        Self {
            address,
            header,
            evidence_type,
        }
    }

    /// Append the key's storage encoding to `buf`.
    ///
    /// The address comes first so a prefix scan over it lists every key for
    /// one servicer.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.address.as_bytes());
        self.header.encode_into(buf);
        buf.push(self.evidence_type.tag());
    }
}

impl fmt::Display for ClaimKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.address, self.header, self.evidence_type)
    }
}

/// Append `bytes` prefixed by its big-endian `u32` length.
pub(crate) fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    // Field lengths are bounded far below u32::MAX by the callers.
    #[allow(clippy::cast_possible_truncation)]
    let len = bytes.len() as u32;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(bytes);
}

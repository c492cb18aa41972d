//! Configuration for relay-audit.

use crate::error::{Error, Result};
use crate::session::{BlockHeight, SessionHeader};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Governance parameters that shape the claim and audit windows.
///
/// On a live chain these are read from the parameter store through the
/// chain context; the configured values seed development chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditParams {
    /// Number of sessions after a session's start before its audit entropy exists.
    #[serde(default = "default_claim_submission_window")]
    pub claim_submission_window: u64,

    /// Blocks per session.
    #[serde(default = "default_blocks_per_session")]
    pub blocks_per_session: u64,

    /// Number of sessions after the lookahead height during which a proof is accepted.
    #[serde(default = "default_claim_expiration_sessions")]
    pub claim_expiration_sessions: u64,
}

impl Default for AuditParams {
    fn default() -> Self {
        Self {
            claim_submission_window: default_claim_submission_window(),
            blocks_per_session: default_blocks_per_session(),
            claim_expiration_sessions: default_claim_expiration_sessions(),
        }
    }
}

impl AuditParams {
    /// Check that every window is non-empty.
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the first zero parameter.
    pub fn validate(&self) -> Result<()> {
        if self.claim_submission_window == 0 {
            return Err(Error::Config(
                "claim_submission_window must be positive".to_string(),
            ));
        }
        if self.blocks_per_session == 0 {
            return Err(Error::Config("blocks_per_session must be positive".to_string()));
        }
        if self.claim_expiration_sessions == 0 {
            return Err(Error::Config(
                "claim_expiration_sessions must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Height whose block hash seeds the audit index for `header`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClaimParameters` if the height overflows.
    pub fn lookahead_height(&self, header: &SessionHeader) -> Result<BlockHeight> {
        self.claim_submission_window
            .checked_mul(self.blocks_per_session)
            .and_then(|span| header.session_start_height.checked_add(span))
            .ok_or_else(|| {
                Error::InvalidClaimParameters(format!("lookahead height overflows for {header}"))
            })
    }

    /// Last height at which a proof for `header` is accepted.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClaimParameters` if the height overflows.
    pub fn expiry_height(&self, header: &SessionHeader) -> Result<BlockHeight> {
        let lookahead = self.lookahead_height(header)?;
        self.claim_expiration_sessions
            .checked_mul(self.blocks_per_session)
            .and_then(|span| lookahead.checked_add(span))
            .ok_or_else(|| {
                Error::InvalidClaimParameters(format!("expiry height overflows for {header}"))
            })
    }
}

/// Limits for the off-chain evidence ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// Maximum number of session sequences held at once.
    #[serde(default = "default_session_capacity")]
    pub session_capacity: usize,

    /// Maximum number of records per session sequence.
    #[serde(default = "default_max_records_per_session")]
    pub max_records_per_session: usize,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            session_capacity: default_session_capacity(),
            max_records_per_session: default_max_records_per_session(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Root directory for node data.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Claim and audit window parameters.
    #[serde(default)]
    pub params: AuditParams,

    /// Evidence ledger limits.
    #[serde(default)]
    pub evidence: EvidenceConfig,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            params: AuditParams::default(),
            evidence: EvidenceConfig::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_root_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "relay-audit")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".relay-audit"))
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_claim_submission_window() -> u64 {
    3
}

const fn default_blocks_per_session() -> u64 {
    4
}

const fn default_claim_expiration_sessions() -> u64 {
    24
}

const fn default_session_capacity() -> usize {
    1_000
}

const fn default_max_records_per_session() -> usize {
    100_000
}

impl AuditConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.params.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

//! Release digests: `sha256:<hex>` or a bare SHA-1.

use std::fmt;
use std::str::FromStr;

use crate::SchemaError;

/// Hash algorithms a director may report for an exported blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DigestAlgorithm {
    /// Legacy 40-hex-character SHA-1, written without a prefix.
    Sha1,
    /// SHA-256, written as `sha256:<64 hex>`.
    Sha256,
}

impl DigestAlgorithm {
    fn hex_len(self) -> usize {
        match self {
            Self::Sha1 => 40,
            Self::Sha256 => 64,
        }
    }
}

/// A validated digest as reported by a BOSH director.
///
/// Directors report either a bare SHA-1 or a multi-digest such as
/// `da39...;sha256:e3b0...`. Parsing keeps the strongest algorithm present,
/// which is the one verification must use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MultiDigest {
    algorithm: DigestAlgorithm,
    hex: String,
}

impl MultiDigest {
    /// Build a digest from an algorithm and hex string, validating the length.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Digest`] if `hex` is not the expected number of
    /// ASCII hex characters for `algorithm`.
    pub fn new(algorithm: DigestAlgorithm, hex: &str) -> Result<Self, SchemaError> {
        if hex.len() == algorithm.hex_len() && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self {
                algorithm,
                hex: hex.to_ascii_lowercase(),
            })
        } else {
            Err(SchemaError::Digest(hex.to_string()))
        }
    }

    /// Algorithm of the strongest digest present.
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Lowercase hex portion, without any algorithm prefix.
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Check the digest against locally computed hashes.
    pub fn matches(&self, sha1_hex: &str, sha256_hex: &str) -> bool {
        let actual = match self.algorithm {
            DigestAlgorithm::Sha1 => sha1_hex,
            DigestAlgorithm::Sha256 => sha256_hex,
        };
        actual.eq_ignore_ascii_case(&self.hex)
    }
}

impl FromStr for MultiDigest {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut best: Option<Self> = None;
        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let candidate = match part.split_once(':') {
                Some(("sha256", hex)) => Self::new(DigestAlgorithm::Sha256, hex)?,
                Some(("sha1", hex)) => Self::new(DigestAlgorithm::Sha1, hex)?,
                Some(_) => return Err(SchemaError::Digest(s.to_string())),
                None => Self::new(DigestAlgorithm::Sha1, part)?,
            };
            if best
                .as_ref()
                .is_none_or(|b| candidate.algorithm > b.algorithm)
            {
                best = Some(candidate);
            }
        }
        best.ok_or_else(|| SchemaError::Digest(s.to_string()))
    }
}

impl fmt::Display for MultiDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.algorithm {
            DigestAlgorithm::Sha1 => write!(f, "{}", self.hex),
            DigestAlgorithm::Sha256 => write!(f, "sha256:{}", self.hex),
        }
    }
}

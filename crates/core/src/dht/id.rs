#![warn(missing_docs)]

//! This module defines the circular identifier space of the ring.
//!
//! An [IdentifierSpace] of `m` bits is the finite ring Z/2^m. Nodes and hashed keys are
//! both [Identifier]s in it, and every ordering question on the ring ("is `x` between `a`
//! and `b`") is answered clockwise from a reference point rather than by plain integer
//! comparison. The origin is moved to the reference point and clockwise distances are
//! compared from there, so wraparound through zero needs no special case.

use serde::Deserialize;
use serde::Serialize;
use sha1::Digest;
use sha1::Sha1;
use sha2::Sha256;

use crate::consts::MAX_BITS;
use crate::error::Error;
use crate::error::Result;

/// A point of the identifier space, always smaller than `2^bits` of the space it came from.
#[derive(
    Copy, Clone, Eq, Ord, PartialEq, PartialOrd, Debug, Default, Serialize, Deserialize, Hash,
)]
pub struct Identifier(u64);

impl Identifier {
    /// Raw integer value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Identifier> for u64 {
    fn from(id: Identifier) -> u64 {
        id.0
    }
}

/// Digest used to map keys into the space. All members of one ring must agree on it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-1, as in the Chord paper.
    #[default]
    Sha1,
    /// SHA-256.
    Sha256,
}

/// Circular space of `2^bits` identifiers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct IdentifierSpace {
    bits: u8,
    digest: DigestAlgorithm,
}

impl IdentifierSpace {
    /// Create a space of `bits` width. Fails fast if `bits` is not in `1..=64`.
    pub fn new(bits: u8, digest: DigestAlgorithm) -> Result<Self> {
        if bits == 0 || bits > MAX_BITS {
            return Err(Error::InvalidBits(bits));
        }
        Ok(Self { bits, digest })
    }

    /// Same as [IdentifierSpace::new] with the default digest.
    pub fn with_bits(bits: u8) -> Result<Self> {
        Self::new(bits, DigestAlgorithm::default())
    }

    /// Width of the space, the `m` of the paper.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Digest algorithm of [IdentifierSpace::hash].
    pub fn digest(&self) -> DigestAlgorithm {
        self.digest
    }

    /// Number of identifiers, `2^bits`.
    pub fn size(&self) -> u128 {
        1u128 << self.bits
    }

    fn mask(&self) -> u64 {
        (self.size() - 1) as u64
    }

    /// Check that `value` is a member of the space and wrap it.
    pub fn identifier(&self, value: u64) -> Result<Identifier> {
        if u128::from(value) >= self.size() {
            return Err(Error::IdentifierOutOfRange {
                id: value,
                bits: self.bits,
            });
        }
        Ok(Identifier(value))
    }

    /// Returns `true` if `id` is smaller than `2^bits`.
    pub fn contains(&self, id: Identifier) -> bool {
        u128::from(id.0) < self.size()
    }

    /// Hash an arbitrary key into the space.
    ///
    /// The digest is read as a big-endian integer and reduced modulo `2^bits`, which keeps
    /// the low `bits` bits of the digest.
    pub fn hash(&self, key: impl AsRef<[u8]>) -> Identifier {
        let low = match self.digest {
            DigestAlgorithm::Sha1 => low_u64(Sha1::digest(key.as_ref()).as_slice()),
            DigestAlgorithm::Sha256 => low_u64(Sha256::digest(key.as_ref()).as_slice()),
        };
        Identifier(low & self.mask())
    }

    /// `(id + offset) mod 2^bits`
    pub fn add(&self, id: Identifier, offset: u128) -> Identifier {
        let size = self.size();
        Identifier(((u128::from(id.0) + offset % size) % size) as u64)
    }

    /// Start of finger `k` (0-based) of node `id`: `(id + 2^k) mod 2^bits`.
    pub fn finger_start(&self, id: Identifier, k: usize) -> Identifier {
        self.add(id, 1u128 << k)
    }

    /// Clockwise distance walking from `from` to `to`.
    pub fn distance(&self, from: Identifier, to: Identifier) -> u64 {
        let size = self.size();
        ((u128::from(to.0) + size - u128::from(from.0)) % size) as u64
    }

    /// Returns `true` if `x` is in the open arc `(a, b)`.
    ///
    /// When `a == b` the arc is the whole ring except `a` itself.
    pub fn is_strictly_between(&self, a: Identifier, x: Identifier, b: Identifier) -> bool {
        if a == b {
            return x != a;
        }
        let dx = self.distance(a, x);
        dx > 0 && dx < self.distance(a, b)
    }

    /// Returns `true` if `x` is in the half-open arc `(a, b]`.
    ///
    /// When `a == b` the arc covers the whole ring: a single node owns every key.
    pub fn is_between_right_inclusive(&self, a: Identifier, x: Identifier, b: Identifier) -> bool {
        if a == b {
            return true;
        }
        let dx = self.distance(a, x);
        dx > 0 && dx <= self.distance(a, b)
    }

    /// Members of one ring must share width and digest.
    pub fn ensure_compatible(&self, other: &IdentifierSpace) -> Result<()> {
        if self.bits != other.bits {
            return Err(Error::Configuration(format!(
                "identifier space width mismatch: local {} bits, remote {} bits",
                self.bits, other.bits
            )));
        }
        if self.digest != other.digest {
            return Err(Error::Configuration(format!(
                "digest mismatch: local {:?}, remote {:?}",
                self.digest, other.digest
            )));
        }
        Ok(())
    }
}

fn low_u64(digest: &[u8]) -> u64 {
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&digest[digest.len() - 8..]);
    u64::from_be_bytes(tail)
}

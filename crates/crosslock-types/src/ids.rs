//! Identifiers used throughout Crosslock.
//!
//! Every identity (user, MPC authority, solver, operator) is a raw ed25519
//! public key. Record addresses and trade ids are SHA-256 digests, so the
//! same inputs always produce the same identifier on every client.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{CrosslockError, Result};

// ---------------------------------------------------------------------------
// Pubkey
// ---------------------------------------------------------------------------

/// A 32-byte ed25519 public key identifying any participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default, Serialize, Deserialize)]
pub struct Pubkey(pub [u8; 32]);

impl Pubkey {
    #[must_use]
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First four bytes in hex, for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Build the ed25519 verifying key behind this identity.
    ///
    /// # Errors
    /// Returns [`CrosslockError::AuthorizationMismatch`] if the bytes are not
    /// a valid curve point.
    pub fn verifying_key(&self) -> Result<ed25519_dalek::VerifyingKey> {
        ed25519_dalek::VerifyingKey::from_bytes(&self.0).map_err(|_| {
            CrosslockError::AuthorizationMismatch {
                reason: format!("{self} is not a valid ed25519 key"),
            }
        })
    }
}

impl From<&ed25519_dalek::VerifyingKey> for Pubkey {
    fn from(key: &ed25519_dalek::VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Pubkey {
    type Err = CrosslockError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self(decode_32(s).ok_or_else(|| CrosslockError::InvalidKey {
            reason: format!("not a 32-byte hex key: {s}"),
        })?))
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Deterministic address of a record in the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// Derive an address from seed components.
    ///
    /// Each seed is length-prefixed so `["ab", "c"]` and `["a", "bc"]`
    /// never collide.
    #[must_use]
    pub fn derive(seeds: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"crosslock:address:v1:");
        for seed in seeds {
            hasher.update((seed.len() as u64).to_le_bytes());
            hasher.update(seed);
        }
        Self(hasher.finalize().into())
    }

    /// Reinterpret the address as an owner identity. Vaults and the fee pool
    /// are balances owned by derived addresses.
    #[must_use]
    pub fn as_owner(&self) -> Pubkey {
        Pubkey(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "addr:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// The asset a balance or trade is denominated in.
///
/// Externally the native asset is written as `null` (JSON) or `"native"`
/// (route legs); every other asset is its mint key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(from = "Option<Pubkey>", into = "Option<Pubkey>")]
pub enum Asset {
    Native,
    Token(Pubkey),
}

impl Asset {
    /// Route-leg spelling of the native asset.
    pub const NATIVE_LABEL: &'static str = "native";

    #[must_use]
    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }

    /// Seed bytes used when deriving per-asset record addresses.
    #[must_use]
    pub fn seed(&self) -> Vec<u8> {
        match self {
            Self::Native => Self::NATIVE_LABEL.as_bytes().to_vec(),
            Self::Token(mint) => mint.0.to_vec(),
        }
    }

    /// The mint key, or `None` for the native asset.
    #[must_use]
    pub fn mint(&self) -> Option<Pubkey> {
        match self {
            Self::Native => None,
            Self::Token(mint) => Some(*mint),
        }
    }
}

impl From<Option<Pubkey>> for Asset {
    fn from(mint: Option<Pubkey>) -> Self {
        mint.map_or(Self::Native, Self::Token)
    }
}

impl From<Asset> for Option<Pubkey> {
    fn from(asset: Asset) -> Self {
        asset.mint()
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "{}", Self::NATIVE_LABEL),
            Self::Token(mint) => write!(f, "{mint}"),
        }
    }
}

impl FromStr for Asset {
    type Err = CrosslockError;

    fn from_str(s: &str) -> Result<Self> {
        if s == Self::NATIVE_LABEL {
            return Ok(Self::Native);
        }
        s.parse().map(Self::Token).map_err(|_| CrosslockError::InvalidAsset {
            reason: format!("neither {} nor a mint key: {s}", Self::NATIVE_LABEL),
        })
    }
}

// ---------------------------------------------------------------------------
// TradeId
// ---------------------------------------------------------------------------

/// 32-byte trade identifier, rendered externally as `0x`-prefixed hex.
///
/// Computed by [`TradeInput::trade_id`](crate::TradeInput::trade_id); never
/// random.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TradeId(pub [u8; 32]);

impl TradeId {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for TradeId {
    type Err = CrosslockError;

    fn from_str(s: &str) -> Result<Self> {
        let body = s
            .strip_prefix("0x")
            .ok_or_else(|| CrosslockError::Serialization(format!("trade id missing 0x: {s}")))?;
        decode_32(body)
            .map(Self)
            .ok_or_else(|| CrosslockError::Serialization(format!("malformed trade id: {s}")))
    }
}

fn decode_32(s: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}

/// Random keys for unit tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Pubkey {
    pub fn random() -> Self {
        Self(rand::random::<[u8; 32]>())
    }
}

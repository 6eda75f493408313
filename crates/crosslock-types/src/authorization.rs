//! # Durable authorization: presigned, single-use settlement consent
//!
//! A depositor authorizes the settlement of their trade while offline. The
//! authorization must stay valid for an unknown time, be usable once, be
//! bound to one trade's parameters, and die the instant the trade is
//! refunded.
//!
//! Each trade owns an [`AuthorizationRecord`], addressed by the trade's
//! ephemeral key, holding a [`NonceValue`]. The depositor signs a
//! [`SettlementIntent`] that embeds the current nonce. Settling consumes the
//! record and claiming voids it; both advance the nonce, so every payload
//! signed against the old value is dead.
//!
//! ## State Machine
//!
//! ```text
//!   ┌────────┐  settle     ┌──────────┐
//!   │ ACTIVE ├────────────▶│ CONSUMED │
//!   └───┬────┘             └──────────┘
//!       │ claim
//!       ▼
//!   ┌────────┐
//!   │ VOIDED │
//!   └────────┘
//! ```
//!
//! ## Two-phase signing
//!
//! 1. The depositor builds the intent and signs it with the ephemeral key
//!    ([`PresignedSettlement::sign`]), then hands over the hex form.
//! 2. The MPC decodes it, adds its own signature
//!    ([`PresignedSettlement::cosign`]) and submits it.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Address, CrosslockError, Pubkey, Result, TradeId, constants};

// ---------------------------------------------------------------------------
// NonceValue
// ---------------------------------------------------------------------------

/// The record's current value. Payloads are valid only against the value
/// they were signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonceValue(pub [u8; 32]);

impl NonceValue {
    /// Value a fresh record starts with.
    ///
    /// `epoch` must differ between any two records ever created for the
    /// same ephemeral key (the store's commit sequence at deposit time), so
    /// a record re-created after cleanup never repeats an earlier value.
    #[must_use]
    pub fn initial(ephemeral_key: &Pubkey, trade_id: &TradeId, epoch: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"crosslock:nonce:init:");
        hasher.update(ephemeral_key.as_bytes());
        hasher.update(trade_id.as_bytes());
        hasher.update(epoch.to_be_bytes());
        Self(hasher.finalize().into())
    }

    /// The next value. Never equal to any earlier one in practice.
    #[must_use]
    pub fn advance(&self) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"crosslock:nonce:advance:");
        hasher.update(self.0);
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for NonceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// AuthorizationRecord
// ---------------------------------------------------------------------------

/// Lifecycle of an authorization record. Transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorizationState {
    /// A payload signed against the current nonce may still settle.
    Active,
    /// Settlement used it.
    Consumed,
    /// A refund killed it.
    Voided,
}

impl AuthorizationState {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!((self, target), (Self::Active, Self::Consumed | Self::Voided))
    }
}

impl fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Consumed => write!(f, "CONSUMED"),
            Self::Voided => write!(f, "VOIDED"),
        }
    }
}

/// Per-trade durable authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub ephemeral_key: Pubkey,
    /// The MPC allowed to complete payloads against this record.
    pub authority: Pubkey,
    pub trade_id: TradeId,
    pub nonce: NonceValue,
    pub state: AuthorizationState,
}

impl AuthorizationRecord {
    /// A fresh, active record for `trade_id`, seeded with `epoch`.
    #[must_use]
    pub fn new(ephemeral_key: Pubkey, authority: Pubkey, trade_id: TradeId, epoch: u64) -> Self {
        Self {
            ephemeral_key,
            authority,
            trade_id,
            nonce: NonceValue::initial(&ephemeral_key, &trade_id, epoch),
            state: AuthorizationState::Active,
        }
    }

    /// Records are keyed by ephemeral key, so one key backs one live trade.
    #[must_use]
    pub fn address(ephemeral_key: &Pubkey) -> Address {
        Address::derive(&[constants::AUTHORIZATION_SEED, ephemeral_key.as_bytes()])
    }

    /// Check that `intent` may be executed against this record.
    ///
    /// # Errors
    /// - `AuthorizationMismatch` if the record is bound to another trade
    /// - `AuthorizationConsumed` if the record is not active or its nonce
    ///   moved on since the intent was signed
    pub fn check_intent(&self, intent: &SettlementIntent) -> Result<()> {
        if self.trade_id != intent.trade_id {
            return Err(CrosslockError::AuthorizationMismatch {
                reason: format!(
                    "record bound to {}, payload names {}",
                    self.trade_id, intent.trade_id
                ),
            });
        }
        if self.state != AuthorizationState::Active {
            return Err(CrosslockError::AuthorizationConsumed {
                reason: format!("record is {}", self.state),
            });
        }
        if self.nonce != intent.nonce {
            return Err(CrosslockError::AuthorizationConsumed {
                reason: format!("payload nonce {} is stale, record at {}", intent.nonce, self.nonce),
            });
        }
        Ok(())
    }

    /// Mark consumed by settlement and advance the nonce.
    pub fn consume(&mut self) -> Result<()> {
        self.transition(AuthorizationState::Consumed)
    }

    /// Mark voided by refund and advance the nonce.
    pub fn void(&mut self) -> Result<()> {
        self.transition(AuthorizationState::Voided)
    }

    fn transition(&mut self, target: AuthorizationState) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(CrosslockError::AuthorizationConsumed {
                reason: format!("cannot transition from {} to {target}", self.state),
            });
        }
        self.state = target;
        self.nonce = self.nonce.advance();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SettlementIntent
// ---------------------------------------------------------------------------

/// The settlement a depositor consents to.
///
/// The solver receives `amount - total_fee`; the fee pool receives
/// `total_fee`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementIntent {
    pub trade_id: TradeId,
    /// Record value this intent is valid against.
    pub nonce: NonceValue,
    pub solver: Pubkey,
    pub amount: u64,
    pub total_fee: u64,
    /// The MPC expected to complete the payload.
    pub mpc: Pubkey,
}

impl SettlementIntent {
    /// Length of the encoded intent inside a presigned payload.
    const ENCODED_LEN: usize = 32 + 32 + 32 + 8 + 8 + 32;

    /// Canonical signing payload for ed25519.
    ///
    /// Format: `"crosslock:settle:v1:" || trade_id || nonce || solver ||
    /// amount_le || total_fee_le || mpc`
    #[must_use]
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(20 + Self::ENCODED_LEN);
        payload.extend_from_slice(b"crosslock:settle:v1:");
        self.encode_into(&mut payload);
        payload
    }

    /// Amount the solver receives.
    #[must_use]
    pub fn solver_amount(&self) -> u64 {
        self.amount.saturating_sub(self.total_fee)
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.trade_id.as_bytes());
        out.extend_from_slice(&self.nonce.0);
        out.extend_from_slice(self.solver.as_bytes());
        out.extend_from_slice(&self.amount.to_le_bytes());
        out.extend_from_slice(&self.total_fee.to_le_bytes());
        out.extend_from_slice(self.mpc.as_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return None;
        }
        let (trade_id, rest) = bytes.split_at(32);
        let (nonce, rest) = rest.split_at(32);
        let (solver, rest) = rest.split_at(32);
        let (amount, rest) = rest.split_at(8);
        let (total_fee, mpc) = rest.split_at(8);
        Some(Self {
            trade_id: TradeId(trade_id.try_into().ok()?),
            nonce: NonceValue(nonce.try_into().ok()?),
            solver: Pubkey(solver.try_into().ok()?),
            amount: u64::from_le_bytes(amount.try_into().ok()?),
            total_fee: u64::from_le_bytes(total_fee.try_into().ok()?),
            mpc: Pubkey(mpc.try_into().ok()?),
        })
    }
}

// ---------------------------------------------------------------------------
// PresignedSettlement
// ---------------------------------------------------------------------------

/// A settlement intent carrying the depositor's signature and, once
/// completed, the MPC's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedSettlement {
    pub intent: SettlementIntent,
    /// Ephemeral-key signature over the signing payload.
    pub user_signature: Vec<u8>,
    /// MPC signature over the same payload; `None` until phase 2.
    pub mpc_signature: Option<Vec<u8>>,
}

impl PresignedSettlement {
    const SIGNATURE_LEN: usize = 64;

    /// Phase 1: the depositor signs offline with the ephemeral key.
    #[must_use]
    pub fn sign(intent: SettlementIntent, ephemeral: &SigningKey) -> Self {
        let signature = ephemeral.sign(&intent.signing_payload());
        Self {
            intent,
            user_signature: signature.to_bytes().to_vec(),
            mpc_signature: None,
        }
    }

    /// Phase 2: the MPC completes the payload.
    ///
    /// # Errors
    /// Returns `Unauthorized` if `mpc` is not the key the intent names.
    pub fn cosign(mut self, mpc: &SigningKey) -> Result<Self> {
        if Pubkey::from(&mpc.verifying_key()) != self.intent.mpc {
            return Err(CrosslockError::unauthorized(format!(
                "cosigner is not the intent's mpc {}",
                self.intent.mpc.short()
            )));
        }
        let signature = mpc.sign(&self.intent.signing_payload());
        self.mpc_signature = Some(signature.to_bytes().to_vec());
        Ok(self)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.mpc_signature.is_some()
    }

    /// Verify the MPC co-signature against the intent's mpc.
    ///
    /// # Errors
    /// Returns `Unauthorized` if the co-signature is missing or invalid.
    pub fn verify_cosign(&self) -> Result<()> {
        let signature = self
            .mpc_signature
            .as_deref()
            .ok_or_else(|| CrosslockError::unauthorized("settlement is not co-signed"))?;
        verify(&self.intent.mpc, &self.intent.signing_payload(), signature)
            .map_err(|reason| CrosslockError::unauthorized(format!("mpc co-signature: {reason}")))
    }

    /// Verify the depositor signature against `ephemeral_key`.
    ///
    /// # Errors
    /// Returns `AuthorizationMismatch` if the signature does not verify.
    pub fn verify_user(&self, ephemeral_key: &Pubkey) -> Result<()> {
        verify(ephemeral_key, &self.intent.signing_payload(), &self.user_signature).map_err(
            |reason| CrosslockError::AuthorizationMismatch {
                reason: format!("user signature: {reason}"),
            },
        )
    }

    /// Serialize for hand-off between the two signers.
    ///
    /// Layout: `intent || user_signature || flag || [mpc_signature]`.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(SettlementIntent::ENCODED_LEN + 1 + 2 * Self::SIGNATURE_LEN);
        self.intent.encode_into(&mut bytes);
        bytes.extend_from_slice(&self.user_signature);
        match &self.mpc_signature {
            Some(signature) => {
                bytes.push(1);
                bytes.extend_from_slice(signature);
            }
            None => bytes.push(0),
        }
        hex::encode(bytes)
    }

    /// Decode the output of [`to_hex`](Self::to_hex).
    ///
    /// # Errors
    /// Returns `InvalidPresign` for anything that is not a well-formed
    /// payload. Signatures are not checked here.
    pub fn from_hex(s: &str) -> Result<Self> {
        let invalid = |reason: &str| CrosslockError::InvalidPresign {
            reason: reason.to_string(),
        };
        let bytes = hex::decode(s.trim()).map_err(|_| invalid("not hex"))?;
        let unsigned_len = SettlementIntent::ENCODED_LEN + Self::SIGNATURE_LEN + 1;
        if bytes.len() < unsigned_len {
            return Err(invalid("payload too short"));
        }
        let (intent, rest) = bytes.split_at(SettlementIntent::ENCODED_LEN);
        let (user_signature, rest) = rest.split_at(Self::SIGNATURE_LEN);
        let intent = SettlementIntent::decode(intent).ok_or_else(|| invalid("malformed intent"))?;
        let mpc_signature = match rest {
            [0] => None,
            [1, signature @ ..] if signature.len() == Self::SIGNATURE_LEN => Some(signature.to_vec()),
            _ => return Err(invalid("malformed co-signature section")),
        };
        Ok(Self {
            intent,
            user_signature: user_signature.to_vec(),
            mpc_signature,
        })
    }
}

fn verify(key: &Pubkey, payload: &[u8], signature: &[u8]) -> std::result::Result<(), String> {
    let key = key
        .verifying_key()
        .map_err(|_| format!("{} is not a valid ed25519 key", key.short()))?;
    let bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| format!("expected 64 signature bytes, got {}", signature.len()))?;
    key.verify(payload, &Signature::from_bytes(&bytes))
        .map_err(|_| "signature does not verify".to_string())
}

/// Key generation for tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
pub fn random_signing_key() -> SigningKey {
    SigningKey::from_bytes(&rand::random::<[u8; 32]>())
}

//! System-wide constants for the Crosslock escrow protocol.

/// Maximum number of operators the Config record holds.
pub const MAX_OPERATORS: usize = 3;

/// Default wait after a trade becomes terminal before it can be closed (seconds).
pub const DEFAULT_CLOSE_TRADE_DURATION_SECS: u64 = 3 * 24 * 60 * 60;

/// Default wait after a payment before its receipt can be closed (seconds).
pub const DEFAULT_CLOSE_PAYMENT_DURATION_SECS: u64 = 3 * 24 * 60 * 60;

/// Upper bound accepted for either close-wait duration (one year).
pub const MAX_CLOSE_WAIT_SECS: u64 = 365 * 24 * 60 * 60;

/// Storage cost charged for a trade record and its vault (native minor units).
pub const DEFAULT_TRADE_RENT: u64 = 2_039_280;

/// Storage cost charged for an authorization record.
pub const DEFAULT_AUTHORIZATION_RENT: u64 = 1_447_680;

/// Storage cost charged for a payment receipt.
pub const DEFAULT_PAYMENT_RECEIPT_RENT: u64 = 2_491_680;

/// Storage cost charged for whitelist and fee-receiver records.
pub const DEFAULT_REGISTRY_RENT: u64 = 1_113_600;

/// Seed for the single Config record.
pub const CONFIG_SEED: &[u8] = b"config";

/// Seed for the protocol fee pool owner.
pub const PROTOCOL_SEED: &[u8] = b"protocol";

/// Seed prefix for per-trade vaults.
pub const VAULT_SEED: &[u8] = b"vault";

/// Seed prefix for trade records.
pub const TRADE_SEED: &[u8] = b"trade";

/// Seed prefix for authorization records (keyed by ephemeral key).
pub const AUTHORIZATION_SEED: &[u8] = b"nonce";

/// Seed prefix for whitelist entries.
pub const WHITELIST_SEED: &[u8] = b"whitelist";

/// Seed prefix for fee receivers.
pub const FEE_RECEIVER_SEED: &[u8] = b"fee_receiver";

/// Seed prefix for payment receipts.
pub const PAYMENT_RECEIPT_SEED: &[u8] = b"payment_receipt";

/// Seed prefix for token balances.
pub const BALANCE_SEED: &[u8] = b"balance";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol name.
pub const PROTOCOL_NAME: &str = "Crosslock";

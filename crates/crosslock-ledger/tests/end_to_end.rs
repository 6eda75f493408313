//! End-to-end integration tests across the whole protocol.
//!
//! These tests drive a trade through its full lifecycle:
//! Registry -> Deposit -> Fee -> Presign (user) -> Co-sign (MPC) -> Settle
//! -> Cleanup, plus the refund path and the complementary payment leg.
//!
//! After every scenario the store's total supply must equal what was
//! funded into it: escrow, fees, rents and refunds only move value.

use std::sync::Arc;

use crosslock_ledger::{DepositRequest, Ledger, ManualClock, PaymentRequest};
use crosslock_store::MemoryStore;
use crosslock_types::*;
use ed25519_dalek::SigningKey;

const T0: i64 = 1_700_000_000;
const TIMEOUT: i64 = T0 + 1_800;
const CLOSE_WAIT: i64 = 3 * 24 * 60 * 60;

/// Helper: one deployment with an admin, one operator and funded users.
struct Protocol {
    ledger: Ledger<Arc<MemoryStore>, Arc<ManualClock>>,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    admin: Pubkey,
    operator: Pubkey,
    funded: u128,
}

impl Protocol {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(T0));
        let ledger = Ledger::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            ProtocolSettings::default(),
        )
        .expect("default settings are valid");
        let admin = Pubkey::random();
        let operator = Pubkey::random();
        ledger.initialize(admin, admin).expect("first initialize");
        ledger.add_operator(admin, operator).expect("add operator");
        let mut protocol = Self {
            ledger,
            store,
            clock,
            admin,
            operator,
            funded: 0,
        };
        protocol.fund(admin, 100_000_000);
        protocol.fund(operator, 100_000_000);
        protocol
    }

    fn fund(&mut self, owner: Pubkey, amount: u64) {
        self.store
            .fund(owner, Asset::Native, amount)
            .expect("funding should succeed");
        self.funded += u128::from(amount);
    }

    fn user(&mut self) -> Pubkey {
        let user = Pubkey::random();
        self.fund(user, 1_000_000_000);
        user
    }

    fn assert_supply_conserved(&self) {
        assert_eq!(
            self.store.total_supply(&Asset::Native),
            self.funded,
            "native supply must equal what was funded"
        );
    }
}

/// A user's trade with its keys.
struct OpenTrade {
    trade_id: TradeId,
    user: Pubkey,
    ephemeral: SigningKey,
    mpc: SigningKey,
}

impl OpenTrade {
    fn mpc_key(&self) -> Pubkey {
        Pubkey::from(&self.mpc.verifying_key())
    }

    fn ephemeral_key(&self) -> Pubkey {
        Pubkey::from(&self.ephemeral.verifying_key())
    }
}

fn open_trade(p: &mut Protocol, amount: u64) -> OpenTrade {
    let user = p.user();
    let ephemeral = random_signing_key();
    let mpc = random_signing_key();
    let deposited = p
        .ledger
        .deposit(DepositRequest {
            user,
            input: TradeInput::dummy(&user, amount),
            mpc: Pubkey::from(&mpc.verifying_key()),
            ephemeral_key: Pubkey::from(&ephemeral.verifying_key()),
            refund: user,
            timeout: TIMEOUT,
        })
        .expect("deposit should succeed");
    assert_eq!(deposited.amount, amount);
    OpenTrade {
        trade_id: deposited.trade_id,
        user,
        ephemeral,
        mpc,
    }
}

/// User signs offline and hands the payload over as hex; the MPC co-signs.
fn presign(p: &Protocol, trade: &OpenTrade, solver: Pubkey) -> PresignedSettlement {
    let intent = p
        .ledger
        .prepare_settlement(trade.trade_id, solver)
        .expect("prepare should succeed");
    let wire = PresignedSettlement::sign(intent, &trade.ephemeral).to_hex();
    PresignedSettlement::from_hex(&wire)
        .expect("payload decodes")
        .cosign(&trade.mpc)
        .expect("mpc co-signs")
}

// ===========================================================================
// Scenarios
// ===========================================================================

#[test]
fn full_settlement_lifecycle() {
    let mut p = Protocol::new();
    let trade = open_trade(&mut p, 100_000_000);
    let solver = Pubkey::random();

    assert_eq!(
        p.ledger.vault_balance(&trade.trade_id, &Asset::Native),
        100_000_000
    );

    p.ledger
        .set_total_fee(trade.mpc_key(), trade.trade_id, 5_000)
        .expect("fee set");
    let settlement = presign(&p, &trade, solver);
    let settled = p.ledger.settle(&settlement).expect("settle should succeed");

    assert_eq!(settled.solver_amount, 99_995_000);
    assert_eq!(settled.fee, 5_000);
    assert_eq!(p.ledger.balance(&solver, &Asset::Native), 99_995_000);
    assert_eq!(p.ledger.fee_pool_balance(&Asset::Native), 5_000);
    assert_eq!(p.ledger.vault_balance(&trade.trade_id, &Asset::Native), 0);
    assert!(matches!(
        p.ledger.trade(&trade.trade_id).unwrap().status,
        TradeStatus::Settled { solver: s, .. } if s == solver
    ));

    // The refund path is closed for good.
    p.clock.set(TIMEOUT);
    assert!(matches!(
        p.ledger.claim(trade.user, trade.trade_id),
        Err(CrosslockError::InvalidState { .. })
    ));
    p.assert_supply_conserved();

    // Fees go out through a registered receiver.
    let treasury = Pubkey::random();
    p.ledger
        .add_fee_receiver(p.admin, treasury)
        .expect("register receiver");
    let withdrawn = p
        .ledger
        .withdraw_fee(p.operator, Asset::Native, treasury, FeeAmount::All)
        .expect("withdraw");
    assert_eq!(withdrawn.amount, 5_000);
    assert_eq!(p.ledger.balance(&treasury, &Asset::Native), 5_000);
    assert_eq!(p.ledger.fee_pool_balance(&Asset::Native), 0);
    p.assert_supply_conserved();

    // Cleanup refunds the depositor's rents.
    let before = p.ledger.balance(&trade.user, &Asset::Native);
    p.clock.set(T0 + CLOSE_WAIT - 1);
    assert!(matches!(
        p.ledger.close_finished_trade(trade.trade_id),
        Err(CrosslockError::CloseNotAvailable { .. })
    ));
    p.clock.set(T0 + CLOSE_WAIT);
    let closed = p
        .ledger
        .close_finished_trade(trade.trade_id)
        .expect("close after wait");
    assert_eq!(
        p.ledger.balance(&trade.user, &Asset::Native),
        before + closed.rent_refunded
    );
    assert!(p.ledger.trade(&trade.trade_id).is_err());
    assert!(p.ledger.authorization(&trade.ephemeral_key()).is_err());
    p.assert_supply_conserved();
}

#[test]
fn refund_lifecycle() {
    let mut p = Protocol::new();
    let trade = open_trade(&mut p, 50_000_000);
    let solver = Pubkey::random();
    p.ledger
        .set_total_fee(trade.mpc_key(), trade.trade_id, 1_000)
        .expect("fee set");
    let settlement = presign(&p, &trade, solver);
    let before = p.ledger.balance(&trade.user, &Asset::Native);

    p.clock.set(TIMEOUT - 1);
    assert!(matches!(
        p.ledger.claim(trade.user, trade.trade_id),
        Err(CrosslockError::NotExpired { .. })
    ));

    p.clock.set(TIMEOUT);
    assert_eq!(
        p.ledger.settle(&settlement).unwrap_err(),
        CrosslockError::Expired {
            deadline: TIMEOUT,
            now: TIMEOUT
        }
    );

    // Anyone may trigger the refund; it goes to the refund address.
    p.ledger
        .claim(Pubkey::random(), trade.trade_id)
        .expect("claim after timeout");
    assert_eq!(
        p.ledger.balance(&trade.user, &Asset::Native),
        before + 50_000_000
    );

    // The presigned payload is dead even if the clock were earlier.
    p.clock.set(T0);
    let pool = p.ledger.fee_pool_balance(&Asset::Native);
    assert!(p.ledger.settle(&settlement).is_err());
    assert_eq!(p.ledger.balance(&solver, &Asset::Native), 0);
    assert_eq!(p.ledger.fee_pool_balance(&Asset::Native), pool);
    assert_eq!(
        p.ledger
            .authorization(&trade.ephemeral_key())
            .unwrap()
            .state,
        AuthorizationState::Voided
    );
    p.assert_supply_conserved();
}

#[test]
fn fee_revision_requires_new_signature() {
    let mut p = Protocol::new();
    let trade = open_trade(&mut p, 10_000_000);
    let solver = Pubkey::random();
    p.ledger
        .set_total_fee(trade.mpc_key(), trade.trade_id, 10_000)
        .expect("fee set");
    let stale = presign(&p, &trade, solver);

    p.ledger
        .set_total_fee(trade.mpc_key(), trade.trade_id, 20_000)
        .expect("fee revised");
    assert!(matches!(
        p.ledger.settle(&stale),
        Err(CrosslockError::AuthorizationMismatch { .. })
    ));

    let fresh = presign(&p, &trade, solver);
    let settled = p.ledger.settle(&fresh).expect("fresh payload settles");
    assert_eq!(settled.solver_amount, 9_980_000);
    p.assert_supply_conserved();
}

#[test]
fn many_trades_share_the_fee_pool() {
    let mut p = Protocol::new();
    let trades: Vec<OpenTrade> = (0..5).map(|_| open_trade(&mut p, 1_000_000)).collect();
    for (trade, n) in trades.iter().zip(1u64..) {
        p.ledger
            .set_total_fee(trade.mpc_key(), trade.trade_id, 100 * n)
            .expect("fee set");
    }
    for trade in &trades {
        let settlement = presign(&p, trade, Pubkey::random());
        p.ledger.settle(&settlement).expect("settle");
    }
    assert_eq!(p.ledger.fee_pool_balance(&Asset::Native), 1_500);
    p.assert_supply_conserved();
}

#[test]
fn payment_leg_lifecycle() {
    let mut p = Protocol::new();
    let solver = p.user();
    let user = Pubkey::random();
    let trade_id = TradeId([9u8; 32]);
    let request = PaymentRequest {
        from: solver,
        trade_id,
        to: user,
        asset: Asset::Native,
        amount: 3_000_000,
        total_fee: 3_000,
        deadline: T0 + 60,
    };

    let paid = p
        .ledger
        .create_payment(request.clone())
        .expect("payment should succeed");
    assert_eq!(paid.amount, 3_000_000);
    assert_eq!(p.ledger.balance(&user, &Asset::Native), 3_000_000);
    assert_eq!(p.ledger.fee_pool_balance(&Asset::Native), 3_000);

    assert_eq!(
        p.ledger.create_payment(request.clone()).unwrap_err(),
        CrosslockError::DuplicatePayment {
            trade_id,
            from: solver
        }
    );

    p.clock.set(T0 + 61);
    let late = PaymentRequest {
        trade_id: TradeId([10u8; 32]),
        ..request
    };
    assert!(matches!(
        p.ledger.create_payment(late),
        Err(CrosslockError::Expired { .. })
    ));

    p.clock.set(T0 + CLOSE_WAIT);
    let closed = p
        .ledger
        .close_payment_receipt(trade_id, solver, Asset::Native)
        .expect("close receipt");
    assert_eq!(
        closed.rent_refunded,
        constants::DEFAULT_PAYMENT_RECEIPT_RENT
    );
    assert!(
        p.ledger
            .payment_receipt(&trade_id, &solver, &Asset::Native)
            .is_err()
    );
    p.assert_supply_conserved();
}

#[test]
fn token_trade_tracks_whitelist_exposure() {
    let mut p = Protocol::new();
    let mint = Pubkey::random();
    let token = Asset::Token(mint);
    p.ledger
        .add_or_update_whitelist(p.operator, token, 10_000)
        .expect("whitelist");

    let user = p.user();
    p.store.fund(user, token, 50_000).expect("token funding");
    let ephemeral = random_signing_key();
    let mpc = random_signing_key();
    let mut input = TradeInput::dummy(&user, 8_000);
    input.from_chain = ChainLeg::new(user.to_string(), "solana", mint.to_string());

    let trade_id = p
        .ledger
        .deposit(DepositRequest {
            user,
            input,
            mpc: Pubkey::from(&mpc.verifying_key()),
            ephemeral_key: Pubkey::from(&ephemeral.verifying_key()),
            refund: user,
            timeout: TIMEOUT,
        })
        .expect("token deposit")
        .trade_id;
    assert_eq!(
        p.ledger.whitelist(&token).unwrap().unwrap().exposure,
        8_000
    );
    assert!(matches!(
        p.ledger.remove_whitelist(p.operator, token),
        Err(CrosslockError::NonZeroExposure { .. })
    ));

    let trade = OpenTrade {
        trade_id,
        user,
        ephemeral,
        mpc,
    };
    p.ledger
        .set_total_fee(trade.mpc_key(), trade_id, 80)
        .expect("fee set");
    let solver = Pubkey::random();
    p.ledger
        .settle(&presign(&p, &trade, solver))
        .expect("settle");
    assert_eq!(p.ledger.balance(&solver, &token), 7_920);
    assert_eq!(p.ledger.fee_pool_balance(&token), 80);
    assert_eq!(p.ledger.whitelist(&token).unwrap().unwrap().exposure, 0);

    p.ledger
        .remove_whitelist(p.operator, token)
        .expect("removable once exposure is zero");
    p.assert_supply_conserved();
    assert_eq!(p.store.total_supply(&token), 50_000);
}

#[test]
fn settings_load_from_json() {
    let settings = ProtocolSettings::from_json_str(
        r#"{ "default_close_trade_duration": 60, "trade_rent": 0 }"#,
    )
    .expect("valid settings");
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(T0));
    let ledger = Ledger::new(Arc::clone(&store), Arc::clone(&clock), settings)
        .expect("ledger builds");
    let admin = Pubkey::random();
    let config = ledger.initialize(admin, admin).expect("initialize");
    assert_eq!(config.close_trade_duration, 60);
    assert_eq!(
        config.close_payment_duration,
        constants::DEFAULT_CLOSE_PAYMENT_DURATION_SECS
    );
}

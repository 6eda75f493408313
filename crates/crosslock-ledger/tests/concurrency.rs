//! Racing operations against one shared store.
//!
//! Each ledger has its own clock but all of them share a single
//! `Arc<MemoryStore>`, the way several submitters share one chain. For any
//! trade exactly one terminal transition may commit.

use std::sync::{Arc, Barrier};
use std::thread;

use crosslock_ledger::{DepositRequest, Ledger, ManualClock};
use crosslock_store::MemoryStore;
use crosslock_types::*;

const T0: i64 = 1_700_000_000;
const TIMEOUT: i64 = T0 + 1_800;
const ROUNDS: usize = 200;

type SharedLedger = Ledger<Arc<MemoryStore>, Arc<ManualClock>>;

fn ledger_at(store: &Arc<MemoryStore>, now: i64) -> SharedLedger {
    Ledger::new(
        Arc::clone(store),
        Arc::new(ManualClock::new(now)),
        ProtocolSettings::default(),
    )
    .expect("default settings are valid")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn settle_and_claim_race_has_one_winner() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let setup = ledger_at(&store, T0);
    let admin = Pubkey::random();
    setup.initialize(admin, admin).expect("initialize");

    let mut settled_wins = 0;
    let mut claimed_wins = 0;
    for _ in 0..ROUNDS {
        let user = Pubkey::random();
        store
            .fund(user, Asset::Native, 1_000_000_000)
            .expect("funding");
        let ephemeral = random_signing_key();
        let mpc = random_signing_key();
        let mpc_key = Pubkey::from(&mpc.verifying_key());
        let trade_id = setup
            .deposit(DepositRequest {
                user,
                input: TradeInput::dummy(&user, 10_000_000),
                mpc: mpc_key,
                ephemeral_key: Pubkey::from(&ephemeral.verifying_key()),
                refund: user,
                timeout: TIMEOUT,
            })
            .expect("deposit")
            .trade_id;
        setup
            .set_total_fee(mpc_key, trade_id, 1_000)
            .expect("fee set");
        let intent = setup
            .prepare_settlement(trade_id, Pubkey::random())
            .expect("prepare");
        let presigned = PresignedSettlement::sign(intent, &ephemeral)
            .cosign(&mpc)
            .expect("cosign");

        // The settler still sees the trade as live; the claimer sees it
        // as expired.
        let settler = ledger_at(&store, TIMEOUT - 1);
        let claimer = ledger_at(&store, TIMEOUT);
        let barrier = Arc::new(Barrier::new(2));

        let settle_barrier = Arc::clone(&barrier);
        let settle = thread::spawn(move || {
            settle_barrier.wait();
            settler.settle(&presigned).map(|_| ())
        });
        let claim_barrier = Arc::clone(&barrier);
        let claim = thread::spawn(move || {
            claim_barrier.wait();
            claimer.claim(user, trade_id).map(|_| ())
        });

        let settle_result = settle.join().expect("settle thread");
        let claim_result = claim.join().expect("claim thread");

        match (&settle_result, &claim_result) {
            (Ok(()), Err(CrosslockError::InvalidState { .. })) => settled_wins += 1,
            (Err(CrosslockError::InvalidState { .. }), Ok(())) => claimed_wins += 1,
            other => panic!("expected exactly one winner, got {other:?}"),
        }

        let trade = setup.trade(&trade_id).expect("trade exists");
        assert!(trade.status.is_terminal());
        assert_eq!(setup.vault_balance(&trade_id, &Asset::Native), 0);
    }

    assert_eq!(settled_wins + claimed_wins, ROUNDS);
    // Total supply only changes through funding.
    let funded = 1_000_000_000u128 * u128::try_from(ROUNDS).expect("fits");
    assert_eq!(store.total_supply(&Asset::Native), funded);
}

#[test]
fn concurrent_deposits_with_one_ephemeral_key() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let setup = ledger_at(&store, T0);
    let admin = Pubkey::random();
    setup.initialize(admin, admin).expect("initialize");

    for _ in 0..ROUNDS / 4 {
        let ephemeral_key = Pubkey::random();
        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let user = Pubkey::random();
                store
                    .fund(user, Asset::Native, 1_000_000_000)
                    .expect("funding");
                let ledger = ledger_at(&store, T0);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    ledger.deposit(DepositRequest {
                        user,
                        input: TradeInput::dummy(&user, 1_000),
                        mpc: Pubkey::random(),
                        ephemeral_key,
                        refund: user,
                        timeout: TIMEOUT,
                    })
                })
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("deposit thread"))
            .collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "one record per ephemeral key: {results:?}");
        for result in results.iter().filter(|r| r.is_err()) {
            assert!(
                matches!(result, Err(CrosslockError::AuthorizationInUse(k)) if *k == ephemeral_key)
            );
        }
    }
}

#[test]
fn shared_fee_pool_under_parallel_settlements() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let setup = ledger_at(&store, T0);
    let admin = Pubkey::random();
    setup.initialize(admin, admin).expect("initialize");

    let payloads: Vec<PresignedSettlement> = (0..16)
        .map(|_| {
            let user = Pubkey::random();
            store
                .fund(user, Asset::Native, 1_000_000_000)
                .expect("funding");
            let ephemeral = random_signing_key();
            let mpc = random_signing_key();
            let mpc_key = Pubkey::from(&mpc.verifying_key());
            let trade_id = setup
                .deposit(DepositRequest {
                    user,
                    input: TradeInput::dummy(&user, 1_000_000),
                    mpc: mpc_key,
                    ephemeral_key: Pubkey::from(&ephemeral.verifying_key()),
                    refund: user,
                    timeout: TIMEOUT,
                })
                .expect("deposit")
                .trade_id;
            setup
                .set_total_fee(mpc_key, trade_id, 250)
                .expect("fee set");
            let intent = setup
                .prepare_settlement(trade_id, Pubkey::random())
                .expect("prepare");
            PresignedSettlement::sign(intent, &ephemeral)
                .cosign(&mpc)
                .expect("cosign")
        })
        .collect();

    let barrier = Arc::new(Barrier::new(payloads.len()));
    let handles: Vec<_> = payloads
        .into_iter()
        .map(|presigned| {
            let ledger = ledger_at(&store, T0);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                ledger.settle(&presigned)
            })
        })
        .collect();
    for handle in handles {
        handle
            .join()
            .expect("settle thread")
            .expect("unrelated trades never conflict");
    }
    assert_eq!(setup.fee_pool_balance(&Asset::Native), 16 * 250);
}

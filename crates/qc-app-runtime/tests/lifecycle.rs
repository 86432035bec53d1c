//! # Block Lifecycle Tests
//!
//! InitChain, BeginBlock, EndBlock and Commit ordering, restart from a
//! committed store, and the halt signal.

mod common;

use common::*;
use qc_app_runtime::{
    AppConfig, Application, BaseApp, BincodeTxCodec, Context, EndBlocker, LifecyclePhase,
    RequestBeginBlock, RequestEndBlock, RequestInitChain, ResponseEndBlock,
};
use qc_app_store::VersionedStore;
use shared_types::{
    BlockParams, ConsensusParams, LastCommitInfo, Validator, ValidatorUpdate, VoteInfo,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn validators() -> Vec<ValidatorUpdate> {
    vec![
        ValidatorUpdate::new(vec![1; 33], 10),
        ValidatorUpdate::new(vec![2; 33], 20),
    ]
}

fn genesis_request(validators: Vec<ValidatorUpdate>) -> RequestInitChain {
    RequestInitChain {
        time: GENESIS_TIME,
        chain_id: CHAIN_ID.to_string(),
        validators,
        ..Default::default()
    }
}

fn fresh_app(genesis: Genesis) -> BaseApp {
    build_app(
        Arc::new(VersionedStore::new()),
        AppConfig::default(),
        genesis,
        None,
    )
}

#[test]
fn test_init_chain_accepts_validators_in_any_order() {
    let mut app = fresh_app(Genesis {
        validators: validators(),
        ..Default::default()
    });
    assert_eq!(app.phase(), LifecyclePhase::Uninitialized);

    let mut requested = validators();
    requested.reverse();
    let res = app.init_chain(genesis_request(requested));

    assert_eq!(res.validators, validators());
    assert_eq!(app.phase(), LifecyclePhase::Ready);
}

#[test]
#[should_panic(expected = "len(RequestInitChain.Validators) != len(GenesisValidators)")]
fn test_init_chain_validator_count_mismatch_is_fatal() {
    let mut app = fresh_app(Genesis {
        validators: validators(),
        ..Default::default()
    });
    let mut requested = validators();
    requested.push(ValidatorUpdate::new(vec![3; 33], 30));

    app.init_chain(genesis_request(requested));
}

#[test]
#[should_panic(expected = "genesisValidators[1] != req.Validators[1]")]
fn test_init_chain_validator_power_mismatch_is_fatal() {
    let mut app = fresh_app(Genesis {
        validators: validators(),
        ..Default::default()
    });
    let requested = vec![
        ValidatorUpdate::new(vec![1; 33], 10),
        ValidatorUpdate::new(vec![2; 33], 21),
    ];

    app.init_chain(genesis_request(requested));
}

#[test]
#[should_panic(expected = "called on an initialized chain")]
fn test_init_chain_twice_is_fatal() {
    let mut chain = TestChain::new(AppConfig::default());
    chain.app.init_chain(genesis_request(Vec::new()));
}

#[test]
#[should_panic(expected = "in progress")]
fn test_begin_block_twice_is_fatal() {
    let mut chain = TestChain::new(AppConfig::default());
    chain.begin_block();
    chain.begin_block();
}

#[test]
#[should_panic(expected = "Invalid height: expected 2, got 5")]
fn test_begin_block_height_gap_is_fatal() {
    let mut chain = TestChain::new(AppConfig::default());
    chain.app.begin_block(RequestBeginBlock {
        header: header(5),
        ..Default::default()
    });
}

#[test]
#[should_panic(expected = "no block in progress")]
fn test_deliver_outside_block_is_fatal() {
    let mut chain = TestChain::new(AppConfig::default());
    chain.deliver(vec![1, 2, 3]);
}

#[test]
#[should_panic(expected = "Commit called before EndBlock")]
fn test_commit_before_end_block_is_fatal() {
    let mut chain = TestChain::new(AppConfig::default());
    chain.begin_block();
    chain.app.commit();
}

#[test]
fn test_commit_hash_is_deterministic() {
    let genesis = Genesis {
        balances: vec![([7; 20], 500)],
        ..Default::default()
    };
    let run = |genesis: Genesis| {
        let mut app = fresh_app(genesis);
        app.init_chain(genesis_request(Vec::new()));
        let mut hashes = Vec::new();
        for height in 1..=3 {
            app.begin_block(RequestBeginBlock {
                header: header(height),
                ..Default::default()
            });
            app.end_block(RequestEndBlock { height });
            hashes.push(app.commit().data);
        }
        (hashes, app.info())
    };

    let (first, info) = run(genesis.clone());
    let (second, _) = run(genesis);

    assert_eq!(first, second);
    assert_eq!(info.last_block_height, 3);
    assert_eq!(info.last_block_app_hash, first[2]);
}

#[test]
fn test_restart_resumes_from_committed_store() {
    // Arrange: three blocks, with consensus params set at genesis.
    let genesis = Genesis {
        max_block_gas: Some(5_000_000),
        ..Default::default()
    };
    let mut chain = TestChain::with_genesis(AppConfig::default(), genesis, None);
    let tx = chain.sign("alice", vec![chain.route_msg("alice", "counter")]);
    chain.block(vec![tx]);
    let (_, hash) = chain.block(Vec::new());

    // Act: a new app over the same store.
    let mut restarted = build_app(
        Arc::clone(&chain.store),
        AppConfig::default(),
        Genesis::default(),
        None,
    );

    // Assert
    assert_eq!(restarted.phase(), LifecyclePhase::Ready);
    assert_eq!(restarted.last_block_height(), 3);
    assert_eq!(restarted.info().last_block_app_hash, hash);
    assert_eq!(
        restarted.consensus_params().and_then(ConsensusParams::max_block_gas),
        Some(5_000_000)
    );

    restarted.begin_block(RequestBeginBlock {
        header: header(4),
        ..Default::default()
    });
    restarted.end_block(RequestEndBlock { height: 4 });
    restarted.commit();
    assert_eq!(restarted.last_block_height(), 4);
}

#[test]
fn test_vote_infos_visible_to_block() {
    let mut chain = TestChain::new(AppConfig::default());
    let votes = vec![VoteInfo {
        validator: Validator {
            address: vec![9; 20],
            power: 10,
        },
        signed_last_block: true,
    }];

    chain.app.begin_block(RequestBeginBlock {
        hash: vec![2; 32],
        header: header(2),
        last_commit_info: LastCommitInfo {
            round: 0,
            votes: votes.clone(),
        },
    });

    assert_eq!(chain.app.vote_infos(), votes.as_slice());
    let ctx = chain.app.deliver_context().expect("block in progress");
    assert_eq!(ctx.vote_infos(), votes.as_slice());
    assert_eq!(ctx.block_height(), 2);
    chain.end_and_commit();
}

#[test]
fn test_end_block_consensus_param_updates_persist() {
    let store = Arc::new(VersionedStore::new());
    let updates: EndBlocker = Arc::new(
        |_ctx: &Context, req: &RequestEndBlock| -> qc_app_runtime::Result<ResponseEndBlock> {
            let mut res = ResponseEndBlock::default();
            if req.height == 2 {
                res.consensus_param_updates = Some(ConsensusParams {
                    block: Some(BlockParams {
                        max_bytes: 1024,
                        max_gas: 750_000,
                    }),
                });
            }
            Ok(res)
        },
    );
    let mut app = BaseApp::builder(store.clone(), Arc::new(BincodeTxCodec))
        .with_router(router())
        .with_end_blocker(updates)
        .build()
        .unwrap();
    app.init_chain(genesis_request(Vec::new()));

    for height in 1..=2 {
        app.begin_block(RequestBeginBlock {
            header: header(height),
            ..Default::default()
        });
        app.end_block(RequestEndBlock { height });
        app.commit();
    }
    assert_eq!(
        app.consensus_params().and_then(ConsensusParams::max_block_gas),
        Some(750_000)
    );

    let restarted = BaseApp::builder(store, Arc::new(BincodeTxCodec))
        .build()
        .unwrap();
    assert_eq!(
        restarted.consensus_params().and_then(ConsensusParams::max_block_gas),
        Some(750_000)
    );
}

#[tokio::test]
async fn test_halt_signal_fires_at_halt_height() {
    // Arrange
    let config = AppConfig {
        halt_height: 3,
        ..AppConfig::default()
    };
    let mut chain = TestChain::new(config);
    let mut halt = chain.app.halt_signal();

    // Act
    chain.block(Vec::new());
    assert!(!*halt.borrow());
    chain.block(Vec::new());

    // Assert
    timeout(Duration::from_secs(1), halt.changed())
        .await
        .expect("Should halt within timeout")
        .expect("Halt sender alive");
    assert!(*halt.borrow());
    assert_eq!(chain.height(), 3);
}

#[tokio::test]
async fn test_halt_signal_fires_at_halt_time() {
    let config = AppConfig {
        halt_time: GENESIS_TIME + 2,
        ..AppConfig::default()
    };
    let mut chain = TestChain::new(config);
    let mut halt = chain.app.halt_signal();

    chain.block(Vec::new());

    timeout(Duration::from_secs(1), halt.changed())
        .await
        .expect("Should halt within timeout")
        .expect("Halt sender alive");
    assert!(*halt.borrow());
}

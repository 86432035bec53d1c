//! # Solo Node Integration Tests
//!
//! Drives the bank app through the block loop until the configured halt.

use node_runtime::bank::{MsgSend, DEFAULT_DENOM};
use node_runtime::{build_app, GenesisDoc, NodeConfig, NodeError, SoloNode, StopReason};
use qc_app_runtime::auth::get_account;
use qc_app_runtime::{
    AppConfig, Application, BaseApp, BincodeTxCodec, Coin, Coins, Fee, RequestQuery, SignDoc, Tx,
    TxSignature,
};
use qc_app_store::VersionedStore;
use qc_keyring::{Keyring, Signer};
use shared_types::{format_address, Address};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const CHAIN_ID: &str = "qc-node-test";

fn node_config(halt_height: u64) -> NodeConfig {
    NodeConfig {
        chain_id: CHAIN_ID.to_string(),
        block_interval: Duration::from_millis(100),
        app: AppConfig {
            halt_height,
            ..AppConfig::default()
        },
        ..NodeConfig::default()
    }
}

/// App with `alice` funded at genesis and block 1 committed.
fn started_node(keyring: &Keyring, halt_height: u64) -> (SoloNode, node_runtime::NodeHandle) {
    let alice = keyring.generate("alice").unwrap();
    let config = node_config(halt_height);
    let mut app = build_app(&config, Arc::new(VersionedStore::new())).unwrap();
    let genesis = GenesisDoc::dev(CHAIN_ID, 1_700_000_000, alice.address, 1_000);
    app.init_chain(genesis.init_chain_request().unwrap());

    let (mut node, handle) = SoloNode::new(app, CHAIN_ID, config.block_interval);
    node.produce_block();
    (node, handle)
}

fn signed_send(app: &BaseApp, keyring: &Keyring, from: &str, to: Address, amount: u128) -> Vec<u8> {
    let sender = keyring.key(from).unwrap().address;
    let (account_number, sequence) = get_account(app.check_context(), &sender)
        .unwrap()
        .map_or((0, 0), |account| (account.account_number, account.sequence));

    let msg = MsgSend {
        to,
        amount: Coins::new(vec![Coin::new(DEFAULT_DENOM, amount)]),
    }
    .into_msg(sender)
    .unwrap();
    let mut tx = Tx {
        msgs: vec![msg],
        fee: Fee {
            amount: Coins::empty(),
            gas_limit: 200_000,
        },
        memo: String::new(),
        signatures: Vec::new(),
    };
    let sign_bytes = SignDoc::new(CHAIN_ID, account_number, sequence, &tx)
        .sign_bytes()
        .unwrap();
    let (signature, pub_key) = keyring.sign(from, &sign_bytes).unwrap();
    tx.signatures.push(TxSignature {
        pub_key,
        signature,
        sequence,
    });
    BincodeTxCodec.encode(&tx).unwrap()
}

fn balance(app: &BaseApp, address: &Address) -> Vec<u8> {
    app.query(RequestQuery {
        path: format!("custom/bank/balance/{}", format_address(address)),
        ..Default::default()
    })
    .value
}

#[tokio::test]
async fn test_node_commits_submitted_tx_and_halts() {
    // Arrange
    let keyring = Keyring::new();
    let (node, handle) = started_node(&keyring, 3);
    assert_eq!(node.height(), 1);
    let bob = [0xB0; 20];
    let tx = signed_send(node.app(), &keyring, "alice", bob, 250);
    let running = tokio::spawn(node.run());

    // Act
    let res = timeout(Duration::from_secs(5), handle.submit(tx))
        .await
        .expect("Should answer CheckTx within timeout")
        .unwrap();
    let (app, reason) = timeout(Duration::from_secs(10), running)
        .await
        .expect("Should halt within timeout")
        .unwrap()
        .unwrap();

    // Assert
    assert!(res.is_ok(), "CheckTx failed: {}", res.log);
    assert_eq!(reason, StopReason::Halted);
    assert_eq!(app.last_block_height(), 3);
    assert_eq!(balance(&app, &bob), b"250");
    let alice = keyring.key("alice").unwrap().address;
    assert_eq!(balance(&app, &alice), b"750");
}

#[tokio::test]
async fn test_rejected_tx_is_not_queued() {
    // Arrange
    let keyring = Keyring::new();
    let (node, handle) = started_node(&keyring, 2);
    keyring.generate("mallory").unwrap();
    let tx = signed_send(node.app(), &keyring, "mallory", [0xB0; 20], 1);
    let running = tokio::spawn(node.run());

    // Act
    let res = timeout(Duration::from_secs(5), handle.submit(tx))
        .await
        .expect("Should answer CheckTx within timeout")
        .unwrap();
    let (app, _) = timeout(Duration::from_secs(10), running)
        .await
        .expect("Should halt within timeout")
        .unwrap()
        .unwrap();

    // Assert
    assert!(!res.is_ok());
    assert_eq!(app.last_block_height(), 2);
    assert_eq!(balance(&app, &[0xB0; 20]), b"0");
}

#[tokio::test]
async fn test_submit_after_stop_fails() {
    let keyring = Keyring::new();
    let (node, handle) = started_node(&keyring, 2);

    timeout(Duration::from_secs(10), node.run())
        .await
        .expect("Should halt within timeout")
        .unwrap();

    let result = handle.submit(vec![1, 2, 3]).await;
    assert!(matches!(result, Err(NodeError::Stopped)));
}

//! Shared harness for the runtime integration tests.
//!
//! Builds a `BaseApp` over an in-memory store with the standard ante chain
//! and a handful of test modules:
//!
//! | Route | Behavior |
//! |-------|----------|
//! | `bank` | moves coins from the first signer to the payload's recipient |
//! | `counter` | increments `counter` in the store |
//! | `fail` | writes `fail/touched`, then returns a module error |
//! | `panic` | panics |
//! | `burn` | consumes the payload's amount of gas |

#![allow(dead_code)]

use qc_app_runtime::auth::{get_account, mint_coins};
use qc_app_runtime::{
    standard_ante_chain, AppConfig, BaseAccount, BaseApp, BincodeTxCodec, Coin, Coins, Context,
    Fee, Msg, MsgResult, QueryRouter, RequestBeginBlock, RequestDeliverTx, RequestEndBlock,
    RequestInitChain, RequestQuery, ResponseDeliverTx, ResponseInitChain, Router,
    Secp256k1Verifier, SignDoc, SnapshotStore, Tx, TxError, TxSignature,
};
use qc_app_runtime::{Application, InitChainer};
use qc_app_store::{KvStore, VersionedStore};
use qc_keyring::{Keyring, Signer};
use serde::{Deserialize, Serialize};
use shared_types::{Address, BlockHeader, BlockParams, ConsensusParams, LastCommitInfo, ValidatorUpdate};
use std::sync::Arc;

pub const CHAIN_ID: &str = "qc-test-1";
pub const DENOM: &str = "uqc";
pub const FEE_COLLECTOR: Address = [0xFE; 20];
pub const GENESIS_TIME: u64 = 1_700_000_000;
pub const DEFAULT_GAS: u64 = 200_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendPayload {
    pub to: Address,
    pub amount: Coins,
}

#[derive(Clone, Default)]
pub struct Genesis {
    pub balances: Vec<(Address, u128)>,
    pub validators: Vec<ValidatorUpdate>,
    pub max_block_gas: Option<i64>,
}

pub fn coins(amount: u128) -> Coins {
    Coins::new(vec![Coin::new(DENOM, amount)])
}

fn bank_handler() -> qc_app_runtime::Handler {
    Arc::new(|ctx: &Context, msg: &Msg| -> qc_app_runtime::Result<MsgResult> {
        let payload: SendPayload = bincode::deserialize(&msg.payload)
            .map_err(|e| TxError::Decode(e.to_string()))?;
        qc_app_runtime::auth::send_coins(ctx, &msg.signers[0], &payload.to, &payload.amount)?;
        Ok(MsgResult {
            data: b"sent".to_vec(),
            log: format!("sent {}", payload.amount),
            events: Vec::new(),
        })
    })
}

fn counter_handler() -> qc_app_runtime::Handler {
    Arc::new(|ctx: &Context, _msg: &Msg| -> qc_app_runtime::Result<MsgResult> {
        let store = ctx.store();
        let current = store
            .get(b"counter")?
            .map(|bytes| u64::from_be_bytes(bytes.try_into().unwrap_or([0; 8])))
            .unwrap_or(0);
        store.set(b"counter", (current + 1).to_be_bytes().to_vec())?;
        Ok(MsgResult {
            data: (current + 1).to_be_bytes().to_vec(),
            ..Default::default()
        })
    })
}

fn fail_handler() -> qc_app_runtime::Handler {
    Arc::new(|ctx: &Context, _msg: &Msg| -> qc_app_runtime::Result<MsgResult> {
        ctx.store().set(b"fail/touched", vec![1])?;
        Err(TxError::module("fail", 7, "always fails"))
    })
}

fn panic_handler() -> qc_app_runtime::Handler {
    Arc::new(|_ctx: &Context, _msg: &Msg| -> qc_app_runtime::Result<MsgResult> {
        panic!("handler exploded")
    })
}

fn burn_handler() -> qc_app_runtime::Handler {
    Arc::new(|ctx: &Context, msg: &Msg| -> qc_app_runtime::Result<MsgResult> {
        let amount: u64 = bincode::deserialize(&msg.payload)
            .map_err(|e| TxError::Decode(e.to_string()))?;
        ctx.gas_meter().consume(amount, "burn")?;
        Ok(MsgResult::default())
    })
}

pub fn router() -> Router {
    let mut router = Router::new();
    router
        .add_route("bank", bank_handler())
        .and_then(|r| r.add_route("counter", counter_handler()))
        .and_then(|r| r.add_route("fail", fail_handler()))
        .and_then(|r| r.add_route("panic", panic_handler()))
        .and_then(|r| r.add_route("burn", burn_handler()))
        .expect("routes register");
    router
}

/// `custom/bank/balance/<hex address>` returns the `uqc` balance as a
/// decimal string.
pub fn query_router() -> QueryRouter {
    let mut queries = QueryRouter::new();
    queries
        .add_route(
            "bank",
            Arc::new(
                |ctx: &Context, path: &[String], _req: &RequestQuery| -> qc_app_runtime::Result<Vec<u8>> {
                    match path {
                        [kind, address] if kind == "balance" => {
                            let address = shared_types::parse_address(address)
                                .map_err(|e| TxError::InvalidAddress(e.to_string()))?;
                            let balance = get_account(ctx, &address)?
                                .map_or(0, |account| account.coins.amount_of(DENOM));
                            Ok(balance.to_string().into_bytes())
                        }
                        _ => Err(TxError::UnknownRequest(format!("unknown bank query {path:?}"))),
                    }
                },
            ),
        )
        .expect("query route registers");
    queries
}

fn init_chainer(genesis: Genesis) -> InitChainer {
    Arc::new(
        move |ctx: &Context, _req: &RequestInitChain| -> qc_app_runtime::Result<ResponseInitChain> {
            for (address, amount) in &genesis.balances {
                mint_coins(ctx, *address, &coins(*amount))?;
            }
            Ok(ResponseInitChain {
                consensus_params: None,
                validators: genesis.validators.clone(),
            })
        },
    )
}

pub fn build_app(
    store: Arc<VersionedStore>,
    config: AppConfig,
    genesis: Genesis,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
) -> BaseApp {
    let ante = standard_ante_chain(config.ante_params(), FEE_COLLECTOR, Arc::new(Secp256k1Verifier));
    let mut builder = BaseApp::builder(store, Arc::new(BincodeTxCodec))
        .with_config(config)
        .with_router(router())
        .with_query_router(query_router())
        .with_ante_handler(Arc::new(ante))
        .with_init_chainer(init_chainer(genesis));
    if let Some(snapshot_store) = snapshot_store {
        builder = builder.with_snapshot_store(snapshot_store);
    }
    builder.build().expect("app builds")
}

pub fn header(height: u64) -> BlockHeader {
    BlockHeader {
        chain_id: CHAIN_ID.to_string(),
        height,
        time: GENESIS_TIME + height,
        proposer_address: vec![0xAA; 20],
        app_hash: Vec::new(),
    }
}

/// Drives an app through blocks.
pub struct TestChain {
    pub app: BaseApp,
    pub keyring: Keyring,
    pub store: Arc<VersionedStore>,
}

impl TestChain {
    /// Fresh chain with funded keys `alice` and `bob`. Genesis is committed
    /// as block 1 so the check state sees the accounts.
    pub fn new(config: AppConfig) -> Self {
        Self::with_genesis(config, Genesis::default(), None)
    }

    pub fn with_genesis(
        config: AppConfig,
        mut genesis: Genesis,
        snapshot_store: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        let keyring = Keyring::new();
        for name in ["alice", "bob"] {
            let info = keyring.generate(name).expect("key generates");
            genesis.balances.push((info.address, 1_000_000));
        }

        let store = Arc::new(VersionedStore::with_chunk_size(64));
        let max_block_gas = genesis.max_block_gas;
        let mut app = build_app(Arc::clone(&store), config, genesis, snapshot_store);
        app.init_chain(RequestInitChain {
            time: GENESIS_TIME,
            chain_id: CHAIN_ID.to_string(),
            consensus_params: max_block_gas.map(|max_gas| ConsensusParams {
                block: Some(BlockParams {
                    max_bytes: 1 << 20,
                    max_gas,
                }),
            }),
            validators: Vec::new(),
            app_state_bytes: Vec::new(),
        });
        let mut chain = Self {
            app,
            keyring,
            store,
        };
        chain.block(Vec::new());
        chain
    }

    pub fn address(&self, name: &str) -> Address {
        self.keyring.key(name).expect("key exists").address
    }

    pub fn height(&self) -> u64 {
        self.app.last_block_height()
    }

    pub fn begin_block(&mut self) {
        let height = self.height() + 1;
        self.app.begin_block(RequestBeginBlock {
            hash: vec![height as u8; 32],
            header: header(height),
            last_commit_info: LastCommitInfo::default(),
        });
    }

    pub fn deliver(&mut self, tx: Vec<u8>) -> ResponseDeliverTx {
        self.app.deliver_tx(RequestDeliverTx { tx })
    }

    /// EndBlock + Commit; returns the commitment hash.
    pub fn end_and_commit(&mut self) -> Vec<u8> {
        let height = self.height() + 1;
        self.app.end_block(RequestEndBlock { height });
        self.app.commit().data
    }

    /// One full block.
    pub fn block(&mut self, txs: Vec<Vec<u8>>) -> (Vec<ResponseDeliverTx>, Vec<u8>) {
        self.begin_block();
        let results = txs.into_iter().map(|tx| self.deliver(tx)).collect();
        let hash = self.end_and_commit();
        (results, hash)
    }

    /// Committed account as seen by the check state.
    pub fn account(&self, name: &str) -> BaseAccount {
        get_account(self.app.check_context(), &self.address(name))
            .expect("account readable")
            .expect("account exists")
    }

    pub fn balance(&self, address: &Address) -> u128 {
        get_account(self.app.check_context(), address)
            .expect("account readable")
            .map_or(0, |account| account.coins.amount_of(DENOM))
    }

    /// Sign `msgs` from `name` at an explicit sequence.
    pub fn sign_at(&self, name: &str, sequence: u64, msgs: Vec<Msg>, fee: Fee) -> Vec<u8> {
        let account = self.account(name);
        let mut tx = Tx {
            msgs,
            fee,
            memo: String::new(),
            signatures: Vec::new(),
        };
        let sign_bytes = SignDoc::new(CHAIN_ID, account.account_number, sequence, &tx)
            .sign_bytes()
            .expect("sign bytes encode");
        let (signature, pub_key) = self.keyring.sign(name, &sign_bytes).expect("key signs");
        tx.signatures.push(TxSignature {
            pub_key,
            signature,
            sequence,
        });
        BincodeTxCodec.encode(&tx).expect("tx encodes")
    }

    /// Sign at the account's committed sequence with the default gas limit.
    pub fn sign(&self, name: &str, msgs: Vec<Msg>) -> Vec<u8> {
        let sequence = self.account(name).sequence;
        self.sign_at(name, sequence, msgs, fee(0, DEFAULT_GAS))
    }

    pub fn send_msg(&self, from: &str, to: Address, amount: u128) -> Msg {
        let payload = bincode::serialize(&SendPayload {
            to,
            amount: coins(amount),
        })
        .expect("payload encodes");
        Msg::new("bank", "send", vec![self.address(from)], payload)
    }

    pub fn route_msg(&self, from: &str, route: &str) -> Msg {
        Msg::new(route, route, vec![self.address(from)], Vec::new())
    }

    pub fn burn_msg(&self, from: &str, gas: u64) -> Msg {
        Msg::new(
            "burn",
            "burn",
            vec![self.address(from)],
            bincode::serialize(&gas).expect("payload encodes"),
        )
    }

    pub fn raw_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.store.get(key).expect("root readable")
    }
}

pub fn fee(amount: u128, gas_limit: u64) -> Fee {
    Fee {
        amount: if amount == 0 { Coins::empty() } else { coins(amount) },
        gas_limit,
    }
}

//! An in-process chain for running swaps without a node.
//!
//! A [`Ledger`] hosts the limit order protocol, both escrow factories and the
//! escrows they create. It executes JSON encoded calls as well as the Move
//! calls of the Sui escrow package. Calls are executed as soon as they are
//! submitted and either end up in a new block or as a reverted receipt. The
//! clock follows tokio's clock, so tests with a paused runtime fast-forward
//! through timelocks deterministically.

use crate::{
    address::{AddressKind, NativeAddress},
    chain::{
        BlockRef, Call, CallEncoder, ChainClient, DepositHandle, EscrowHandle, EventData,
        EventSelector, Payload, Receipt, Revert, TxRef,
    },
    escrow::{Escrow, EscrowError, EscrowState, Settlement},
    ethereum::{keccak256, ChainId, Hash, U256},
    immutables::{DstEscrowCreated, DstImmutablesComplement, Immutables, SrcEscrowCreated},
    order::{CrossChainOrder, Domain, FillPolicy, AGGREGATION_ROUTER_V6},
    resolver::{DeployedEscrow, SecretSource},
    signer::{self, Signature},
    sui::{self, MoveCall},
    taker_traits::{AmountMode, TakerTraits},
    timelocks::Stage,
    Secret, Side, Timestamp,
};
use anyhow::Context;
use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::{sync::Mutex, time::Instant};

/// The token slot used for the chain's native currency.
pub fn native() -> U256 {
    U256::zero()
}

#[derive(Clone, Debug)]
pub struct Ledger {
    chain_id: ChainId,
    state: Arc<Mutex<State>>,
}

#[derive(Debug)]
struct State {
    genesis: Timestamp,
    started: Instant,
    skew: u32,
    domain: Domain,
    nonce: u64,
    blocks: Vec<Block>,
    receipts: HashMap<TxRef, Result<Receipt, Revert>>,
    balances: HashMap<(U256, U256), U256>,
    escrows: HashMap<EscrowHandle, Locked>,
    filled: HashSet<Hash>,
    stall_confirmations: bool,
    failing_submissions: u32,
}

#[derive(Debug)]
struct Block {
    hash: BlockRef,
    events: Vec<Emitted>,
}

#[derive(Clone, Copy, Debug)]
enum Emitted {
    SrcEscrowCreated {
        escrow: EscrowHandle,
        created: SrcEscrowCreated,
    },
    DstEscrowCreated {
        escrow: EscrowHandle,
        created: DstEscrowCreated,
    },
}

impl Emitted {
    fn selector(&self) -> EventSelector {
        match self {
            Emitted::SrcEscrowCreated { .. } => EventSelector::src_escrow_created(),
            Emitted::DstEscrowCreated { .. } => EventSelector::dst_escrow_created(),
        }
    }

    fn to_event_data(&self) -> anyhow::Result<EventData> {
        let (emitter, data) = match self {
            Emitted::SrcEscrowCreated { escrow, created } => {
                (*escrow, serde_json::to_vec(created)?)
            }
            Emitted::DstEscrowCreated { escrow, created } => (*escrow, created.to_abi()),
        };

        Ok(EventData {
            selector: self.selector(),
            emitter,
            data,
        })
    }
}

/// An escrow together with the token it holds.
#[derive(Clone, Copy, Debug)]
struct Locked {
    escrow: Escrow,
    token: U256,
}

struct Outcome {
    created: Option<EscrowHandle>,
    events: Vec<Emitted>,
}

impl Ledger {
    pub fn new(chain_id: ChainId, genesis: Timestamp) -> Self {
        Ledger {
            chain_id,
            state: Arc::new(Mutex::new(State {
                genesis,
                started: Instant::now(),
                skew: 0,
                domain: Domain::aggregation_router(chain_id),
                nonce: 0,
                blocks: Vec::new(),
                receipts: HashMap::new(),
                balances: HashMap::new(),
                escrows: HashMap::new(),
                filled: HashSet::new(),
                stall_confirmations: false,
                failing_submissions: 0,
            })),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// A client submitting transactions as `account`.
    pub fn client(&self, account: U256) -> LedgerClient {
        LedgerClient {
            ledger: self.clone(),
            account,
        }
    }

    pub async fn now(&self) -> Timestamp {
        self.state.lock().await.now()
    }

    /// Moves the clock forward on top of the elapsed runtime time.
    pub async fn advance(&self, seconds: u32) {
        let mut state = self.state.lock().await;
        state.skew = state.skew.saturating_add(seconds);
    }

    pub async fn mint(&self, token: U256, owner: U256, amount: U256) {
        let mut state = self.state.lock().await;
        state.credit(token, owner, amount);
    }

    pub async fn balance(&self, token: U256, owner: U256) -> U256 {
        self.state.lock().await.balance(token, owner)
    }

    pub async fn escrow(&self, handle: EscrowHandle) -> Option<Escrow> {
        self.locked(handle).await.map(|locked| locked.escrow)
    }

    async fn locked(&self, handle: EscrowHandle) -> Option<Locked> {
        self.state.lock().await.escrows.get(&handle).copied()
    }

    /// Confirmations never arrive while stalled, transactions are still
    /// executed.
    pub async fn stall_confirmations(&self, stall: bool) {
        self.state.lock().await.stall_confirmations = stall;
    }

    /// The next `count` submissions fail before reaching the chain.
    pub async fn fail_next_submissions(&self, count: u32) {
        self.state.lock().await.failing_submissions = count;
    }

    /// Forgets the most recent block and its events, as a reorg would.
    pub async fn drop_latest_block(&self) {
        self.state.lock().await.blocks.pop();
    }

    async fn submit(&self, sender: U256, payload: Payload) -> anyhow::Result<TxRef> {
        let mut state = self.state.lock().await;

        if state.failing_submissions > 0 {
            state.failing_submissions -= 1;
            anyhow::bail!("connection reset by peer");
        }

        let call = match serde_json::from_slice::<Call>(&payload.data) {
            Ok(call) => call,
            Err(_) => {
                let move_call = bcs::from_bytes::<MoveCall>(&payload.data)
                    .context("payload is not a known call")?;
                sui::decode_call(&move_call, |handle| {
                    state
                        .escrows
                        .get(&handle)
                        .map(|locked| locked.escrow.immutables)
                })?
            }
        };

        state.nonce += 1;
        let tx = TxRef(keccak256(
            &[&state.nonce.to_be_bytes()[..], &payload.data].concat(),
        ));

        let now = state.now();
        let result = state.execute(sender, call, now);

        let receipt = match result {
            Ok(outcome) => {
                let height = state.blocks.len() as u64;
                let block = BlockRef(keccak256(
                    &[&height.to_be_bytes()[..], tx.0.as_bytes()].concat(),
                ));
                state.blocks.push(Block {
                    hash: block,
                    events: outcome.events,
                });

                tracing::debug!("{} included in block {}", tx, block);

                Ok(Receipt {
                    tx,
                    block,
                    block_time: now,
                    created: outcome.created,
                })
            }
            Err(revert) => {
                tracing::debug!("{} reverted: {}", tx, revert);
                Err(revert)
            }
        };
        state.receipts.insert(tx, receipt);

        Ok(tx)
    }
}

impl State {
    #[allow(clippy::cast_possible_truncation)]
    fn now(&self) -> Timestamp {
        let elapsed = self.started.elapsed().as_secs().min(u64::from(u32::MAX)) as u32;

        self.genesis.plus(elapsed).plus(self.skew)
    }

    fn balance(&self, token: U256, owner: U256) -> U256 {
        self.balances
            .get(&(token, owner))
            .copied()
            .unwrap_or_else(U256::zero)
    }

    fn credit(&mut self, token: U256, owner: U256, amount: U256) {
        let balance = self.balances.entry((token, owner)).or_insert_with(U256::zero);
        *balance = balance.saturating_add(amount);
    }

    fn ensure_balance(&self, token: U256, owner: U256, amount: U256) -> Result<(), Revert> {
        if self.balance(token, owner) < amount {
            return Err(Revert::InsufficientBalance);
        }

        Ok(())
    }

    /// Callers check the balance beforehand.
    fn transfer(&mut self, token: U256, from: U256, to: U256, amount: U256) {
        let balance = self.balances.entry((token, from)).or_insert_with(U256::zero);
        *balance = balance.saturating_sub(amount);
        self.credit(token, to, amount);
    }

    /// Applies `call`, leaving the state untouched if it reverts.
    fn execute(&mut self, sender: U256, call: Call, now: Timestamp) -> Result<Outcome, Revert> {
        match call {
            Call::DeploySrc {
                order,
                signature,
                taker_traits,
                args,
                amount,
                safety_deposit,
            } => self.fill_order(
                sender,
                &order,
                signature,
                taker_traits,
                &args,
                amount,
                safety_deposit,
                now,
            ),
            Call::DeployDst {
                immutables,
                token,
                src_cancellation,
                deposit,
                amount,
                taker_traits: _,
            } => self.create_dst_escrow(
                sender,
                immutables,
                token,
                src_cancellation,
                deposit,
                amount,
            ),
            Call::Withdraw {
                side,
                escrow,
                secret,
                immutables,
            } => self.settle(side, escrow, &immutables, |escrow| {
                escrow.withdraw(sender, &secret, now)
            }),
            Call::Cancel {
                side,
                escrow,
                immutables,
            } => self.settle(side, escrow, &immutables, |escrow| escrow.cancel(sender, now)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fill_order(
        &mut self,
        resolver: U256,
        order: &CrossChainOrder,
        signature: Signature,
        taker_traits: U256,
        args: &[u8],
        amount: U256,
        safety_deposit: U256,
        now: Timestamp,
    ) -> Result<Outcome, Revert> {
        let order_hash = order.order_hash(&self.domain);

        let signer = signer::recover(&order.signing_message(&self.domain), &signature)
            .map_err(|_| Revert::FillRejected("bad signature".to_owned()))?;
        if signer.to_u256() != order.maker() {
            return Err(Revert::FillRejected(format!(
                "order is signed by {} instead of the maker",
                signer
            )));
        }
        if self.filled.contains(&order_hash) {
            return Err(Revert::FillRejected("order already filled".to_owned()));
        }
        if order.maker_traits().is_expired(now) {
            return Err(Revert::FillRejected("order expired".to_owned()));
        }

        let may_fill = match NativeAddress::from_u256(AddressKind::Evm, resolver) {
            Ok(NativeAddress::Evm(address)) => order.whitelist().may_fill(address, now),
            _ => false,
        };
        if !may_fill {
            return Err(Revert::FillRejected(format!(
                "resolver may not fill at {}",
                now
            )));
        }

        if amount != order.making_amount() {
            return Err(Revert::FillRejected("partial fill".to_owned()));
        }
        let (mode, threshold, extension_length) = TakerTraits::decode(taker_traits);
        if mode != AmountMode::Maker || order.taking_amount() > threshold {
            return Err(Revert::FillRejected("taking amount exceeds threshold".to_owned()));
        }
        if extension_length != args.len() || args != order.extension().encode().as_slice() {
            return Err(Revert::FillRejected("extension mismatch".to_owned()));
        }
        if !order.salt_matches_extension() {
            return Err(Revert::FillRejected("salt does not commit to extension".to_owned()));
        }
        if safety_deposit != order.src_safety_deposit() {
            return Err(Revert::FillRejected("wrong safety deposit".to_owned()));
        }

        let immutables = Immutables {
            order_hash,
            hashlock: order.hashlock(),
            maker: order.maker(),
            taker: resolver,
            amount,
            safety_deposit,
            timelocks: order.timelocks().with_deployed_at(now),
        };
        let escrow = EscrowHandle(immutables.hash());
        if self.escrows.contains_key(&escrow) {
            return Err(Revert::AlreadyDeployed(escrow));
        }

        self.ensure_balance(order.maker_asset(), order.maker(), amount)?;
        self.ensure_balance(native(), resolver, safety_deposit)?;

        let account = U256::from(escrow.0);
        self.transfer(order.maker_asset(), order.maker(), account, amount);
        self.transfer(native(), resolver, account, safety_deposit);
        self.filled.insert(order_hash);
        self.escrows.insert(escrow, Locked {
            escrow: Escrow::new(Side::Src, immutables),
            token: order.maker_asset(),
        });

        let created = SrcEscrowCreated {
            immutables,
            complement: DstImmutablesComplement {
                maker: order.receiver_or_maker(),
                amount: order.taking_amount(),
                token: order.taker_asset(),
                safety_deposit: order.dst_safety_deposit(),
                chain_id: order.dst_chain_id(),
            },
        };

        Ok(Outcome {
            created: Some(escrow),
            events: vec![Emitted::SrcEscrowCreated { escrow, created }],
        })
    }

    fn create_dst_escrow(
        &mut self,
        resolver: U256,
        immutables: Immutables,
        token: U256,
        src_cancellation: Timestamp,
        deposit: DepositHandle,
        amount: U256,
    ) -> Result<Outcome, Revert> {
        if immutables.timelocks.start_of(Stage::DstCancellation) > src_cancellation {
            return Err(Revert::InvalidCreationTime);
        }
        if amount != immutables.amount {
            return Err(Revert::InvalidImmutables);
        }
        if let DepositHandle::Attached(value) = deposit {
            if value != immutables.safety_deposit {
                return Err(Revert::InsufficientBalance);
            }
        }

        let escrow = EscrowHandle(immutables.hash());
        if self.escrows.contains_key(&escrow) {
            return Err(Revert::AlreadyDeployed(escrow));
        }

        self.ensure_balance(token, resolver, amount)?;
        self.ensure_balance(native(), resolver, immutables.safety_deposit)?;

        let account = U256::from(escrow.0);
        self.transfer(token, resolver, account, amount);
        self.transfer(native(), resolver, account, immutables.safety_deposit);
        self.escrows.insert(escrow, Locked {
            escrow: Escrow::new(Side::Dst, immutables),
            token,
        });

        Ok(Outcome {
            created: Some(escrow),
            events: vec![Emitted::DstEscrowCreated {
                escrow,
                created: DstEscrowCreated {
                    escrow: U256::from(escrow.0),
                    hashlock: immutables.hashlock,
                    taker: immutables.taker,
                },
            }],
        })
    }

    fn settle(
        &mut self,
        side: Side,
        handle: EscrowHandle,
        immutables: &Immutables,
        transition: impl FnOnce(&mut Escrow) -> Result<Settlement, EscrowError>,
    ) -> Result<Outcome, Revert> {
        let locked = *self
            .escrows
            .get(&handle)
            .ok_or(Revert::UnknownEscrow(handle))?;
        if locked.escrow.side != side || locked.escrow.immutables.hash() != immutables.hash() {
            return Err(Revert::InvalidImmutables);
        }

        let mut escrow = locked.escrow;
        let settlement = transition(&mut escrow)?;

        let account = U256::from(handle.0);
        self.transfer(locked.token, account, settlement.recipient, settlement.amount);
        self.transfer(
            native(),
            account,
            settlement.deposit_recipient,
            settlement.safety_deposit,
        );
        self.escrows.insert(handle, Locked { escrow, ..locked });

        Ok(Outcome {
            created: None,
            events: Vec::new(),
        })
    }
}

/// A [`Ledger`] seen through the account of one participant.
#[derive(Clone, Debug)]
pub struct LedgerClient {
    ledger: Ledger,
    account: U256,
}

#[async_trait]
impl ChainClient for LedgerClient {
    async fn submit_transaction(&self, payload: Payload) -> anyhow::Result<TxRef> {
        self.ledger.submit(self.account, payload).await
    }

    async fn await_confirmation(&self, tx: TxRef) -> anyhow::Result<Receipt> {
        let (stalled, receipt) = {
            let state = self.ledger.state.lock().await;
            (state.stall_confirmations, state.receipts.get(&tx).cloned())
        };

        if stalled {
            futures::future::pending::<()>().await;
        }

        match receipt {
            Some(Ok(receipt)) => Ok(receipt),
            Some(Err(revert)) => Err(anyhow::Error::new(revert)),
            None => anyhow::bail!("unknown transaction {}", tx),
        }
    }

    async fn read_event(
        &self,
        block: BlockRef,
        selector: EventSelector,
    ) -> anyhow::Result<Option<EventData>> {
        let state = self.ledger.state.lock().await;

        let emitted = state
            .blocks
            .iter()
            .find(|candidate| candidate.hash == block)
            .and_then(|block| {
                block
                    .events
                    .iter()
                    .find(|event| event.selector() == selector)
                    .copied()
            });

        emitted.map(|event| event.to_event_data()).transpose()
    }

    async fn current_time(&self) -> anyhow::Result<Timestamp> {
        Ok(self.ledger.now().await)
    }
}

/// Encodes calls as JSON, the format a [`Ledger`] executes.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCallEncoder;

impl CallEncoder for JsonCallEncoder {
    fn encode(&self, call: &Call) -> anyhow::Result<Payload> {
        let (to, value) = match call {
            Call::DeploySrc { safety_deposit, .. } => {
                (AGGREGATION_ROUTER_V6.to_u256(), *safety_deposit)
            }
            Call::DeployDst {
                deposit: DepositHandle::Attached(value),
                ..
            } => (U256::zero(), *value),
            Call::DeployDst { .. } => (U256::zero(), U256::zero()),
            Call::Withdraw { escrow, .. } | Call::Cancel { escrow, .. } => {
                (U256::from(escrow.0), U256::zero())
            }
        };

        Ok(Payload {
            to,
            value,
            data: serde_json::to_vec(call)?,
        })
    }

    fn decode_src_escrow_created(&self, event: &EventData) -> anyhow::Result<SrcEscrowCreated> {
        if event.selector != EventSelector::src_escrow_created() {
            anyhow::bail!("event {} is not a source escrow creation", event.selector);
        }

        serde_json::from_slice(&event.data).context("malformed source escrow event")
    }

    fn decode_dst_escrow_created(&self, event: &EventData) -> anyhow::Result<DstEscrowCreated> {
        if event.selector != EventSelector::dst_escrow_created() {
            anyhow::bail!("event {} is not a destination escrow creation", event.selector);
        }

        Ok(DstEscrowCreated::from_abi(&event.data)?)
    }
}

/// Hands out the maker's secrets once both escrows are funded as the order
/// demands.
///
/// The escrows are judged by what the ledgers store, the immutables the
/// resolver reports are only used to find them.
#[derive(Clone, Debug)]
pub struct SecretRelay {
    src: Ledger,
    dst: Ledger,
    orders: Arc<Mutex<HashMap<Hash, (CrossChainOrder, Secret)>>>,
}

impl SecretRelay {
    pub fn new(src: Ledger, dst: Ledger) -> Self {
        SecretRelay {
            src,
            dst,
            orders: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Keeps `secret` until the escrows of `order` are in place and returns
    /// the order hash it is filed under.
    pub async fn register(&self, domain: &Domain, order: CrossChainOrder, secret: Secret) -> Hash {
        let order_hash = order.order_hash(domain);
        self.orders.lock().await.insert(order_hash, (order, secret));

        order_hash
    }

    /// Looks up the escrow behind `deployed` and checks it holds `token` under
    /// `expected` immutables. The taker is whoever filled the order.
    async fn verify(
        ledger: &Ledger,
        deployed: &DeployedEscrow,
        expected: Immutables,
        token: U256,
    ) -> anyhow::Result<Immutables> {
        let locked = ledger.locked(deployed.handle).await.with_context(|| {
            format!("{} escrow {} does not exist", deployed.side, deployed.handle)
        })?;
        let stored = locked.escrow.immutables;

        let expected = Immutables {
            taker: stored.taker,
            ..expected
        }
        .with_deployed_at(stored.timelocks.deployed_at);
        if locked.escrow.side != deployed.side || stored != expected || locked.token != token {
            anyhow::bail!(
                "{} escrow {} is not funded as the order demands",
                deployed.side,
                deployed.handle
            );
        }
        if locked.escrow.state != EscrowState::Active {
            anyhow::bail!("{} escrow {} is already settled", deployed.side, deployed.handle);
        }

        Ok(stored)
    }
}

#[async_trait]
impl SecretSource for SecretRelay {
    async fn secret_for(
        &self,
        order_hash: Hash,
        src: &DeployedEscrow,
        dst: &DeployedEscrow,
    ) -> anyhow::Result<Secret> {
        let (order, secret) = self
            .orders
            .lock()
            .await
            .get(&order_hash)
            .cloned()
            .with_context(|| format!("no secret for order {}", order_hash))?;

        if self.dst.chain_id() != order.dst_chain_id() {
            anyhow::bail!(
                "order {} targets chain {} instead of {}",
                order_hash,
                order.dst_chain_id(),
                self.dst.chain_id()
            );
        }

        let expected_src = Immutables {
            order_hash,
            hashlock: order.hashlock(),
            maker: order.maker(),
            taker: U256::zero(),
            amount: order.making_amount(),
            safety_deposit: order.src_safety_deposit(),
            timelocks: order.timelocks(),
        };
        let on_src = Self::verify(&self.src, src, expected_src, order.maker_asset()).await?;

        // the destination shares the baseline of the source escrow
        let expected_dst = Immutables {
            maker: order.receiver_or_maker(),
            amount: order.taking_amount(),
            safety_deposit: order.dst_safety_deposit(),
            timelocks: on_src.timelocks,
            ..expected_src
        };
        let on_dst = Self::verify(&self.dst, dst, expected_dst, order.taker_asset()).await?;
        if on_dst.timelocks.deployed_at != on_src.timelocks.deployed_at {
            anyhow::bail!(
                "dst escrow {} does not share the timelock baseline of the src escrow",
                dst.handle
            );
        }

        self.orders.lock().await.remove(&order_hash);
        tracing::info!("releasing secret of order {}", order_hash);

        Ok(secret)
    }
}

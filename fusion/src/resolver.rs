//! The resolver side of a swap.
//!
//! A [`Resolver`] fills an order on the source chain, mirrors the resulting
//! escrow on the destination chain and settles both once the maker releases
//! the secret. Each step is a method so that a driver can resume or cancel a
//! swap at any point, [`execute`] chains them into the happy path.

use crate::{
    chain::{
        self, BlockRef, Call, CallEncoder, ChainClient, ChainErrorKind, DepositHandle,
        EscrowHandle, EventSelector, Receipt, Revert, TxRef,
    },
    escrow::{Escrow, EscrowError},
    ethereum::{Hash, U256},
    immutables::{Immutables, SrcEscrowCreated},
    order::{CrossChainOrder, Domain, Extension, ValidationError},
    signer::Signature,
    taker_traits::{AmountMode, TakerTraits},
    timelocks::{Stage, TimeLocksError},
    Secret, Side, Timestamp,
};
use async_trait::async_trait;
use futures::Stream;
use genawaiter::sync::{Co, Gen};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing_futures::Instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Upper bound for a submitted transaction to be included.
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
    /// How often an event is looked for before giving up.
    pub poll_attempts: u32,
    /// How often a transiently failing transaction is resubmitted.
    pub retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            confirmation_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            poll_attempts: 10,
            retries: 3,
        }
    }
}

/// Everything the resolver needs to act on one chain.
#[derive(Clone)]
pub struct ChainContext {
    pub client: Arc<dyn ChainClient>,
    pub encoder: Arc<dyn CallEncoder>,
    /// The resolver's own address on this chain.
    pub identity: U256,
}

impl fmt::Debug for ChainContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainContext")
            .field("identity", &self.identity)
            .finish()
    }
}

/// An escrow the resolver has seen confirmed on chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedEscrow {
    pub side: Side,
    pub handle: EscrowHandle,
    pub immutables: Immutables,
}

/// Progress of a swap as reported by [`execute`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapState {
    OrderSigned { order_hash: Hash },
    SrcDeploying,
    SrcDeployed(DeployedEscrow),
    DstDeploying,
    DstDeployed(DeployedEscrow),
    SecretReceived,
    SecretRevealed { dst_withdrawal: TxRef },
    Withdrawn { src_withdrawal: TxRef },
    Cancelled { side: Side, tx: TxRef },
}

/// Releases the secret of an order once the maker is satisfied with both
/// escrows.
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn secret_for(
        &self,
        order_hash: Hash,
        src: &DeployedEscrow,
        dst: &DeployedEscrow,
    ) -> anyhow::Result<Secret>;
}

#[derive(Debug)]
pub struct Resolver {
    src: ChainContext,
    dst: ChainContext,
    /// Domain of the limit order protocol on the source chain.
    domain: Domain,
    config: Config,
}

impl Resolver {
    pub fn new(src: ChainContext, dst: ChainContext, domain: Domain, config: Config) -> Self {
        Resolver {
            src,
            dst,
            domain,
            config,
        }
    }

    fn chain(&self, side: Side) -> &ChainContext {
        match side {
            Side::Src => &self.src,
            Side::Dst => &self.dst,
        }
    }

    pub fn identity(&self, side: Side) -> U256 {
        self.chain(side).identity
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn order_hash(&self, order: &CrossChainOrder) -> Hash {
        order.order_hash(&self.domain)
    }

    /// Fills the whole order on the source chain, which creates the source
    /// escrow holding the maker's funds.
    pub async fn deploy_src(
        &self,
        order: &CrossChainOrder,
        signature: Signature,
        fill_amount: U256,
    ) -> Result<Receipt, Error> {
        if fill_amount != order.making_amount() {
            return Err(ValidationError::PartialFill {
                making_amount: order.making_amount(),
                fill_amount,
            }
            .into());
        }

        let (taker_traits, args) =
            TakerTraits::new(AmountMode::Maker, order.taking_amount(), order.extension())
                .encode()
                .map_err(ValidationError::from)?;

        let receipt = self
            .submit(Side::Src, Call::DeploySrc {
                order: order.clone(),
                signature,
                taker_traits,
                args,
                amount: fill_amount,
                safety_deposit: order.src_safety_deposit(),
            })
            .await?;

        tracing::info!("order filled in block {}", receipt.block);

        Ok(receipt)
    }

    /// Reads the source escrow created in `block`.
    pub async fn observe_src_deployment(
        &self,
        block: BlockRef,
    ) -> Result<(DeployedEscrow, SrcEscrowCreated), Error> {
        let event = chain::watch_for_event(
            self.src.client.as_ref(),
            block,
            EventSelector::src_escrow_created(),
            self.config.poll_interval,
            self.config.poll_attempts,
        )
        .await
        .map_err(|kind| ChainError::new(Side::Src, kind))?;

        let created = self
            .src
            .encoder
            .decode_src_escrow_created(&event)
            .map_err(|source| {
                ChainError::new(Side::Src, ChainErrorKind::MalformedEvent {
                    selector: event.selector,
                    source,
                })
            })?;

        let escrow = DeployedEscrow {
            side: Side::Src,
            handle: event.emitter,
            immutables: created.immutables,
        };

        Ok((escrow, created))
    }

    /// The immutables the destination escrow has to be created with.
    ///
    /// Both the observed source immutables and the derived destination
    /// immutables are compared against what the order dictates, any
    /// difference aborts the swap before funds are locked on the destination
    /// chain.
    ///
    /// The destination maker is the order's receiver, falling back to the
    /// maker when no receiver is set. It is not the source maker, whose
    /// address usually does not exist on the destination chain.
    pub fn derive_dst_immutables(
        &self,
        order: &CrossChainOrder,
        created: &SrcEscrowCreated,
    ) -> Result<Immutables, ProtocolInvariantError> {
        let deployed_at = created.immutables.timelocks.deployed_at;
        let expected_src = Immutables {
            order_hash: self.order_hash(order),
            hashlock: order.hashlock(),
            maker: order.maker(),
            taker: self.src.identity,
            amount: order.making_amount(),
            safety_deposit: order.src_safety_deposit(),
            timelocks: order.timelocks().with_deployed_at(deployed_at),
        };
        ProtocolInvariantError::check(Side::Src, &expected_src, &created.immutables)?;

        if created.complement.chain_id != order.dst_chain_id() {
            return Err(ProtocolInvariantError {
                side: Side::Dst,
                reason: "chain id",
                expected: Hash::from(U256::from(order.dst_chain_id())),
                actual: Hash::from(U256::from(created.complement.chain_id)),
            });
        }
        if created.complement.token != order.taker_asset() {
            return Err(ProtocolInvariantError {
                side: Side::Dst,
                reason: "token",
                expected: Hash::from(order.taker_asset()),
                actual: Hash::from(created.complement.token),
            });
        }

        let expected_dst = Immutables {
            maker: order.receiver_or_maker(),
            taker: self.dst.identity,
            amount: order.taking_amount(),
            safety_deposit: order.dst_safety_deposit(),
            ..expected_src
        };
        let derived = created.dst_immutables(self.dst.identity);
        ProtocolInvariantError::check(Side::Dst, &expected_dst, &derived)?;

        Ok(derived)
    }

    /// Creates the destination escrow and checks that the creation event
    /// carries the hashlock and taker of `immutables`.
    pub async fn deploy_dst(
        &self,
        immutables: Immutables,
        src_cancellation: Timestamp,
        deposit: DepositHandle,
        amount: U256,
        taker_traits: U256,
        token: U256,
    ) -> Result<DeployedEscrow, Error> {
        if amount != immutables.amount {
            return Err(ProtocolInvariantError {
                side: Side::Dst,
                reason: "amount",
                expected: Hash::from(immutables.amount),
                actual: Hash::from(amount),
            }
            .into());
        }
        if immutables.timelocks.start_of(Stage::DstCancellation) > src_cancellation {
            return Err(ValidationError::from(TimeLocksError::UnsafeOrdering {
                dst: Stage::DstCancellation,
                src: Stage::SrcCancellation,
            })
            .into());
        }

        let receipt = self
            .submit(Side::Dst, Call::DeployDst {
                immutables,
                token,
                src_cancellation,
                deposit,
                amount,
                taker_traits,
            })
            .await?;

        let event = chain::watch_for_event(
            self.dst.client.as_ref(),
            receipt.block,
            EventSelector::dst_escrow_created(),
            self.config.poll_interval,
            self.config.poll_attempts,
        )
        .await
        .map_err(|kind| ChainError::new(Side::Dst, kind))?;

        let created = self
            .dst
            .encoder
            .decode_dst_escrow_created(&event)
            .map_err(|source| {
                ChainError::new(Side::Dst, ChainErrorKind::MalformedEvent {
                    selector: event.selector,
                    source,
                })
            })?;
        if created.hashlock != immutables.hashlock {
            return Err(ProtocolInvariantError {
                side: Side::Dst,
                reason: "hashlock",
                expected: immutables.hashlock.into(),
                actual: created.hashlock.into(),
            }
            .into());
        }
        if created.taker != immutables.taker {
            return Err(ProtocolInvariantError {
                side: Side::Dst,
                reason: "taker",
                expected: Hash::from(immutables.taker),
                actual: Hash::from(created.taker),
            }
            .into());
        }

        Ok(DeployedEscrow {
            side: Side::Dst,
            handle: receipt
                .created
                .unwrap_or_else(|| EscrowHandle(Hash::from(created.escrow))),
            immutables,
        })
    }

    /// Withdraws `escrow` with `secret`.
    ///
    /// The escrow rules are checked against the chain's clock first, a call
    /// that would revert is not submitted.
    pub async fn withdraw(&self, escrow: &DeployedEscrow, secret: Secret) -> Result<TxRef, Error> {
        let chain = self.chain(escrow.side);
        let now = self.current_time(escrow.side).await?;

        Escrow::new(escrow.side, escrow.immutables)
            .withdraw(chain.identity, &secret, now)
            .map_err(|e| ChainError::rejected(escrow.side, e))?;

        let receipt = self
            .submit(escrow.side, Call::Withdraw {
                side: escrow.side,
                escrow: escrow.handle,
                secret,
                immutables: escrow.immutables,
            })
            .await?;

        tracing::info!("withdrew {} escrow {}", escrow.side, escrow.handle);

        Ok(receipt.tx)
    }

    pub async fn cancel(&self, escrow: &DeployedEscrow) -> Result<TxRef, Error> {
        let chain = self.chain(escrow.side);
        let now = self.current_time(escrow.side).await?;

        Escrow::new(escrow.side, escrow.immutables)
            .cancel(chain.identity, now)
            .map_err(|e| ChainError::rejected(escrow.side, e))?;

        let receipt = self
            .submit(escrow.side, Call::Cancel {
                side: escrow.side,
                escrow: escrow.handle,
                immutables: escrow.immutables,
            })
            .await?;

        tracing::info!("cancelled {} escrow {}", escrow.side, escrow.handle);

        Ok(receipt.tx)
    }

    /// Cancels whatever escrows a failed swap left behind, destination
    /// first so the resolver never loses the source funds it is owed.
    pub async fn cancel_swap(
        &self,
        src: Option<&DeployedEscrow>,
        dst: Option<&DeployedEscrow>,
    ) -> Result<Vec<SwapState>, Error> {
        let mut cancelled = Vec::new();

        for escrow in dst.into_iter().chain(src) {
            let stage = match escrow.side {
                Side::Src => Stage::SrcCancellation,
                Side::Dst => Stage::DstCancellation,
            };
            self.wait_for_stage(escrow, stage).await?;

            let tx = self
                .cancel(escrow)
                .instrument(tracing::info_span!("cancel", side = %escrow.side))
                .await?;
            cancelled.push(SwapState::Cancelled {
                side: escrow.side,
                tx,
            });
        }

        Ok(cancelled)
    }

    /// Polls the chain clock of `escrow` until `stage` has started.
    pub async fn wait_for_stage(
        &self,
        escrow: &DeployedEscrow,
        stage: Stage,
    ) -> Result<Timestamp, Error> {
        let start = escrow.immutables.timelocks.start_of(stage);

        loop {
            let now = self.current_time(escrow.side).await?;
            if now >= start {
                return Ok(now);
            }

            tracing::trace!("waiting for {} to start at {}, now {}", stage, start, now);
            sleep(self.config.poll_interval).await;
        }
    }

    async fn current_time(&self, side: Side) -> Result<Timestamp, ChainError> {
        self.chain(side)
            .client
            .current_time()
            .await
            .map_err(|e| ChainError::new(side, ChainErrorKind::classify(e)))
    }

    /// Submits `call`, resubmitting it on transient failures.
    ///
    /// A transaction that was not confirmed in time may still be included,
    /// so it is awaited again rather than submitted a second time.
    async fn submit(&self, side: Side, call: Call) -> Result<Receipt, ChainError> {
        let chain = self.chain(side);
        let payload = chain
            .encoder
            .encode(&call)
            .map_err(|e| ChainError::new(side, ChainErrorKind::classify(e)))?;

        let mut pending = None;
        let mut attempt = 0;
        loop {
            attempt += 1;

            let tx = match pending.take() {
                Some(tx) => Ok(tx),
                None => chain
                    .client
                    .submit_transaction(payload.clone())
                    .await
                    .map_err(ChainErrorKind::classify),
            };
            let result = match tx {
                Ok(tx) => {
                    tracing::debug!("awaiting {} as {}", call.name(), tx);
                    chain::confirm(chain.client.as_ref(), tx, self.config.confirmation_timeout)
                        .await
                        .map_err(|kind| (Some(tx), kind))
                }
                Err(kind) => Err((None, kind)),
            };

            match result {
                Ok(receipt) => return Ok(receipt),
                Err((tx, kind)) if kind.is_transient() && attempt <= self.config.retries => {
                    if let ChainErrorKind::ConfirmationTimeout(_) = kind {
                        pending = tx;
                    }
                    tracing::warn!(
                        "{} on {} chain failed on attempt {}: {:#}",
                        call.name(),
                        side,
                        attempt,
                        anyhow::Error::new(kind)
                    );
                    sleep(self.config.poll_interval).await;
                }
                Err((_, kind)) => return Err(ChainError::new(side, kind)),
            }
        }
    }
}

/// Runs a swap from filling the order to withdrawing the source escrow.
///
/// Every transition is yielded as it happens. The stream ends after the
/// first error, which carries enough context to decide on [`Resolver::cancel_swap`].
pub fn execute(
    resolver: Arc<Resolver>,
    order: CrossChainOrder,
    signature: Signature,
    secret_source: Arc<dyn SecretSource>,
) -> impl Stream<Item = Result<SwapState, Error>> {
    let span = tracing::info_span!("swap", order_hash = %resolver.order_hash(&order));

    Gen::new(|co| {
        async move {
            tracing::info!("starting swap");

            if let Err(e) = run(&resolver, &order, signature, secret_source.as_ref(), &co).await {
                tracing::error!("swap failed: {}", e);
                co.yield_(Err(e)).await;
            }
        }
        .instrument(span)
    })
}

async fn run(
    resolver: &Resolver,
    order: &CrossChainOrder,
    signature: Signature,
    secret_source: &dyn SecretSource,
    co: &Co<Result<SwapState, Error>>,
) -> Result<(), Error> {
    order
        .timelocks()
        .validate()
        .map_err(ValidationError::from)?;

    let order_hash = resolver.order_hash(order);
    co.yield_(Ok(SwapState::OrderSigned { order_hash })).await;

    co.yield_(Ok(SwapState::SrcDeploying)).await;
    let receipt = resolver
        .deploy_src(order, signature, order.making_amount())
        .instrument(tracing::info_span!("deploy_src"))
        .await?;
    let (src, created) = resolver
        .observe_src_deployment(receipt.block)
        .instrument(tracing::info_span!("observe_src"))
        .await?;

    tracing::info!("source escrow {} deployed", src.handle);
    co.yield_(Ok(SwapState::SrcDeployed(src))).await;

    let dst_immutables = resolver.derive_dst_immutables(order, &created)?;
    let (taker_traits, _) =
        TakerTraits::new(AmountMode::Taker, dst_immutables.amount, Extension::default())
            .encode()
            .map_err(ValidationError::from)?;

    co.yield_(Ok(SwapState::DstDeploying)).await;
    let dst = resolver
        .deploy_dst(
            dst_immutables,
            src.immutables.timelocks.start_of(Stage::SrcCancellation),
            DepositHandle::Attached(order.dst_safety_deposit()),
            dst_immutables.amount,
            taker_traits,
            created.complement.token,
        )
        .instrument(tracing::info_span!("deploy_dst"))
        .await?;

    tracing::info!("destination escrow {} deployed", dst.handle);
    co.yield_(Ok(SwapState::DstDeployed(dst))).await;

    let secret = secret_source
        .secret_for(order_hash, &src, &dst)
        .await
        .map_err(Error::SecretWithheld)?;
    if !order.hashlock().verify(&secret) {
        return Err(ProtocolInvariantError {
            side: Side::Dst,
            reason: "hashlock",
            expected: order.hashlock().into(),
            actual: secret.hashlock().into(),
        }
        .into());
    }

    tracing::info!("maker released the secret");
    co.yield_(Ok(SwapState::SecretReceived)).await;

    resolver.wait_for_stage(&dst, Stage::DstWithdrawal).await?;
    let dst_withdrawal = resolver
        .withdraw(&dst, secret)
        .instrument(tracing::info_span!("withdraw", side = %Side::Dst))
        .await?;
    co.yield_(Ok(SwapState::SecretRevealed { dst_withdrawal }))
        .await;

    resolver.wait_for_stage(&src, Stage::SrcWithdrawal).await?;
    let src_withdrawal = resolver
        .withdraw(&src, secret)
        .instrument(tracing::info_span!("withdraw", side = %Side::Src))
        .await?;
    co.yield_(Ok(SwapState::Withdrawn { src_withdrawal })).await;

    tracing::info!("swap completed");

    Ok(())
}

#[derive(Debug, thiserror::Error)]
#[error("interaction with the {side} chain failed")]
pub struct ChainError {
    pub side: Side,
    #[source]
    pub kind: ChainErrorKind,
}

impl ChainError {
    pub fn new(side: Side, kind: ChainErrorKind) -> Self {
        ChainError { side, kind }
    }

    fn rejected(side: Side, error: EscrowError) -> Self {
        ChainError::new(side, ChainErrorKind::Rejected(Revert::Escrow(error)))
    }
}

/// The escrows would not describe the swap the maker signed.
#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq, Eq)]
#[error("{reason} of the {side} escrow does not match, expected {expected} but got {actual}")]
pub struct ProtocolInvariantError {
    pub side: Side,
    pub reason: &'static str,
    pub expected: Hash,
    pub actual: Hash,
}

impl ProtocolInvariantError {
    fn check(side: Side, expected: &Immutables, actual: &Immutables) -> Result<(), Self> {
        if expected == actual {
            return Ok(());
        }

        let reason = if expected.order_hash != actual.order_hash {
            "order hash"
        } else if expected.hashlock != actual.hashlock {
            "hashlock"
        } else if expected.maker != actual.maker {
            "maker"
        } else if expected.taker != actual.taker {
            "taker"
        } else if expected.amount != actual.amount {
            "amount"
        } else if expected.safety_deposit != actual.safety_deposit {
            "safety deposit"
        } else {
            "timelocks"
        };

        Err(ProtocolInvariantError {
            side,
            reason,
            expected: expected.hash(),
            actual: actual.hash(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("order is invalid")]
    Validation(#[from] ValidationError),
    #[error("chain interaction failed")]
    Chain(#[from] ChainError),
    #[error("protocol invariant violated")]
    ProtocolInvariant(#[from] ProtocolInvariantError),
    #[error("maker did not release the secret")]
    SecretWithheld(#[source] anyhow::Error),
}

impl Error {
    /// Whether running the failed step again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Chain(e) => e.kind.is_transient(),
            Error::SecretWithheld(_) => true,
            Error::Validation(_) | Error::ProtocolInvariant(_) => false,
        }
    }

    /// The side whose escrow the error concerns, if any.
    pub fn side(&self) -> Option<Side> {
        match self {
            Error::Chain(e) => Some(e.side),
            Error::ProtocolInvariant(e) => Some(e.side),
            Error::Validation(_) | Error::SecretWithheld(_) => None,
        }
    }
}

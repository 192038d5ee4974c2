pub mod swap_helper;

use async_trait::async_trait;
use fusion::{
    chain::{
        BlockRef, ChainClient, ChainErrorKind, DepositHandle, EventData, EventSelector, Payload,
        Receipt, Revert, TxRef,
    },
    escrow::EscrowError,
    ethereum::U256,
    order::ValidationError,
    resolver::{ChainContext, ChainError, Config, Error, ProtocolInvariantError, Resolver},
    signer::{Signer, Wallet},
    simulation::{JsonCallEncoder, LedgerClient},
    sui::MoveCallEncoder,
    timelocks::Stage,
    Secret, Side, Timestamp,
};
use std::sync::Arc;
use swap_helper::*;

/// Reports only the first word of every event, as a node decoding against
/// the wrong event layout would.
struct TruncatingClient(LedgerClient);

#[async_trait]
impl ChainClient for TruncatingClient {
    async fn submit_transaction(&self, payload: Payload) -> anyhow::Result<TxRef> {
        self.0.submit_transaction(payload).await
    }

    async fn await_confirmation(&self, tx: TxRef) -> anyhow::Result<Receipt> {
        self.0.await_confirmation(tx).await
    }

    async fn read_event(
        &self,
        block: BlockRef,
        selector: EventSelector,
    ) -> anyhow::Result<Option<EventData>> {
        let event = self.0.read_event(block, selector).await?;

        Ok(event.map(|mut event| {
            event.data.truncate(32);
            event
        }))
    }

    async fn current_time(&self) -> anyhow::Result<Timestamp> {
        self.0.current_time().await
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_confirmation_times_out() {
    let world = World::new(Config {
        retries: 0,
        ..config()
    })
    .await;
    let (order, signature) = world.order(&Secret::random(), 1).await;
    world.src.stall_confirmations(true).await;

    let error = world
        .resolver
        .deploy_src(&order, signature, order.making_amount())
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        Error::Chain(ChainError {
            side: Side::Src,
            kind: ChainErrorKind::ConfirmationTimeout(_)
        })
    ));
    assert!(error.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn transient_submission_failures_are_retried() {
    let world = World::new(config()).await;
    let (order, signature) = world.order(&Secret::random(), 1).await;
    world.src.fail_next_submissions(2).await;

    let receipt = world
        .resolver
        .deploy_src(&order, signature, order.making_amount())
        .await
        .unwrap();

    assert!(receipt.created.is_some());
}

#[tokio::test(start_paused = true)]
async fn retries_are_bounded() {
    let world = World::new(config()).await;
    let (order, signature) = world.order(&Secret::random(), 1).await;
    world.src.fail_next_submissions(3).await;

    let error = world
        .resolver
        .deploy_src(&order, signature, order.making_amount())
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        Error::Chain(ChainError {
            kind: ChainErrorKind::Transport(_),
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn reorged_deployment_is_not_found() {
    let world = World::new(config()).await;
    let (order, signature) = world.order(&Secret::random(), 1).await;

    let receipt = world
        .resolver
        .deploy_src(&order, signature, order.making_amount())
        .await
        .unwrap();
    world.src.drop_latest_block().await;

    let error = world
        .resolver
        .observe_src_deployment(receipt.block)
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        Error::Chain(ChainError {
            side: Side::Src,
            kind: ChainErrorKind::EventNotFound(_)
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn order_signed_by_someone_else_is_rejected() {
    let world = World::new(config()).await;
    let (order, _) = world.order(&Secret::random(), 1).await;
    let forged = Wallet::random()
        .sign(&order.signing_message(&world.resolver.domain()))
        .unwrap();

    let error = world
        .resolver
        .deploy_src(&order, forged, order.making_amount())
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        Error::Chain(ChainError {
            kind: ChainErrorKind::Rejected(Revert::FillRejected(_)),
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn partial_fill_is_refused_before_submission() {
    let world = World::new(config()).await;
    let (order, signature) = world.order(&Secret::random(), 1).await;

    let error = world
        .resolver
        .deploy_src(&order, signature, U256::from(MAKING_AMOUNT / 2))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        Error::Validation(ValidationError::PartialFill { .. })
    ));
    assert_eq!(
        world
            .src
            .balance(world.src_token, world.maker.evm_address().to_u256())
            .await,
        U256::from(MAKING_AMOUNT)
    );
}

#[tokio::test(start_paused = true)]
async fn destination_escrow_is_created_at_most_once() {
    let world = World::new(config()).await;
    let (order, signature) = world.order(&Secret::random(), 1).await;

    let receipt = world
        .resolver
        .deploy_src(&order, signature, order.making_amount())
        .await
        .unwrap();
    let (src, created) = world
        .resolver
        .observe_src_deployment(receipt.block)
        .await
        .unwrap();
    let immutables = world
        .resolver
        .derive_dst_immutables(&order, &created)
        .unwrap();
    let src_cancellation = src.immutables.timelocks.start_of(Stage::SrcCancellation);
    let deposit = DepositHandle::Attached(immutables.safety_deposit);

    let dst = world
        .resolver
        .deploy_dst(
            immutables,
            src_cancellation,
            deposit,
            immutables.amount,
            U256::zero(),
            world.dst_token,
        )
        .await
        .unwrap();
    let error = world
        .resolver
        .deploy_dst(
            immutables,
            src_cancellation,
            deposit,
            immutables.amount,
            U256::zero(),
            world.dst_token,
        )
        .await
        .unwrap_err();

    match error {
        Error::Chain(ChainError {
            side: Side::Dst,
            kind: ChainErrorKind::Rejected(Revert::AlreadyDeployed(handle)),
        }) => assert_eq!(handle, dst.handle),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn tampered_complement_aborts_before_destination_deployment() {
    let world = World::new(config()).await;
    let (order, signature) = world.order(&Secret::random(), 1).await;

    let receipt = world
        .resolver
        .deploy_src(&order, signature, order.making_amount())
        .await
        .unwrap();
    let (_, mut created) = world
        .resolver
        .observe_src_deployment(receipt.block)
        .await
        .unwrap();
    created.complement.amount = U256::from(TAKING_AMOUNT - 1);

    let error = world
        .resolver
        .derive_dst_immutables(&order, &created)
        .unwrap_err();

    assert_eq!(error.side, Side::Dst);
    assert_eq!(error.reason, "amount");
    assert_ne!(error.expected, error.actual);
}

#[tokio::test(start_paused = true)]
async fn destination_deadline_after_source_cancellation_is_refused() {
    let world = World::new(config()).await;
    let (order, signature) = world.order(&Secret::random(), 1).await;

    let receipt = world
        .resolver
        .deploy_src(&order, signature, order.making_amount())
        .await
        .unwrap();
    let (src, created) = world
        .resolver
        .observe_src_deployment(receipt.block)
        .await
        .unwrap();
    let immutables = world
        .resolver
        .derive_dst_immutables(&order, &created)
        .unwrap();
    let too_early = src
        .immutables
        .timelocks
        .start_of(Stage::DstCancellation)
        .minus(1);

    let error = world
        .resolver
        .deploy_dst(
            immutables,
            too_early,
            DepositHandle::Attached(immutables.safety_deposit),
            immutables.amount,
            U256::zero(),
            world.dst_token,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        Error::Validation(ValidationError::UnsafeTimelockOrdering(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn withdrawal_with_wrong_secret_is_not_submitted() {
    let world = World::new(config()).await;
    let (order, signature) = world.order(&Secret::random(), 1).await;

    let receipt = world
        .resolver
        .deploy_src(&order, signature, order.making_amount())
        .await
        .unwrap();
    let (src, _) = world
        .resolver
        .observe_src_deployment(receipt.block)
        .await
        .unwrap();
    world
        .resolver
        .wait_for_stage(&src, Stage::SrcWithdrawal)
        .await
        .unwrap();

    let error = world
        .resolver
        .withdraw(&src, Secret::random())
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        Error::Chain(ChainError {
            kind: ChainErrorKind::Rejected(Revert::Escrow(EscrowError::HashMismatch)),
            ..
        })
    ));
    assert!(world.src.escrow(src.handle).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn stalled_confirmation_is_awaited_again_instead_of_resubmitting() {
    let world = World::new(config()).await;
    let (order, signature) = world.order(&Secret::random(), 1).await;
    world.src.stall_confirmations(true).await;

    let src = world.src.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(45)).await;
        src.stall_confirmations(false).await;
    });

    let receipt = world
        .resolver
        .deploy_src(&order, signature, order.making_amount())
        .await
        .unwrap();

    let escrow = world.src.escrow(receipt.created.unwrap()).await.unwrap();
    assert_eq!(escrow.immutables.amount, U256::from(MAKING_AMOUNT));
    assert_eq!(
        world
            .src
            .balance(world.src_token, world.maker.evm_address().to_u256())
            .await,
        U256::zero()
    );
}

#[tokio::test(start_paused = true)]
async fn undecodable_destination_event_is_a_chain_error() {
    let world = World::new(config()).await;
    let (order, signature) = world.order(&Secret::random(), 1).await;

    let receipt = world
        .resolver
        .deploy_src(&order, signature, order.making_amount())
        .await
        .unwrap();
    let (src, created) = world
        .resolver
        .observe_src_deployment(receipt.block)
        .await
        .unwrap();
    let immutables = world
        .resolver
        .derive_dst_immutables(&order, &created)
        .unwrap();

    let resolver = Resolver::new(
        ChainContext {
            client: Arc::new(world.src.client(world.resolver_on_src)),
            encoder: Arc::new(JsonCallEncoder),
            identity: world.resolver_on_src,
        },
        ChainContext {
            client: Arc::new(TruncatingClient(world.dst.client(world.resolver_on_dst))),
            encoder: Arc::new(MoveCallEncoder::new(dst_escrow_package())),
            identity: world.resolver_on_dst,
        },
        world.resolver.domain(),
        config(),
    );

    let error = resolver
        .deploy_dst(
            immutables,
            src.immutables.timelocks.start_of(Stage::SrcCancellation),
            DepositHandle::Attached(immutables.safety_deposit),
            immutables.amount,
            U256::zero(),
            world.dst_token,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        Error::Chain(ChainError {
            side: Side::Dst,
            kind: ChainErrorKind::MalformedEvent { .. }
        })
    ));
    assert!(!error.is_retryable());
}

#[test]
fn protocol_invariant_errors_name_both_hashes() {
    let error = ProtocolInvariantError {
        side: Side::Dst,
        reason: "hashlock",
        expected: fusion::ethereum::Hash::from([1u8; 32]),
        actual: fusion::ethereum::Hash::from([2u8; 32]),
    };

    let message = error.to_string();

    assert!(message.contains("dst"));
    assert!(message.contains("hashlock"));
    assert!(!Error::from(error).is_retryable());
}

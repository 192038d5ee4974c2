//! The capabilities the coordinator needs from a chain.
//!
//! Adapters implement [`ChainClient`] for submitting and observing
//! transactions and [`CallEncoder`] for turning typed calls into chain
//! specific payloads. Deterministic rejections are reported as [`Revert`]
//! inside the returned `anyhow::Error`, everything else is considered
//! transient.

use crate::{
    escrow::EscrowError,
    ethereum::{keccak256, Hash, U256},
    immutables::{DstEscrowCreated, Immutables, SrcEscrowCreated},
    order::CrossChainOrder,
    signer::Signature,
    Secret, Side, Timestamp,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use tokio::time::{sleep, timeout};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxRef(pub Hash);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef(pub Hash);

/// Identifies an escrow on its chain, a contract address on EVM chains and
/// an object id on Sui.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EscrowHandle(pub Hash);

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for EscrowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx: TxRef,
    pub block: BlockRef,
    pub block_time: Timestamp,
    /// The escrow created by the transaction, if the chain reports created
    /// objects.
    pub created: Option<EscrowHandle>,
}

/// Topic of an event, the keccak-256 hash of its signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventSelector(pub Hash);

impl EventSelector {
    pub fn src_escrow_created() -> Self {
        EventSelector(keccak256(
            b"SrcEscrowCreated((bytes32,bytes32,uint256,uint256,uint256,uint256,uint256),(uint256,uint256,uint256,uint256,uint256))",
        ))
    }

    pub fn dst_escrow_created() -> Self {
        EventSelector(keccak256(b"DstEscrowCreated(address,bytes32,uint256)"))
    }
}

impl fmt::Display for EventSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventData {
    pub selector: EventSelector,
    pub emitter: EscrowHandle,
    pub data: Vec<u8>,
}

/// How the destination safety deposit is provided.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositHandle {
    /// Native value attached to the transaction.
    Attached(U256),
    /// A coin object split off beforehand.
    Object(Hash),
}

/// A chain specific transaction body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub to: U256,
    pub value: U256,
    pub data: Vec<u8>,
}

/// The typed contract calls the coordinator makes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Call {
    DeploySrc {
        order: CrossChainOrder,
        signature: Signature,
        taker_traits: U256,
        args: Vec<u8>,
        amount: U256,
        safety_deposit: U256,
    },
    DeployDst {
        immutables: Immutables,
        token: U256,
        src_cancellation: Timestamp,
        deposit: DepositHandle,
        amount: U256,
        taker_traits: U256,
    },
    Withdraw {
        side: Side,
        escrow: EscrowHandle,
        secret: Secret,
        immutables: Immutables,
    },
    Cancel {
        side: Side,
        escrow: EscrowHandle,
        immutables: Immutables,
    },
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Call::DeploySrc { .. } => "deploy_src",
            Call::DeployDst { .. } => "deploy_dst",
            Call::Withdraw { .. } => "withdraw",
            Call::Cancel { .. } => "cancel",
        }
    }
}

pub trait CallEncoder: Send + Sync {
    fn encode(&self, call: &Call) -> anyhow::Result<Payload>;
    fn decode_src_escrow_created(&self, event: &EventData) -> anyhow::Result<SrcEscrowCreated>;
    fn decode_dst_escrow_created(&self, event: &EventData) -> anyhow::Result<DstEscrowCreated>;
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn submit_transaction(&self, payload: Payload) -> anyhow::Result<TxRef>;
    /// Resolves once the transaction is included, may never resolve if it is
    /// not.
    async fn await_confirmation(&self, tx: TxRef) -> anyhow::Result<Receipt>;
    async fn read_event(
        &self,
        block: BlockRef,
        selector: EventSelector,
    ) -> anyhow::Result<Option<EventData>>;
    async fn current_time(&self) -> anyhow::Result<Timestamp>;
}

/// A deterministic rejection by a contract. Retrying will fail the same way.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum Revert {
    #[error("fill rejected: {0}")]
    FillRejected(String),
    #[error("escrow {0} already exists")]
    AlreadyDeployed(EscrowHandle),
    #[error("escrow rejected the call")]
    Escrow(#[from] EscrowError),
    #[error("destination cancellation must not start after source cancellation")]
    InvalidCreationTime,
    #[error("immutables do not hash to the escrow's stored hash")]
    InvalidImmutables,
    #[error("unknown escrow {0}")]
    UnknownEscrow(EscrowHandle),
    #[error("insufficient balance")]
    InsufficientBalance,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainErrorKind {
    #[error("transaction rejected")]
    Rejected(#[source] Revert),
    #[error("transaction not confirmed within {0:?}")]
    ConfirmationTimeout(Duration),
    #[error("event {0} not found")]
    EventNotFound(EventSelector),
    #[error("event {selector} could not be decoded")]
    MalformedEvent {
        selector: EventSelector,
        #[source]
        source: anyhow::Error,
    },
    #[error("chain client failed")]
    Transport(#[source] anyhow::Error),
}

impl ChainErrorKind {
    /// Splits an adapter error into deterministic rejections and transient
    /// failures.
    pub fn classify(error: anyhow::Error) -> Self {
        match error.downcast::<Revert>() {
            Ok(revert) => ChainErrorKind::Rejected(revert),
            Err(error) => ChainErrorKind::Transport(error),
        }
    }

    /// An event that was found but does not decode will not decode on the
    /// next read either.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            ChainErrorKind::Rejected(_) | ChainErrorKind::MalformedEvent { .. }
        )
    }
}

/// Waits for inclusion of `tx`, giving up after `max_wait`.
pub async fn confirm<C>(client: &C, tx: TxRef, max_wait: Duration) -> Result<Receipt, ChainErrorKind>
where
    C: ChainClient + ?Sized,
{
    match timeout(max_wait, client.await_confirmation(tx)).await {
        Ok(Ok(receipt)) => Ok(receipt),
        Ok(Err(e)) => Err(ChainErrorKind::classify(e)),
        Err(_elapsed) => Err(ChainErrorKind::ConfirmationTimeout(max_wait)),
    }
}

/// Reads an event, polling a bounded number of times in case the node has not
/// indexed the block yet.
#[tracing::instrument(name = "watch_for_event", skip(client, poll_interval))]
pub async fn watch_for_event<C>(
    client: &C,
    block: BlockRef,
    selector: EventSelector,
    poll_interval: Duration,
    attempts: u32,
) -> Result<EventData, ChainErrorKind>
where
    C: ChainClient + ?Sized,
{
    for attempt in 1..=attempts.max(1) {
        match client.read_event(block, selector).await {
            Ok(Some(event)) => return Ok(event),
            Ok(None) => tracing::trace!("event not found on attempt {}", attempt),
            Err(e) => return Err(ChainErrorKind::classify(e)),
        }

        if attempt < attempts {
            sleep(poll_interval).await;
        }
    }

    Err(ChainErrorKind::EventNotFound(selector))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    #[derive(Clone, Default)]
    struct FakeClient {
        reads: Arc<AtomicU32>,
        found_after: u32,
        hang: bool,
    }

    #[async_trait]
    impl ChainClient for FakeClient {
        async fn submit_transaction(&self, _: Payload) -> anyhow::Result<TxRef> {
            Ok(TxRef(Hash::ZERO))
        }

        async fn await_confirmation(&self, tx: TxRef) -> anyhow::Result<Receipt> {
            if self.hang {
                futures::future::pending::<()>().await;
            }

            Err(anyhow::Error::new(Revert::FillRejected(format!("{}", tx))))
        }

        async fn read_event(
            &self,
            _: BlockRef,
            selector: EventSelector,
        ) -> anyhow::Result<Option<EventData>> {
            let reads = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            if reads < self.found_after {
                return Ok(None);
            }

            Ok(Some(EventData {
                selector,
                emitter: EscrowHandle(Hash::ZERO),
                data: vec![],
            }))
        }

        async fn current_time(&self) -> anyhow::Result<Timestamp> {
            Ok(Timestamp::from(0))
        }
    }

    #[tokio::test]
    async fn confirmation_is_bounded() {
        let client = FakeClient {
            hang: true,
            ..FakeClient::default()
        };

        let result = confirm(&client, TxRef(Hash::ZERO), Duration::from_millis(10)).await;

        assert!(matches!(
            result,
            Err(ChainErrorKind::ConfirmationTimeout(_))
        ));
    }

    #[tokio::test]
    async fn reverts_are_not_transient() {
        let client = FakeClient::default();

        let error = confirm(&client, TxRef(Hash::ZERO), Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            ChainErrorKind::Rejected(Revert::FillRejected(_))
        ));
        assert!(!error.is_transient());
    }

    #[tokio::test]
    async fn event_is_polled_until_found() {
        let client = FakeClient {
            found_after: 3,
            ..FakeClient::default()
        };

        let event = watch_for_event(
            &client,
            BlockRef(Hash::ZERO),
            EventSelector::src_escrow_created(),
            Duration::from_millis(1),
            5,
        )
        .await
        .unwrap();

        assert_eq!(event.selector, EventSelector::src_escrow_created());
        assert_eq!(client.reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_event_is_reported_after_bounded_polling() {
        let client = FakeClient {
            found_after: 10,
            ..FakeClient::default()
        };

        let error = watch_for_event(
            &client,
            BlockRef(Hash::ZERO),
            EventSelector::src_escrow_created(),
            Duration::from_millis(1),
            3,
        )
        .await
        .unwrap_err();

        assert!(matches!(error, ChainErrorKind::EventNotFound(_)));
        assert!(error.is_transient());
    }
}

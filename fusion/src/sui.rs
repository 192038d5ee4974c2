//! Calls into the Sui escrow package.
//!
//! Sui only serves as the destination chain. A [`MoveCallEncoder`] turns the
//! destination calls into a BCS encoded [`MoveCall`] whose immutables travel
//! in the `ImmutablesParams` layout of the package. Withdrawals and
//! cancellations only name the escrow object, the object holds its
//! immutables.

use crate::{
    chain::{
        Call, CallEncoder, DepositHandle, EscrowHandle, EventData, EventSelector, Payload, Revert,
    },
    ethereum::{word, Hash, U256},
    immutables::{DstEscrowCreated, Immutables, MoveU256, SrcEscrowCreated},
    Secret, Side, Timestamp,
};
use anyhow::Context;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

const RESOLVER_MODULE: &str = "resolver";
const ESCROW_DST_MODULE: &str = "escrow_dst";

/// A call of a public Move function with BCS encoded pure arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCall {
    pub package: [u8; 32],
    pub module: String,
    pub function: String,
    /// Addresses of the coin types the function is instantiated with.
    pub type_arguments: Vec<[u8; 32]>,
    pub arguments: Vec<Vec<u8>>,
}

impl MoveCall {
    fn argument<T: DeserializeOwned>(&self, index: usize) -> anyhow::Result<T> {
        let bytes = self.arguments.get(index).with_context(|| {
            format!("{}::{} lacks argument {}", self.module, self.function, index)
        })?;

        bcs::from_bytes(bytes)
            .with_context(|| format!("argument {} of {}::{}", index, self.module, self.function))
    }

    fn escrow(&self) -> anyhow::Result<EscrowHandle> {
        self.argument::<[u8; 32]>(0).map(|id| EscrowHandle(Hash::from(id)))
    }
}

/// The safety deposit is a coin, either split off the gas coin within the
/// call or prepared beforehand.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
enum Deposit {
    SplitFromGas(MoveU256),
    Coin([u8; 32]),
}

impl From<DepositHandle> for Deposit {
    fn from(handle: DepositHandle) -> Self {
        match handle {
            DepositHandle::Attached(value) => Deposit::SplitFromGas(value.into()),
            DepositHandle::Object(coin) => Deposit::Coin(coin.into()),
        }
    }
}

impl From<Deposit> for DepositHandle {
    fn from(deposit: Deposit) -> Self {
        match deposit {
            Deposit::SplitFromGas(value) => DepositHandle::Attached(value.into()),
            Deposit::Coin(coin) => DepositHandle::Object(Hash::from(coin)),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MoveCallEncoder {
    package: U256,
}

impl MoveCallEncoder {
    /// Encodes calls into the escrow package published at `package`.
    pub fn new(package: U256) -> Self {
        MoveCallEncoder { package }
    }

    fn call(
        &self,
        module: &str,
        function: &str,
        type_arguments: Vec<[u8; 32]>,
        arguments: Vec<Vec<u8>>,
    ) -> MoveCall {
        MoveCall {
            package: word(self.package),
            module: module.to_owned(),
            function: function.to_owned(),
            type_arguments,
            arguments,
        }
    }
}

impl CallEncoder for MoveCallEncoder {
    fn encode(&self, call: &Call) -> anyhow::Result<Payload> {
        let move_call = match call {
            Call::DeployDst {
                immutables,
                token,
                src_cancellation,
                deposit,
                amount,
                taker_traits,
            } => self.call(RESOLVER_MODULE, "deploy_dst", vec![word(*token)], vec![
                immutables.to_bcs()?,
                u256(U256::from(u32::from(*src_cancellation)))?,
                bcs::to_bytes(&Deposit::from(*deposit))?,
                u256(*amount)?,
                u256(*taker_traits)?,
            ]),
            Call::Withdraw {
                side: Side::Dst,
                escrow,
                secret,
                ..
            } => self.call(ESCROW_DST_MODULE, "withdraw", vec![], vec![
                object(*escrow)?,
                bcs::to_bytes(&secret.as_raw_secret().to_vec())?,
            ]),
            Call::Cancel {
                side: Side::Dst,
                escrow,
                ..
            } => self.call(ESCROW_DST_MODULE, "cancel", vec![], vec![object(*escrow)?]),
            other => anyhow::bail!("{} is not available on Sui", other.name()),
        };

        Ok(Payload {
            to: self.package,
            value: U256::zero(),
            data: bcs::to_bytes(&move_call)?,
        })
    }

    fn decode_src_escrow_created(&self, _: &EventData) -> anyhow::Result<SrcEscrowCreated> {
        anyhow::bail!("Sui escrows are only created on the destination side")
    }

    fn decode_dst_escrow_created(&self, event: &EventData) -> anyhow::Result<DstEscrowCreated> {
        if event.selector != EventSelector::dst_escrow_created() {
            anyhow::bail!("event {} is not a destination escrow creation", event.selector);
        }

        Ok(DstEscrowCreated::from_abi(&event.data)?)
    }
}

fn u256(value: U256) -> Result<Vec<u8>, bcs::Error> {
    bcs::to_bytes(&MoveU256::from(value))
}

fn object(escrow: EscrowHandle) -> Result<Vec<u8>, bcs::Error> {
    bcs::to_bytes(&<[u8; 32]>::from(escrow.0))
}

/// Recovers the call a [`MoveCallEncoder`] encoded.
///
/// `stored` looks up the immutables held by an escrow object, an unknown
/// object is reported as [`Revert::UnknownEscrow`].
pub fn decode_call(
    move_call: &MoveCall,
    stored: impl Fn(EscrowHandle) -> Option<Immutables>,
) -> anyhow::Result<Call> {
    let lookup = |escrow| stored(escrow).ok_or(Revert::UnknownEscrow(escrow));

    let call = match (move_call.module.as_str(), move_call.function.as_str()) {
        (RESOLVER_MODULE, "deploy_dst") => {
            let token = move_call
                .type_arguments
                .first()
                .context("deploy_dst lacks the coin type")?;
            let immutables = move_call
                .arguments
                .first()
                .context("deploy_dst lacks the immutables")?;
            let src_cancellation = U256::from(move_call.argument::<MoveU256>(1)?);
            if src_cancellation > U256::from(u32::MAX) {
                anyhow::bail!("source cancellation {} is out of range", src_cancellation);
            }

            Call::DeployDst {
                immutables: Immutables::from_bcs(immutables)?,
                token: U256::from_big_endian(token),
                src_cancellation: Timestamp::from(src_cancellation.low_u32()),
                deposit: move_call.argument::<Deposit>(2)?.into(),
                amount: move_call.argument::<MoveU256>(3)?.into(),
                taker_traits: move_call.argument::<MoveU256>(4)?.into(),
            }
        }
        (ESCROW_DST_MODULE, "withdraw") => {
            let escrow = move_call.escrow()?;
            let secret = Secret::from_vec(&move_call.argument::<Vec<u8>>(1)?)?;

            Call::Withdraw {
                side: Side::Dst,
                escrow,
                secret,
                immutables: lookup(escrow)?,
            }
        }
        (ESCROW_DST_MODULE, "cancel") => {
            let escrow = move_call.escrow()?;

            Call::Cancel {
                side: Side::Dst,
                escrow,
                immutables: lookup(escrow)?,
            }
        }
        (module, function) => anyhow::bail!("unknown function {}::{}", module, function),
    };

    Ok(call)
}

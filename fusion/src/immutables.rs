//! The fixed parameter set of one escrow.
//!
//! Both escrows of a swap are described by `Immutables` sharing the order
//! hash, the hashlock and the timelock baseline. Contracts recompute the hash
//! of the immutables they were deployed with and reject any call whose
//! arguments do not hash to the same value.

use crate::{
    ethereum::{keccak256, word, ChainId, Hash, U256},
    timelocks::TimeLocks,
    Hashlock,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Immutables {
    pub order_hash: Hash,
    pub hashlock: Hashlock,
    pub maker: U256,
    pub taker: U256,
    pub amount: U256,
    pub safety_deposit: U256,
    pub timelocks: TimeLocks,
}

impl Immutables {
    /// keccak-256 over the seven ABI words of the immutables.
    pub fn hash(&self) -> Hash {
        let mut encoded = Vec::with_capacity(7 * 32);
        encoded.extend_from_slice(self.order_hash.as_bytes());
        encoded.extend_from_slice(self.hashlock.as_bytes());
        encoded.extend_from_slice(&word(self.maker));
        encoded.extend_from_slice(&word(self.taker));
        encoded.extend_from_slice(&word(self.amount));
        encoded.extend_from_slice(&word(self.safety_deposit));
        encoded.extend_from_slice(&word(self.timelocks.pack()));

        keccak256(&encoded)
    }

    /// Destination immutables from the complement emitted on the source chain.
    ///
    /// Order hash, hashlock and timelocks including their baseline are kept.
    pub fn with_complement(self, complement: &DstImmutablesComplement) -> Self {
        Immutables {
            maker: complement.maker,
            amount: complement.amount,
            safety_deposit: complement.safety_deposit,
            ..self
        }
    }

    pub fn with_taker(self, taker: U256) -> Self {
        Immutables { taker, ..self }
    }

    pub fn with_deployed_at(self, deployed_at: crate::Timestamp) -> Self {
        Immutables {
            timelocks: self.timelocks.with_deployed_at(deployed_at),
            ..self
        }
    }

    /// Encodes the immutables in the `ImmutablesParams` layout of the Move
    /// escrow package.
    pub fn to_bcs(&self) -> Result<Vec<u8>, bcs::Error> {
        bcs::to_bytes(&ImmutablesParams::from(self))
    }

    pub fn from_bcs(bytes: &[u8]) -> Result<Self, DecodeError> {
        let params = bcs::from_bytes::<ImmutablesParams>(bytes)?;

        let order_hash = fixed_32(&params.order_hash, "order_hash")?;
        let hashlock = fixed_32(&params.hash_lock, "hash_lock")?;

        Ok(Immutables {
            order_hash: Hash::from(order_hash),
            hashlock: Hashlock::from(hashlock),
            maker: params.maker.into(),
            taker: params.taker.into(),
            amount: params.amount.into(),
            safety_deposit: params.safety_deposit.into(),
            timelocks: TimeLocks::unpack(params.timelocks.into()),
        })
    }
}

fn fixed_32(bytes: &[u8], field: &'static str) -> Result<[u8; 32], DecodeError> {
    if bytes.len() != 32 {
        return Err(DecodeError::InvalidLength {
            field,
            got: bytes.len(),
        });
    }
    let mut fixed = [0u8; 32];
    fixed.copy_from_slice(bytes);

    Ok(fixed)
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to decode immutables")]
    Bcs(#[from] bcs::Error),
    #[error("{field} has an invalid length of {got} bytes")]
    InvalidLength { field: &'static str, got: usize },
}

/// Move `u256`, 32 bytes little endian.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub(crate) struct MoveU256([u8; 32]);

impl From<U256> for MoveU256 {
    fn from(value: U256) -> Self {
        let mut bytes = [0u8; 32];
        value.to_little_endian(&mut bytes);
        MoveU256(bytes)
    }
}

impl From<MoveU256> for U256 {
    fn from(value: MoveU256) -> Self {
        U256::from_little_endian(&value.0)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ImmutablesParams {
    order_hash: Vec<u8>,
    hash_lock: Vec<u8>,
    safety_deposit: MoveU256,
    maker: MoveU256,
    taker: MoveU256,
    amount: MoveU256,
    timelocks: MoveU256,
}

impl From<&Immutables> for ImmutablesParams {
    fn from(immutables: &Immutables) -> Self {
        ImmutablesParams {
            order_hash: immutables.order_hash.as_bytes().to_vec(),
            hash_lock: immutables.hashlock.as_bytes().to_vec(),
            safety_deposit: immutables.safety_deposit.into(),
            maker: immutables.maker.into(),
            taker: immutables.taker.into(),
            amount: immutables.amount.into(),
            timelocks: immutables.timelocks.pack().into(),
        }
    }
}

/// The destination specific values the source escrow factory emits next to
/// the source immutables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DstImmutablesComplement {
    pub maker: U256,
    pub amount: U256,
    pub token: U256,
    pub safety_deposit: U256,
    pub chain_id: ChainId,
}

/// Payload of the event emitted when a source escrow is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrcEscrowCreated {
    pub immutables: Immutables,
    pub complement: DstImmutablesComplement,
}

impl SrcEscrowCreated {
    /// Immutables the destination escrow must be deployed with.
    pub fn dst_immutables(&self, taker: U256) -> Immutables {
        self.immutables
            .with_complement(&self.complement)
            .with_taker(taker)
    }
}

/// Payload of the event emitted when a destination escrow is created, the
/// three ABI words `(address escrow, bytes32 hashlock, uint256 taker)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DstEscrowCreated {
    pub escrow: U256,
    pub hashlock: Hashlock,
    pub taker: U256,
}

impl DstEscrowCreated {
    pub const LENGTH: usize = 3 * 32;

    pub fn to_abi(&self) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(Self::LENGTH);
        encoded.extend_from_slice(&word(self.escrow));
        encoded.extend_from_slice(self.hashlock.as_bytes());
        encoded.extend_from_slice(&word(self.taker));

        encoded
    }

    pub fn from_abi(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() != Self::LENGTH {
            return Err(DecodeError::InvalidLength {
                field: "DstEscrowCreated",
                got: data.len(),
            });
        }

        Ok(DstEscrowCreated {
            escrow: U256::from_big_endian(&data[..32]),
            hashlock: Hashlock::from(fixed_32(&data[32..64], "hashlock")?),
            taker: U256::from_big_endian(&data[64..]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{proptest::*, Secret, Timestamp};
    use std::str::FromStr;

    fn immutables() -> Immutables {
        Immutables {
            order_hash: Hash::from_str(
                "0x3ae3b6ffb04204f52dee42000e8b971c0f7c2b4aa8dd9455e41a30ee4b31e8a9",
            )
            .unwrap(),
            hashlock: Secret::from([7u8; 32]).hashlock(),
            maker: U256::from(0xaaaau64),
            taker: U256::from(0xbbbbu64),
            amount: U256::from(100_000_000u64),
            safety_deposit: U256::from(1_000_000_000_000_000u64),
            timelocks: TimeLocks {
                deployed_at: Timestamp::from(1_700_000_000),
                src_withdrawal: 10u32.into(),
                src_public_withdrawal: 120u32.into(),
                src_cancellation: 121u32.into(),
                src_public_cancellation: 122u32.into(),
                dst_withdrawal: 10u32.into(),
                dst_public_withdrawal: 100u32.into(),
                dst_cancellation: 101u32.into(),
            },
        }
    }

    #[test]
    fn hash_covers_every_field() {
        let original = immutables();

        assert_ne!(original.hash(), original.with_taker(U256::from(1)).hash());
        assert_ne!(
            original.hash(),
            original
                .with_deployed_at(Timestamp::from(1_700_000_001))
                .hash()
        );
    }

    #[test]
    fn bcs_layout_matches_move_struct() {
        let bytes = immutables().to_bcs().unwrap();

        // two length prefixed byte vectors followed by five u256
        assert_eq!(bytes.len(), 1 + 32 + 1 + 32 + 5 * 32);
        assert_eq!(bytes[0], 32);
        assert_eq!(bytes[33], 32);
        // safety deposit comes first and is little endian
        assert_eq!(
            &bytes[66..74],
            &1_000_000_000_000_000u64.to_le_bytes()[..]
        );
    }

    #[test]
    fn rejects_truncated_order_hash() {
        let mut bytes = immutables().to_bcs().unwrap();
        bytes[0] = 31;
        bytes.remove(1);

        let result = Immutables::from_bcs(&bytes);

        assert!(matches!(
            result,
            Err(DecodeError::InvalidLength {
                field: "order_hash",
                got: 31
            })
        ));
    }

    #[test]
    fn derived_dst_immutables_keep_the_swap_identity() {
        let src = immutables();
        let event = SrcEscrowCreated {
            immutables: src,
            complement: DstImmutablesComplement {
                maker: U256::from(0xccccu64),
                amount: U256::from(99_000_000u64),
                token: U256::from(0xddddu64),
                safety_deposit: U256::from(1_000_000u64),
                chain_id: ChainId::from(101u64),
            },
        };

        let dst = event.dst_immutables(U256::from(0xeeeeu64));

        assert_eq!(dst.order_hash, src.order_hash);
        assert_eq!(dst.hashlock, src.hashlock);
        assert_eq!(dst.timelocks, src.timelocks);
        assert_eq!(dst.maker, U256::from(0xccccu64));
        assert_eq!(dst.taker, U256::from(0xeeeeu64));
        assert_eq!(dst.amount, U256::from(99_000_000u64));
    }

    #[test]
    fn dst_escrow_created_is_three_abi_words() {
        let event = DstEscrowCreated {
            escrow: U256::from(0x1234u64),
            hashlock: Secret::from([7u8; 32]).hashlock(),
            taker: U256::from(0xbbbbu64),
        };

        let data = event.to_abi();

        assert_eq!(data.len(), 96);
        assert_eq!(&data[30..32], &[0x12, 0x34]);
        assert_eq!(&data[32..64], event.hashlock.as_bytes());
        assert_eq!(DstEscrowCreated::from_abi(&data).unwrap(), event);
    }

    #[test]
    fn dst_escrow_created_rejects_a_bare_hash() {
        let result = DstEscrowCreated::from_abi(&[0u8; 32]);

        assert!(matches!(
            result,
            Err(DecodeError::InvalidLength {
                field: "DstEscrowCreated",
                got: 32
            })
        ));
    }

    proptest! {
        #[test]
        fn bcs_decoding_reverses_encoding(
            timelocks in timelocks::unchecked(),
            secret in secret::secret(),
            maker in address::u256(),
            taker in address::u256(),
            amount in address::u256(),
        ) {
            let immutables = Immutables {
                hashlock: secret.hashlock(),
                maker,
                taker,
                amount,
                timelocks,
                ..immutables()
            };

            let bytes = immutables.to_bcs().unwrap();

            prop_assert_eq!(Immutables::from_bcs(&bytes).unwrap(), immutables);
        }
    }
}

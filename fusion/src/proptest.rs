pub use ::proptest::prelude::*;

pub mod timelocks {
    use super::*;
    use crate::timelocks::{Stage, TimeLocks};

    pub fn stage() -> impl Strategy<Value = Stage> {
        prop_oneof![
            Just(Stage::SrcWithdrawal),
            Just(Stage::SrcPublicWithdrawal),
            Just(Stage::SrcCancellation),
            Just(Stage::SrcPublicCancellation),
            Just(Stage::DstWithdrawal),
            Just(Stage::DstPublicWithdrawal),
            Just(Stage::DstCancellation),
        ]
    }

    prop_compose! {
        pub fn unchecked()(
            deployed_at in any::<u32>(),
            deltas in prop::array::uniform7(any::<u32>()),
        ) -> TimeLocks {
            TimeLocks {
                deployed_at: deployed_at.into(),
                src_withdrawal: deltas[0].into(),
                src_public_withdrawal: deltas[1].into(),
                src_cancellation: deltas[2].into(),
                src_public_cancellation: deltas[3].into(),
                dst_withdrawal: deltas[4].into(),
                dst_public_withdrawal: deltas[5].into(),
                dst_cancellation: deltas[6].into(),
            }
        }
    }

    prop_compose! {
        /// Stages that follow each other on both sides with the destination
        /// settling strictly before the source can be cancelled.
        pub fn safe()(
            deployed_at in 1u32..2_000_000_000,
            dst_withdrawal in 0u32..1_000,
            dst_private in 0u32..1_000,
            dst_public in 0u32..1_000,
            src_withdrawal_lead in 0u32..1_000,
            src_public_lead in 0u32..1_000,
            src_cancellation_lead in 1u32..1_000,
            src_public_cancellation in 0u32..1_000,
        ) -> TimeLocks {
            let dst_public_withdrawal = dst_withdrawal + dst_private;
            let dst_cancellation = dst_public_withdrawal + dst_public;
            let src_withdrawal = dst_withdrawal.saturating_sub(src_withdrawal_lead);
            let src_public_withdrawal = dst_public_withdrawal + src_public_lead;
            let src_cancellation = src_public_withdrawal.max(dst_cancellation) + src_cancellation_lead;

            TimeLocks {
                deployed_at: deployed_at.into(),
                src_withdrawal: src_withdrawal.into(),
                src_public_withdrawal: src_public_withdrawal.into(),
                src_cancellation: src_cancellation.into(),
                src_public_cancellation: (src_cancellation + src_public_cancellation).into(),
                dst_withdrawal: dst_withdrawal.into(),
                dst_public_withdrawal: dst_public_withdrawal.into(),
                dst_cancellation: dst_cancellation.into(),
            }
        }
    }
}

pub mod secret {
    use super::*;
    use crate::Secret;

    prop_compose! {
        pub fn secret()(
            bytes in any::<[u8; 32]>(),
        ) -> Secret {
            Secret::from(bytes)
        }
    }
}

pub mod address {
    use super::*;
    use crate::{address::EvmAddress, ethereum::U256};

    prop_compose! {
        pub fn evm()(
            bytes in any::<[u8; 20]>(),
        ) -> EvmAddress {
            EvmAddress::from(bytes)
        }
    }

    prop_compose! {
        pub fn u256()(
            bytes in any::<[u8; 32]>(),
        ) -> U256 {
            U256::from_big_endian(&bytes)
        }
    }
}

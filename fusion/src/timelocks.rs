//! Relative deadlines of both escrows of a swap.
//!
//! All seven stage deltas and the deployment baseline are packed into one
//! `U256`. Stage `i` occupies bits `[32 * i, 32 * i + 32)` and the baseline
//! occupies the top 32 bits.

use crate::{
    ethereum::U256,
    timestamp::{RelativeTime, Timestamp},
    Side,
};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

const DEPLOYED_AT_OFFSET: usize = 224;
const STAGE_WIDTH: usize = 32;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::EnumIter, strum_macros::Display,
)]
pub enum Stage {
    SrcWithdrawal = 0,
    SrcPublicWithdrawal = 1,
    SrcCancellation = 2,
    SrcPublicCancellation = 3,
    DstWithdrawal = 4,
    DstPublicWithdrawal = 5,
    DstCancellation = 6,
}

impl Stage {
    pub fn side(self) -> Side {
        match self {
            Stage::SrcWithdrawal
            | Stage::SrcPublicWithdrawal
            | Stage::SrcCancellation
            | Stage::SrcPublicCancellation => Side::Src,
            Stage::DstWithdrawal | Stage::DstPublicWithdrawal | Stage::DstCancellation => {
                Side::Dst
            }
        }
    }

    pub fn is_public(self) -> bool {
        matches!(
            self,
            Stage::SrcPublicWithdrawal | Stage::SrcPublicCancellation | Stage::DstPublicWithdrawal
        )
    }

    pub fn is_withdrawal(self) -> bool {
        matches!(
            self,
            Stage::SrcWithdrawal
                | Stage::SrcPublicWithdrawal
                | Stage::DstWithdrawal
                | Stage::DstPublicWithdrawal
        )
    }

    pub fn is_cancellation(self) -> bool {
        !self.is_withdrawal()
    }

    /// The public stage that ends this private stage, if any.
    ///
    /// Public stages never end. The destination has no public cancellation so
    /// its cancellation stage never ends either.
    pub fn closed_by(self) -> Option<Stage> {
        match self {
            Stage::SrcWithdrawal => Some(Stage::SrcPublicWithdrawal),
            Stage::SrcCancellation => Some(Stage::SrcPublicCancellation),
            Stage::DstWithdrawal => Some(Stage::DstPublicWithdrawal),
            Stage::SrcPublicWithdrawal
            | Stage::SrcPublicCancellation
            | Stage::DstPublicWithdrawal
            | Stage::DstCancellation => None,
        }
    }

    /// All stages of one side in chronological order.
    pub fn of(side: Side) -> impl Iterator<Item = Stage> {
        Stage::iter().filter(move |stage| stage.side() == side)
    }

    fn offset(self) -> usize {
        self as usize * STAGE_WIDTH
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeLocks {
    pub deployed_at: Timestamp,
    pub src_withdrawal: RelativeTime,
    pub src_public_withdrawal: RelativeTime,
    pub src_cancellation: RelativeTime,
    pub src_public_cancellation: RelativeTime,
    pub dst_withdrawal: RelativeTime,
    pub dst_public_withdrawal: RelativeTime,
    pub dst_cancellation: RelativeTime,
}

impl TimeLocks {
    pub fn pack(&self) -> U256 {
        let deployed_at = U256::from(u32::from(self.deployed_at)) << DEPLOYED_AT_OFFSET;

        Stage::iter().fold(deployed_at, |packed, stage| {
            packed | (U256::from(u32::from(self.delta(stage))) << stage.offset())
        })
    }

    pub fn unpack(packed: U256) -> Self {
        let field = |offset: usize| (packed >> offset).low_u32();

        TimeLocks {
            deployed_at: Timestamp::from(field(DEPLOYED_AT_OFFSET)),
            src_withdrawal: field(Stage::SrcWithdrawal.offset()).into(),
            src_public_withdrawal: field(Stage::SrcPublicWithdrawal.offset()).into(),
            src_cancellation: field(Stage::SrcCancellation.offset()).into(),
            src_public_cancellation: field(Stage::SrcPublicCancellation.offset()).into(),
            dst_withdrawal: field(Stage::DstWithdrawal.offset()).into(),
            dst_public_withdrawal: field(Stage::DstPublicWithdrawal.offset()).into(),
            dst_cancellation: field(Stage::DstCancellation.offset()).into(),
        }
    }

    pub fn with_deployed_at(self, deployed_at: Timestamp) -> Self {
        TimeLocks {
            deployed_at,
            ..self
        }
    }

    pub fn delta(&self, stage: Stage) -> RelativeTime {
        match stage {
            Stage::SrcWithdrawal => self.src_withdrawal,
            Stage::SrcPublicWithdrawal => self.src_public_withdrawal,
            Stage::SrcCancellation => self.src_cancellation,
            Stage::SrcPublicCancellation => self.src_public_cancellation,
            Stage::DstWithdrawal => self.dst_withdrawal,
            Stage::DstPublicWithdrawal => self.dst_public_withdrawal,
            Stage::DstCancellation => self.dst_cancellation,
        }
    }

    pub fn start_of(&self, stage: Stage) -> Timestamp {
        self.deployed_at.add_relative(self.delta(stage))
    }

    /// Whether `stage` is open at `now`.
    ///
    /// Lower bounds are inclusive, so at a boundary the later stage is active.
    pub fn is_active(&self, stage: Stage, now: Timestamp) -> bool {
        if now < self.start_of(stage) {
            return false;
        }

        match stage.closed_by() {
            Some(next) => now < self.start_of(next),
            None => true,
        }
    }

    /// The most recent stage of `side` that has started, `None` while the
    /// escrow is merely deployed.
    pub fn current_stage(&self, side: Side, now: Timestamp) -> Option<Stage> {
        Stage::of(side)
            .filter(|stage| self.start_of(*stage) <= now)
            .last()
    }

    /// Checks that the stages of each side follow each other and that the
    /// destination settles before the source can be cancelled.
    pub fn validate(&self) -> Result<(), TimeLocksError> {
        for side in &[Side::Src, Side::Dst] {
            let stages = Stage::of(*side).collect::<Vec<_>>();
            for pair in stages.windows(2) {
                let (earlier, later) = (pair[0], pair[1]);
                if self.delta(later) < self.delta(earlier) {
                    return Err(TimeLocksError::NonMonotonic { earlier, later });
                }
            }
        }

        if self.dst_public_withdrawal > self.src_public_withdrawal {
            return Err(TimeLocksError::UnsafeOrdering {
                dst: Stage::DstPublicWithdrawal,
                src: Stage::SrcPublicWithdrawal,
            });
        }

        if self.dst_cancellation >= self.src_cancellation {
            return Err(TimeLocksError::UnsafeOrdering {
                dst: Stage::DstCancellation,
                src: Stage::SrcCancellation,
            });
        }

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq, Eq)]
pub enum TimeLocksError {
    #[error("{later} starts before {earlier}")]
    NonMonotonic { earlier: Stage, later: Stage },
    #[error("{dst} must start before {src}")]
    UnsafeOrdering { dst: Stage, src: Stage },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proptest::timelocks as strategy;
    use proptest::prelude::*;

    const T0: u32 = 1_700_000_000;

    fn demo_timelocks() -> TimeLocks {
        TimeLocks {
            deployed_at: Timestamp::from(T0),
            src_withdrawal: 10u32.into(),
            src_public_withdrawal: 120u32.into(),
            src_cancellation: 121u32.into(),
            src_public_cancellation: 122u32.into(),
            dst_withdrawal: 10u32.into(),
            dst_public_withdrawal: 100u32.into(),
            dst_cancellation: 101u32.into(),
        }
    }

    fn at(offset: u32) -> Timestamp {
        Timestamp::from(T0 + offset)
    }

    #[test]
    fn nothing_is_withdrawable_before_the_first_stage() {
        let timelocks = demo_timelocks();

        assert!(!timelocks.is_active(Stage::SrcWithdrawal, at(5)));
        assert!(!timelocks.is_active(Stage::DstWithdrawal, at(5)));
        assert_eq!(timelocks.current_stage(Side::Src, at(5)), None);
    }

    #[test]
    fn both_sides_are_withdrawable_after_ten_seconds() {
        let timelocks = demo_timelocks();

        assert!(timelocks.is_active(Stage::SrcWithdrawal, at(15)));
        assert!(timelocks.is_active(Stage::DstWithdrawal, at(15)));
    }

    #[test]
    fn destination_is_cancellable_before_source() {
        let timelocks = demo_timelocks();

        assert!(timelocks.is_active(Stage::DstCancellation, at(105)));
        assert!(!timelocks.is_active(Stage::SrcCancellation, at(105)));
        assert_eq!(
            timelocks.current_stage(Side::Src, at(105)),
            Some(Stage::SrcWithdrawal)
        );
    }

    #[test]
    fn later_stage_wins_at_the_boundary() {
        let timelocks = demo_timelocks();

        assert!(!timelocks.is_active(Stage::DstWithdrawal, at(100)));
        assert!(timelocks.is_active(Stage::DstPublicWithdrawal, at(100)));
        assert_eq!(
            timelocks.current_stage(Side::Dst, at(100)),
            Some(Stage::DstPublicWithdrawal)
        );
    }

    #[test]
    fn public_stages_never_close() {
        let timelocks = demo_timelocks();

        assert!(timelocks.is_active(Stage::SrcPublicCancellation, at(u32::MAX - T0)));
        assert!(timelocks.is_active(Stage::DstCancellation, at(u32::MAX - T0)));
    }

    #[test]
    fn packs_baseline_into_the_top_bits() {
        let packed = demo_timelocks().pack();

        assert_eq!((packed >> 224).low_u32(), T0);
        assert_eq!(packed.low_u32(), 10);
        assert_eq!((packed >> 192).low_u32(), 101);
    }

    #[test]
    fn demo_timelocks_are_safe() {
        assert_eq!(demo_timelocks().validate(), Ok(()));
    }

    #[test]
    fn rejects_destination_cancelling_after_source() {
        let timelocks = TimeLocks {
            dst_cancellation: 130u32.into(),
            ..demo_timelocks()
        };

        assert_eq!(
            timelocks.validate(),
            Err(TimeLocksError::UnsafeOrdering {
                dst: Stage::DstCancellation,
                src: Stage::SrcCancellation,
            })
        );
    }

    #[test]
    fn rejects_destination_public_withdrawal_after_source() {
        let timelocks = TimeLocks {
            dst_public_withdrawal: 121u32.into(),
            dst_cancellation: 125u32.into(),
            ..demo_timelocks()
        };

        assert_eq!(
            timelocks.validate(),
            Err(TimeLocksError::UnsafeOrdering {
                dst: Stage::DstPublicWithdrawal,
                src: Stage::SrcPublicWithdrawal,
            })
        );
    }

    #[test]
    fn rejects_private_window_closing_before_it_opens() {
        let timelocks = TimeLocks {
            src_withdrawal: 200u32.into(),
            ..demo_timelocks()
        };

        assert_eq!(
            timelocks.validate(),
            Err(TimeLocksError::NonMonotonic {
                earlier: Stage::SrcWithdrawal,
                later: Stage::SrcPublicWithdrawal,
            })
        );
    }

    proptest! {
        #[test]
        fn unpack_reverses_pack(timelocks in strategy::unchecked()) {
            prop_assert_eq!(TimeLocks::unpack(timelocks.pack()), timelocks);
        }
    }

    proptest! {
        #[test]
        fn stage_is_inactive_outside_its_window(timelocks in strategy::safe(), stage in strategy::stage()) {
            let start = timelocks.start_of(stage);

            prop_assert!(!timelocks.is_active(stage, start.minus(1)));

            if let Some(next) = stage.closed_by() {
                prop_assert!(!timelocks.is_active(stage, timelocks.start_of(next)));
            }
        }
    }

    proptest! {
        #[test]
        fn safe_timelocks_validate(timelocks in strategy::safe()) {
            prop_assert_eq!(timelocks.validate(), Ok(()));
        }
    }
}

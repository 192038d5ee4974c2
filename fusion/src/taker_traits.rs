use crate::{ethereum::U256, order::Extension};
use serde::{Deserialize, Serialize};

const MAKER_AMOUNT_FLAG: usize = 255;
const EXTENSION_LENGTH_OFFSET: usize = 224;
const EXTENSION_LENGTH_MAX: usize = (1 << 24) - 1;
const THRESHOLD_BITS: usize = 185;

/// How the fill amount passed next to the taker traits is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum AmountMode {
    /// The amount is a making amount and the threshold caps the taking amount.
    Maker,
    /// The amount is a taking amount and the threshold floors the making amount.
    Taker,
}

/// Fill instructions of the resolver, sent alongside the maker's order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TakerTraits {
    pub amount_mode: AmountMode,
    pub threshold: U256,
    pub extension: Extension,
}

impl TakerTraits {
    pub fn new(amount_mode: AmountMode, threshold: U256, extension: Extension) -> Self {
        TakerTraits {
            amount_mode,
            threshold,
            extension,
        }
    }

    /// The packed trait word and the args bytes carrying the extension.
    pub fn encode(&self) -> Result<(U256, Vec<u8>), EncodeError> {
        if self.threshold.bits() > THRESHOLD_BITS {
            return Err(EncodeError::ThresholdTooWide);
        }

        let args = self.extension.encode();
        if args.len() > EXTENSION_LENGTH_MAX {
            return Err(EncodeError::ExtensionTooLong(args.len()));
        }

        let mut traits = self.threshold | U256::from(args.len()) << EXTENSION_LENGTH_OFFSET;
        if self.amount_mode == AmountMode::Maker {
            traits = traits | U256::one() << MAKER_AMOUNT_FLAG;
        }

        Ok((traits, args))
    }

    /// Reads the amount mode, threshold and extension length back from a
    /// packed trait word.
    pub fn decode(traits: U256) -> (AmountMode, U256, usize) {
        let amount_mode = if traits.bit(MAKER_AMOUNT_FLAG) {
            AmountMode::Maker
        } else {
            AmountMode::Taker
        };
        let threshold = traits & ((U256::one() << THRESHOLD_BITS) - 1);
        let extension_length = (traits >> EXTENSION_LENGTH_OFFSET).low_u32() & 0x00ff_ffff;

        (amount_mode, threshold, extension_length as usize)
    }
}

#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("amount threshold does not fit into 185 bits")]
    ThresholdTooWide,
    #[error("extension of {0} bytes does not fit into the length field")]
    ExtensionTooLong(usize),
}

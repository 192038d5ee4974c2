//! Chain specific account and contract addresses.
//!
//! Every address is carried through the protocol as a 256-bit integer so that
//! EVM and Sui accounts can sit in the same immutables slot. EVM addresses
//! occupy the low 160 bits, Sui addresses use the full width.

use crate::ethereum::{keccak256, word, U256};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum AddressKind {
    #[strum(serialize = "evm")]
    Evm,
    #[strum(serialize = "sui")]
    Sui,
}

impl<'de> Deserialize<'de> for AddressKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let kind = String::deserialize(deserializer)?;
        match kind.as_str() {
            "evm" => Ok(AddressKind::Evm),
            "sui" => Ok(AddressKind::Sui),
            other => Err(de::Error::unknown_variant(other, &["evm", "sui"])),
        }
    }
}

impl Serialize for AddressKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EvmAddress([u8; 20]);

impl EvmAddress {
    pub const ZERO: EvmAddress = EvmAddress([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        EvmAddress(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_u256(self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// Lower case hex without the `0x` prefix.
    fn to_lower_hex(self) -> String {
        hex::encode(self.0)
    }

    fn to_checksummed(self) -> String {
        let lower = self.to_lower_hex();
        let digest = keccak256(lower.as_bytes());
        let digest = digest.as_bytes();

        let mut checksummed = String::with_capacity(42);
        checksummed.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = if i % 2 == 0 {
                digest[i / 2] >> 4
            } else {
                digest[i / 2] & 0x0f
            };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                checksummed.push(c.to_ascii_uppercase());
            } else {
                checksummed.push(c);
            }
        }

        checksummed
    }
}

impl From<[u8; 20]> for EvmAddress {
    fn from(bytes: [u8; 20]) -> Self {
        EvmAddress(bytes)
    }
}

impl From<EvmAddress> for [u8; 20] {
    fn from(address: EvmAddress) -> Self {
        address.0
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksummed())
    }
}

impl FromStr for EvmAddress {
    type Err = InvalidAddressFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match NativeAddress::parse(AddressKind::Evm, s)? {
            NativeAddress::Evm(address) => Ok(address),
            NativeAddress::Sui(_) => unreachable!("parsed with evm kind"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SuiAddress([u8; 32]);

impl SuiAddress {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_u256(self) -> U256 {
        U256::from_big_endian(&self.0)
    }
}

impl From<[u8; 32]> for SuiAddress {
    fn from(bytes: [u8; 32]) -> Self {
        SuiAddress(bytes)
    }
}

impl fmt::Display for SuiAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// An address in the native textual form of its chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NativeAddress {
    Evm(EvmAddress),
    Sui(SuiAddress),
}

impl NativeAddress {
    pub fn kind(&self) -> AddressKind {
        match self {
            NativeAddress::Evm(_) => AddressKind::Evm,
            NativeAddress::Sui(_) => AddressKind::Sui,
        }
    }

    /// Parses the textual form of an address.
    ///
    /// EVM addresses must be exactly 40 hex digits. Mixed case input is
    /// treated as EIP-55 checksummed and rejected if the checksum is wrong.
    /// Sui addresses may omit leading zeros.
    pub fn parse(kind: AddressKind, s: &str) -> Result<Self, InvalidAddressFormat> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or(InvalidAddressFormat::MissingPrefix)?;

        match kind {
            AddressKind::Evm => {
                if digits.len() != 40 {
                    return Err(InvalidAddressFormat::InvalidLength {
                        expected: 40,
                        got: digits.len(),
                    });
                }

                let mut bytes = [0u8; 20];
                hex::decode_to_slice(digits, &mut bytes)?;
                let address = EvmAddress(bytes);

                let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
                let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
                if has_lower && has_upper && address.to_checksummed()[2..] != *digits {
                    return Err(InvalidAddressFormat::InvalidChecksum);
                }

                Ok(NativeAddress::Evm(address))
            }
            AddressKind::Sui => {
                if digits.is_empty() || digits.len() > 64 {
                    return Err(InvalidAddressFormat::InvalidLength {
                        expected: 64,
                        got: digits.len(),
                    });
                }

                let padded = format!("{:0>64}", digits);
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(padded, &mut bytes)?;

                Ok(NativeAddress::Sui(SuiAddress(bytes)))
            }
        }
    }

    pub fn to_u256(&self) -> U256 {
        match self {
            NativeAddress::Evm(address) => address.to_u256(),
            NativeAddress::Sui(address) => address.to_u256(),
        }
    }

    /// Interprets an integer slot as an address of the given kind.
    ///
    /// Fails for EVM addresses if any of the upper 96 bits are set.
    pub fn from_u256(kind: AddressKind, value: U256) -> Result<Self, InvalidAddressFormat> {
        let bytes = word(value);

        match kind {
            AddressKind::Evm => {
                if bytes[..12].iter().any(|b| *b != 0) {
                    return Err(InvalidAddressFormat::Overflow);
                }
                let mut address = [0u8; 20];
                address.copy_from_slice(&bytes[12..]);

                Ok(NativeAddress::Evm(EvmAddress(address)))
            }
            AddressKind::Sui => Ok(NativeAddress::Sui(SuiAddress(bytes))),
        }
    }
}

impl From<EvmAddress> for NativeAddress {
    fn from(address: EvmAddress) -> Self {
        NativeAddress::Evm(address)
    }
}

impl From<SuiAddress> for NativeAddress {
    fn from(address: SuiAddress) -> Self {
        NativeAddress::Sui(address)
    }
}

impl fmt::Display for NativeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeAddress::Evm(address) => address.fmt(f),
            NativeAddress::Sui(address) => address.fmt(f),
        }
    }
}

impl Serialize for EvmAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EvmAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EvmAddress::from_str(&s).map_err(de::Error::custom)
    }
}

#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq)]
pub enum InvalidAddressFormat {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("expected {expected} hex digits but got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("address contains invalid hex")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("mixed case address does not match its checksum")]
    InvalidChecksum,
    #[error("value does not fit into 160 bits")]
    Overflow,
}

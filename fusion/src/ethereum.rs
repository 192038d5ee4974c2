pub use primitive_types::U256;

use hex::FromHexError;
use serde::{Deserialize, Serialize};
use serde_hex::{SerHex, StrictPfx};
use std::{
    fmt,
    fmt::{Display, Formatter, LowerHex},
    str::FromStr,
};
use tiny_keccak::{Hasher, Keccak};

/// Computes the keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak::v256();
    hasher.update(data);

    let mut output = [0u8; 32];
    hasher.finalize(&mut output);

    Hash(output)
}

/// Big-endian 32 byte representation of a `U256`, i.e. one ABI word.
pub fn word(value: U256) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    bytes
}

#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Hash(#[serde(with = "SerHex::<StrictPfx>")] [u8; 32]);

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }
}

impl From<Hash> for [u8; 32] {
    fn from(s: Hash) -> Self {
        s.0
    }
}

impl From<Hash> for U256 {
    fn from(hash: Hash) -> Self {
        U256::from_big_endian(&hash.0)
    }
}

impl From<U256> for Hash {
    fn from(value: U256) -> Self {
        Hash(word(value))
    }
}

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn from_slice(src: &[u8]) -> Result<Self, InvalidLength> {
        if src.len() != 32 {
            return Err(InvalidLength(src.len()));
        }

        let mut h256 = Hash([0u8; 32]);
        h256.0.copy_from_slice(src);
        Ok(h256)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Hash {
    type Err = FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;

        Ok(Hash(bytes))
    }
}

impl LowerHex for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "0x")?;
        }
        for i in &self.0[..] {
            write!(f, "{:02x}", i)?;
        }
        Ok(())
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for i in &self.0[0..2] {
            write!(f, "{:02x}", i)?;
        }
        write!(f, "…")?;
        for i in &self.0[32 - 2..32] {
            write!(f, "{:02x}", i)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq, Eq)]
#[error("expected 32 bytes but got {0}")]
pub struct InvalidLength(pub usize);

/// Protocol level chain identifier as used in the limit order domain.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChainId(u64);

impl ChainId {
    pub const ETHEREUM: ChainId = ChainId(1);
    pub const BINANCE: ChainId = ChainId(56);
}

impl From<ChainId> for u64 {
    fn from(chain_id: ChainId) -> Self {
        chain_id.0
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        ChainId(id)
    }
}

impl From<ChainId> for U256 {
    fn from(chain_id: ChainId) -> Self {
        U256::from(chain_id.0)
    }
}

impl Display for ChainId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

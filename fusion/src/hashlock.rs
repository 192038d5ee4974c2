use crate::{
    ethereum::{keccak256, Hash, InvalidLength},
    secret::FromErr,
    Secret,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Commitment to a [`Secret`], the keccak-256 digest of its 32 bytes.
///
/// Both escrows of a swap are locked with the same hashlock so revealing the
/// secret on one chain unlocks the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hashlock(Hash);

impl Hashlock {
    pub const LENGTH: usize = 32;

    pub fn commit(secret: &Secret) -> Self {
        Hashlock(keccak256(secret.as_raw_secret()))
    }

    pub fn verify(&self, secret: &Secret) -> bool {
        Self::commit(secret) == *self
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, FromErr> {
        Hash::from_slice(bytes)
            .map(Hashlock)
            .map_err(|InvalidLength(got)| FromErr::InvalidLength {
                expected: Self::LENGTH,
                got,
            })
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<Secret> for Hashlock {
    fn from(secret: Secret) -> Self {
        Self::commit(&secret)
    }
}

impl From<[u8; 32]> for Hashlock {
    fn from(bytes: [u8; 32]) -> Self {
        Hashlock(Hash::from(bytes))
    }
}

impl From<Hashlock> for Hash {
    fn from(hashlock: Hashlock) -> Self {
        hashlock.0
    }
}

impl fmt::Display for Hashlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

use crate::Hashlock;
use rand::{CryptoRng, RngCore};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// The 32 byte preimage that unlocks both escrows of a swap.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Secret([u8; Secret::LENGTH]);

impl Secret {
    pub const LENGTH: usize = 32;

    pub fn random() -> Self {
        Self::generate(&mut rand::thread_rng())
    }

    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut secret = [0u8; Self::LENGTH];
        rng.fill_bytes(&mut secret);

        Secret(secret)
    }

    pub fn from_vec(vec: &[u8]) -> Result<Secret, FromErr> {
        if vec.len() != Self::LENGTH {
            return Err(FromErr::InvalidLength {
                expected: Self::LENGTH,
                got: vec.len(),
            });
        }
        let mut data = [0; Self::LENGTH];
        data.copy_from_slice(vec);

        Ok(Secret(data))
    }

    pub fn hashlock(&self) -> Hashlock {
        Hashlock::commit(self)
    }

    pub fn into_raw_secret(self) -> [u8; Self::LENGTH] {
        self.0
    }

    pub fn as_raw_secret(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }
}

impl From<[u8; Secret::LENGTH]> for Secret {
    fn from(secret: [u8; Secret::LENGTH]) -> Self {
        Secret(secret)
    }
}

// Only print the hashlock so secrets do not end up in logs by accident.
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", self.hashlock())
    }
}

impl fmt::LowerHex for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "0x")?;
        }
        f.write_str(&hex::encode(&self.0))
    }
}

#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq)]
pub enum FromErr {
    #[error("invalid length, expected: {expected:?}, got: {got:?}")]
    InvalidLength { expected: usize, got: usize },
    #[error("failed to decode secret from hex")]
    FromHex(#[from] hex::FromHexError),
}

impl FromStr for Secret {
    type Err = FromErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let vec = hex::decode(s)?;

        Self::from_vec(&vec)
    }
}

impl Serialize for Secret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:#x}", self))
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl<'vde> de::Visitor<'vde> for Visitor {
            type Value = Secret;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a hex encoded 32 byte value")
            }

            fn visit_str<E>(self, v: &str) -> Result<Secret, E>
            where
                E: de::Error,
            {
                Secret::from_str(v).map_err(|_| {
                    de::Error::invalid_value(de::Unexpected::Str(v), &"hex encoded bytes")
                })
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}

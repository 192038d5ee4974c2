use crate::{
    address::{EvmAddress, NativeAddress},
    ethereum::keccak256,
};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, PublicKey, Secp256k1, SecretKey,
};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Something that can produce a signature over a message.
pub trait Signer: Send + Sync {
    fn sign(&self, message: &[u8]) -> anyhow::Result<Signature>;
    fn address(&self) -> NativeAddress;
}

/// A 65 byte recoverable ECDSA signature, `r ‖ s ‖ v` with `v` in `{27, 28}`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl Signature {
    pub const LENGTH: usize = 65;

    pub fn to_bytes(&self) -> [u8; Self::LENGTH] {
        let mut bytes = [0u8; Self::LENGTH];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != Self::LENGTH {
            return Err(Error::InvalidLength(bytes.len()));
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);

        Ok(Signature { r, s, v: bytes[64] })
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(0x{})", hex::encode(&self.to_bytes()[..]))
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(&self.to_bytes()[..])))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(de::Error::custom)?;

        Signature::from_bytes(&bytes).map_err(de::Error::custom)
    }
}

/// A secp256k1 key that signs the keccak-256 digest of a message.
pub struct Wallet {
    context: Secp256k1<secp256k1::All>,
    private_key: SecretKey,
    address: EvmAddress,
}

impl Wallet {
    pub fn new(private_key: [u8; 32]) -> Result<Self, Error> {
        let private_key = SecretKey::from_slice(&private_key)?;

        Ok(Self::from_secret_key(private_key))
    }

    pub fn random() -> Self {
        Self::from_secret_key(SecretKey::new(&mut rand::thread_rng()))
    }

    fn from_secret_key(private_key: SecretKey) -> Self {
        let context = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&context, &private_key);

        Wallet {
            context,
            private_key,
            address: address_of(&public_key),
        }
    }

    pub fn evm_address(&self) -> EvmAddress {
        self.address
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .finish()
    }
}

impl Signer for Wallet {
    fn sign(&self, message: &[u8]) -> anyhow::Result<Signature> {
        let digest = keccak256(message);
        let message = Message::from_slice(digest.as_bytes())?;

        let signature = self
            .context
            .sign_ecdsa_recoverable(&message, &self.private_key);
        let (recovery_id, data) = signature.serialize_compact();

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&data[..32]);
        s.copy_from_slice(&data[32..]);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let v = 27 + recovery_id.to_i32() as u8;

        Ok(Signature { r, s, v })
    }

    fn address(&self) -> NativeAddress {
        NativeAddress::Evm(self.address)
    }
}

/// Recovers the address that signed the keccak-256 digest of `message`.
pub fn recover(message: &[u8], signature: &Signature) -> Result<EvmAddress, Error> {
    let recovery_id = match signature.v {
        27 | 28 => RecoveryId::from_i32(i32::from(signature.v - 27))?,
        v => return Err(Error::InvalidRecoveryId(v)),
    };

    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(&signature.r);
    compact[32..].copy_from_slice(&signature.s);
    let signature = RecoverableSignature::from_compact(&compact, recovery_id)?;

    let digest = keccak256(message);
    let message = Message::from_slice(digest.as_bytes())?;
    let public_key = Secp256k1::verification_only().recover_ecdsa(&message, &signature)?;

    Ok(address_of(&public_key))
}

fn address_of(public_key: &PublicKey) -> EvmAddress {
    let uncompressed = public_key.serialize_uncompressed();
    let digest = keccak256(&uncompressed[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&digest.as_bytes()[12..]);

    EvmAddress::from(address)
}

#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("signature must be 65 bytes but was {0}")]
    InvalidLength(usize),
    #[error("recovery id {0} is neither 27 nor 28")]
    InvalidRecoveryId(u8),
    #[error("secp256k1 rejected the key or signature")]
    Crypto(#[from] secp256k1::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // well known development key of the first hardhat account
    const PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn wallet() -> Wallet {
        let mut key = [0u8; 32];
        hex::decode_to_slice(PRIVATE_KEY, &mut key).unwrap();

        Wallet::new(key).unwrap()
    }

    #[test]
    fn derives_address_from_key() {
        assert_eq!(
            wallet().evm_address(),
            EvmAddress::from_str("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap()
        );
    }

    #[test]
    fn recovers_signer() {
        let wallet = wallet();
        let signature = wallet.sign(b"order").unwrap();

        assert!(signature.v == 27 || signature.v == 28);
        assert_eq!(recover(b"order", &signature), Ok(wallet.evm_address()));
    }

    #[test]
    fn tampered_message_recovers_someone_else() {
        let wallet = wallet();
        let signature = wallet.sign(b"order").unwrap();

        assert_ne!(recover(b"other", &signature), Ok(wallet.evm_address()));
    }

    #[test]
    fn signature_survives_json() {
        let signature = Wallet::random().sign(b"order").unwrap();

        let json = serde_json::to_string(&signature).unwrap();

        assert_eq!(serde_json::from_str::<Signature>(&json).unwrap(), signature);
    }
}

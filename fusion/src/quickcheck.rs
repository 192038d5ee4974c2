use crate::{
    address::{EvmAddress, SuiAddress},
    ethereum::{Hash, U256},
    Secret,
};
use quickcheck::{Arbitrary, Gen};
use std::ops::Deref;

/// Generic newtype that allows us to implement quickcheck::Arbitrary on foreign
/// types
#[derive(Clone, Debug, Copy)]
pub struct Quickcheck<I>(pub I);

impl<I> Deref for Quickcheck<I> {
    type Target = I;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

fn fill_bytes(g: &mut Gen, bytes: &mut [u8]) {
    for byte in bytes.iter_mut() {
        *byte = u8::arbitrary(g);
    }
}

impl Arbitrary for Quickcheck<[u8; 32]> {
    fn arbitrary(g: &mut Gen) -> Self {
        let mut bytes = [0u8; 32];
        fill_bytes(g, &mut bytes);

        Quickcheck(bytes)
    }
}

impl Arbitrary for Quickcheck<U256> {
    fn arbitrary(g: &mut Gen) -> Self {
        let bytes = *Quickcheck::<[u8; 32]>::arbitrary(g);

        Quickcheck(U256::from_big_endian(&bytes))
    }
}

impl Arbitrary for Quickcheck<Hash> {
    fn arbitrary(g: &mut Gen) -> Self {
        let bytes = *Quickcheck::<[u8; 32]>::arbitrary(g);

        Quickcheck(Hash::from(bytes))
    }
}

impl Arbitrary for Quickcheck<Secret> {
    fn arbitrary(g: &mut Gen) -> Self {
        let bytes = *Quickcheck::<[u8; 32]>::arbitrary(g);

        Quickcheck(Secret::from(bytes))
    }
}

impl Arbitrary for Quickcheck<EvmAddress> {
    fn arbitrary(g: &mut Gen) -> Self {
        let mut bytes = [0u8; 20];
        fill_bytes(g, &mut bytes);

        Quickcheck(EvmAddress::from(bytes))
    }
}

impl Arbitrary for Quickcheck<SuiAddress> {
    fn arbitrary(g: &mut Gen) -> Self {
        let bytes = *Quickcheck::<[u8; 32]>::arbitrary(g);

        Quickcheck(SuiAddress::from(bytes))
    }
}

use crate::ethereum::Hash;
use std::collections::HashSet;

/// Order hashes of the swaps currently being executed.
///
/// Swaps share nothing but the chain clients, this only prevents running two
/// pipelines for the same order.
#[derive(Debug, Default)]
pub struct OngoingSwaps {
    orders: HashSet<Hash>,
}

impl OngoingSwaps {
    pub fn insert(&mut self, order_hash: Hash) -> Result<(), AlreadyOngoing> {
        if !self.orders.insert(order_hash) {
            return Err(AlreadyOngoing(order_hash));
        }

        Ok(())
    }

    pub fn remove(&mut self, order_hash: &Hash) {
        self.orders.remove(order_hash);
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq, Eq)]
#[error("a swap for order {0} is already ongoing")]
pub struct AlreadyOngoing(pub Hash);

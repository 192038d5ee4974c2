#![warn(
    unused_extern_crates,
    missing_debug_implementations,
    missing_copy_implementations,
    rust_2018_idioms,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::fallible_impl_from,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::print_stdout,
    clippy::dbg_macro
)]
#![cfg_attr(not(test), warn(clippy::unwrap_used))]
#![forbid(unsafe_code)]

pub mod address;
pub mod chain;
pub mod escrow;
pub mod ethereum;
mod hashlock;
pub mod immutables;
pub mod order;
#[cfg(test)]
pub mod proptest;
#[cfg(test)]
mod quickcheck;
pub mod resolver;
mod secret;
pub mod signer;
pub mod simulation;
pub mod sui;
pub mod swaps;
pub mod taker_traits;
pub mod timelocks;
mod timestamp;

pub use self::{
    hashlock::Hashlock,
    secret::{FromErr, Secret},
    timestamp::{RelativeTime, Timestamp},
};

/// A module for exporting dependencies that appear in the public API of our
/// crate.
///
/// `U256` shows up in every amount and address slot, consumers building
/// orders should use this version rather than depending on
/// `primitive-types` themselves.
pub mod export {
    pub use ::primitive_types;
}

use serde::{Deserialize, Serialize};

/// A swap consists of two escrows, one on each _side_.
///
/// The source side is the chain the maker's funds are locked on when the
/// resolver fills the order, the destination side the chain the resolver
/// locks the taking amount on. Both parties, as well as every escrow and
/// timelock stage, refer to the same chain as the source. Which party
/// withdraws or cancels on a side only follows from combining the side with
/// the kind of transition.
#[derive(
    Clone,
    Copy,
    Debug,
    strum_macros::Display,
    strum_macros::EnumString,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Src,
    Dst,
}

//! Cross chain limit orders.
//!
//! An order is a limit order of the aggregation router whose extension
//! instructs the escrow factory to lock the maker's funds in a source escrow
//! once a resolver fills it. The maker signs the EIP-712 hash of the order.

use crate::{
    address::EvmAddress,
    ethereum::{keccak256, word, ChainId, Hash, U256},
    taker_traits::EncodeError,
    timelocks::{TimeLocks, TimeLocksError},
    Hashlock, Timestamp,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// The aggregation router v6 shares its address across all EVM chains.
pub const AGGREGATION_ROUTER_V6: EvmAddress = EvmAddress::new([
    0x11, 0x11, 0x11, 0x12, 0x54, 0x21, 0xca, 0x6d, 0xc4, 0x52, 0xd2, 0x89, 0x31, 0x42, 0x80, 0xa0,
    0xf8, 0x84, 0x2a, 0x65,
]);

const ORDER_TYPE: &str = "Order(uint256 salt,address maker,address receiver,address makerAsset,address takerAsset,uint256 makingAmount,uint256 takingAmount,uint256 makerTraits)";
const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const DOMAIN_NAME: &str = "1inch Aggregation Router";
const DOMAIN_VERSION: &str = "6";

const UINT_40_MAX: u64 = (1 << 40) - 1;
const UINT_24_MAX: u32 = (1 << 24) - 1;

/// EIP-712 domain of the limit order protocol on one chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub chain_id: ChainId,
    pub verifying_contract: EvmAddress,
}

impl Domain {
    pub fn new(chain_id: ChainId, verifying_contract: EvmAddress) -> Self {
        Domain {
            chain_id,
            verifying_contract,
        }
    }

    pub fn aggregation_router(chain_id: ChainId) -> Self {
        Self::new(chain_id, AGGREGATION_ROUTER_V6)
    }

    pub fn separator(&self) -> Hash {
        let mut encoded = Vec::with_capacity(5 * 32);
        encoded.extend_from_slice(keccak256(DOMAIN_TYPE.as_bytes()).as_bytes());
        encoded.extend_from_slice(keccak256(DOMAIN_NAME.as_bytes()).as_bytes());
        encoded.extend_from_slice(keccak256(DOMAIN_VERSION.as_bytes()).as_bytes());
        encoded.extend_from_slice(&word(self.chain_id.into()));
        encoded.extend_from_slice(&word(self.verifying_contract.to_u256()));

        keccak256(&encoded)
    }
}

/// Packed 256-bit maker preferences of a limit order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MakerTraits(U256);

impl MakerTraits {
    const NO_PARTIAL_FILLS: usize = 255;
    const ALLOW_MULTIPLE_FILLS: usize = 254;
    const POST_INTERACTION: usize = 251;
    const HAS_EXTENSION: usize = 249;

    const EXPIRATION_OFFSET: usize = 80;
    const NONCE_OFFSET: usize = 120;

    pub fn with_flag(self, bit: usize, enabled: bool) -> Self {
        let mask = U256::one() << bit;
        if enabled {
            MakerTraits(self.0 | mask)
        } else {
            MakerTraits(self.0 & !mask)
        }
    }

    fn flag(&self, bit: usize) -> bool {
        self.0.bit(bit)
    }

    pub fn allows_partial_fills(&self) -> bool {
        !self.flag(Self::NO_PARTIAL_FILLS)
    }

    pub fn allows_multiple_fills(&self) -> bool {
        self.flag(Self::ALLOW_MULTIPLE_FILLS)
    }

    pub fn has_extension(&self) -> bool {
        self.flag(Self::HAS_EXTENSION)
    }

    pub fn has_post_interaction(&self) -> bool {
        self.flag(Self::POST_INTERACTION)
    }

    pub fn with_nonce(self, nonce: u64) -> Result<Self, ValidationError> {
        if nonce > UINT_40_MAX {
            return Err(ValidationError::NonceTooWide(nonce));
        }
        let cleared = self.0 & !(U256::from(UINT_40_MAX) << Self::NONCE_OFFSET);

        Ok(MakerTraits(cleared | U256::from(nonce) << Self::NONCE_OFFSET))
    }

    pub fn nonce(&self) -> u64 {
        (self.0 >> Self::NONCE_OFFSET).low_u64() & UINT_40_MAX
    }

    pub fn with_expiration(self, expiration: Timestamp) -> Self {
        let cleared = self.0 & !(U256::from(UINT_40_MAX) << Self::EXPIRATION_OFFSET);

        MakerTraits(cleared | U256::from(u32::from(expiration)) << Self::EXPIRATION_OFFSET)
    }

    /// `None` if the order never expires.
    #[allow(clippy::cast_possible_truncation)]
    pub fn expiration(&self) -> Option<Timestamp> {
        let expiration = (self.0 >> Self::EXPIRATION_OFFSET).low_u64() & UINT_40_MAX;
        if expiration == 0 {
            return None;
        }

        Some(Timestamp::from(expiration.min(u64::from(u32::MAX)) as u32))
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expiration()
            .map(|expiration| now > expiration)
            .unwrap_or(false)
    }
}

impl From<MakerTraits> for U256 {
    fn from(traits: MakerTraits) -> Self {
        traits.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionPoint {
    /// Rate bump relative to the taking amount, in 1e-7 units.
    pub coefficient: u32,
    /// Seconds since the previous point.
    pub delay: u16,
}

/// Parameters of the dutch auction over the taking amount.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionDetails {
    pub start_time: Timestamp,
    pub duration: u32,
    pub initial_rate_bump: u32,
    pub points: Vec<AuctionPoint>,
    pub gas_bump_estimate: u32,
    pub gas_price_estimate: u32,
}

impl AuctionDetails {
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(18 + 5 * self.points.len());
        encoded.extend_from_slice(&uint24(self.gas_bump_estimate));
        encoded.extend_from_slice(&self.gas_price_estimate.to_be_bytes());
        encoded.extend_from_slice(&u32::from(self.start_time).to_be_bytes());
        encoded.extend_from_slice(&uint24(self.duration));
        encoded.extend_from_slice(&uint24(self.initial_rate_bump));
        encoded.push(self.points.len() as u8);
        for point in &self.points {
            encoded.extend_from_slice(&uint24(point.coefficient));
            encoded.extend_from_slice(&point.delay.to_be_bytes());
        }

        encoded
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let in_range = self.duration <= UINT_24_MAX
            && self.initial_rate_bump <= UINT_24_MAX
            && self.gas_bump_estimate <= UINT_24_MAX
            && self.points.len() <= usize::from(u8::MAX)
            && self
                .points
                .iter()
                .all(|point| point.coefficient <= UINT_24_MAX);

        if !in_range {
            return Err(ValidationError::AuctionOutOfRange);
        }

        Ok(())
    }
}

fn uint24(value: u32) -> [u8; 3] {
    let bytes = value.to_be_bytes();
    [bytes[1], bytes[2], bytes[3]]
}

/// Decides whether a resolver may fill an order at a given time.
pub trait FillPolicy {
    fn may_fill(&self, resolver: EvmAddress, now: Timestamp) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub address: EvmAddress,
    pub allow_from: Timestamp,
}

/// Resolvers allowed to fill an order and when each of them may start.
///
/// An empty whitelist lets any resolver fill once resolving started.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Whitelist {
    pub resolving_start_time: Timestamp,
    pub entries: Vec<WhitelistEntry>,
}

impl Whitelist {
    /// The low 10 bytes of each address followed by its delay relative to the
    /// previous entry.
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self) -> Vec<u8> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|entry| entry.allow_from);

        let mut encoded = Vec::with_capacity(5 + 12 * entries.len());
        encoded.extend_from_slice(&u32::from(self.resolving_start_time).to_be_bytes());
        encoded.push(entries.len() as u8);

        let mut previous = self.resolving_start_time;
        for entry in &entries {
            let allow_from = entry.allow_from.max(self.resolving_start_time);
            let delay = u32::from(allow_from) - u32::from(previous);
            let delay = delay.min(u32::from(u16::MAX)) as u16;

            encoded.extend_from_slice(&entry.address.as_bytes()[10..]);
            encoded.extend_from_slice(&delay.to_be_bytes());
            previous = allow_from;
        }

        encoded
    }
}

impl FillPolicy for Whitelist {
    fn may_fill(&self, resolver: EvmAddress, now: Timestamp) -> bool {
        if now < self.resolving_start_time {
            return false;
        }

        if self.entries.is_empty() {
            return true;
        }

        self.entries
            .iter()
            .any(|entry| entry.address == resolver && now >= entry.allow_from)
    }
}

/// The trade itself, independent of how it settles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInfo {
    /// Random upper 96 bits of the salt, drawn if absent.
    pub salt: Option<U256>,
    pub maker: U256,
    pub receiver: Option<U256>,
    pub maker_asset: U256,
    pub taker_asset: U256,
    pub making_amount: U256,
    pub taking_amount: U256,
}

/// Everything both escrows need to know about the swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowParams {
    pub hashlock: Hashlock,
    pub timelocks: TimeLocks,
    pub src_chain_id: ChainId,
    pub dst_chain_id: ChainId,
    pub src_safety_deposit: U256,
    pub dst_safety_deposit: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Details {
    pub auction: AuctionDetails,
    pub whitelist: Whitelist,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillOptions {
    pub nonce: u64,
    pub allow_partial_fills: bool,
    pub allow_multiple_fills: bool,
    pub expiration: Option<Timestamp>,
}

/// The extension bytes appended to a limit order.
///
/// A 32 byte header holds the cumulative end offset of every field in 4 byte
/// slots, field `i` in bits `[32 * i, 32 * i + 32)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extension {
    pub maker_asset_suffix: Vec<u8>,
    pub taker_asset_suffix: Vec<u8>,
    pub making_amount_data: Vec<u8>,
    pub taking_amount_data: Vec<u8>,
    pub predicate: Vec<u8>,
    pub maker_permit: Vec<u8>,
    pub pre_interaction: Vec<u8>,
    pub post_interaction: Vec<u8>,
}

impl Extension {
    fn fields(&self) -> [&[u8]; 8] {
        [
            &self.maker_asset_suffix,
            &self.taker_asset_suffix,
            &self.making_amount_data,
            &self.taking_amount_data,
            &self.predicate,
            &self.maker_permit,
            &self.pre_interaction,
            &self.post_interaction,
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|field| field.is_empty())
    }

    pub fn encode(&self) -> Vec<u8> {
        if self.is_empty() {
            return Vec::new();
        }

        let mut offsets = U256::zero();
        let mut end = 0usize;
        for (i, field) in self.fields().iter().enumerate() {
            end += field.len();
            offsets = offsets | U256::from(end) << (32 * i);
        }

        let mut encoded = word(offsets).to_vec();
        for field in self.fields().iter() {
            encoded.extend_from_slice(field);
        }

        encoded
    }

    pub fn hash(&self) -> Hash {
        keccak256(&self.encode())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainOrder {
    escrow_factory: EvmAddress,
    salt: U256,
    maker: U256,
    receiver: U256,
    maker_asset: U256,
    taker_asset: U256,
    making_amount: U256,
    taking_amount: U256,
    maker_traits: MakerTraits,
    escrow: EscrowParams,
    details: Details,
}

impl CrossChainOrder {
    pub fn new(
        escrow_factory: EvmAddress,
        info: OrderInfo,
        escrow: EscrowParams,
        details: Details,
        options: FillOptions,
    ) -> Result<Self, ValidationError> {
        escrow.timelocks.validate()?;

        if options.allow_partial_fills || options.allow_multiple_fills {
            return Err(ValidationError::UnsupportedFillMode {
                allow_partial_fills: options.allow_partial_fills,
                allow_multiple_fills: options.allow_multiple_fills,
            });
        }
        if info.making_amount.is_zero() {
            return Err(ValidationError::ZeroAmount("making amount"));
        }
        if info.taking_amount.is_zero() {
            return Err(ValidationError::ZeroAmount("taking amount"));
        }
        if escrow.src_chain_id == escrow.dst_chain_id {
            return Err(ValidationError::SameChain(escrow.src_chain_id));
        }
        details.auction.validate()?;

        let mut maker_traits = MakerTraits::default()
            .with_flag(MakerTraits::NO_PARTIAL_FILLS, true)
            .with_flag(MakerTraits::ALLOW_MULTIPLE_FILLS, false)
            .with_flag(MakerTraits::POST_INTERACTION, true)
            .with_flag(MakerTraits::HAS_EXTENSION, true)
            .with_nonce(options.nonce)?;
        if let Some(expiration) = options.expiration {
            maker_traits = maker_traits.with_expiration(expiration);
        }

        let salt_high = match info.salt {
            Some(salt) if salt.bits() > 96 => return Err(ValidationError::SaltTooWide),
            Some(salt) => salt,
            None => U256::from(rand::thread_rng().gen::<u64>())
                | U256::from(rand::thread_rng().gen::<u32>()) << 64,
        };

        let mut order = CrossChainOrder {
            escrow_factory,
            salt: U256::zero(),
            maker: info.maker,
            receiver: info.receiver.unwrap_or_else(U256::zero),
            maker_asset: info.maker_asset,
            taker_asset: info.taker_asset,
            making_amount: info.making_amount,
            taking_amount: info.taking_amount,
            maker_traits,
            escrow,
            details,
        };
        order.salt = salt_high << 160 | (U256::from(order.extension().hash()) & uint160_max());

        Ok(order)
    }

    pub fn extension(&self) -> Extension {
        let factory = self.escrow_factory.as_bytes();
        let auction = self.details.auction.encode();

        let amount_data = [factory, &auction].concat();
        let post_interaction = [
            factory,
            &self.details.whitelist.encode(),
            &self.escrow_extra_data(),
        ]
        .concat();

        Extension {
            making_amount_data: amount_data.clone(),
            taking_amount_data: amount_data,
            post_interaction,
            ..Extension::default()
        }
    }

    /// Hashlock, destination chain and token, packed deposits and timelocks
    /// without their baseline, as read by the escrow factory.
    fn escrow_extra_data(&self) -> Vec<u8> {
        let deposits = self.escrow.src_safety_deposit << 128 | self.escrow.dst_safety_deposit;
        let timelocks = self.escrow.timelocks.with_deployed_at(Timestamp::from(0)).pack();

        let mut encoded = Vec::with_capacity(5 * 32);
        encoded.extend_from_slice(self.escrow.hashlock.as_bytes());
        encoded.extend_from_slice(&word(self.escrow.dst_chain_id.into()));
        encoded.extend_from_slice(&word(self.taker_asset));
        encoded.extend_from_slice(&word(deposits));
        encoded.extend_from_slice(&word(timelocks));

        encoded
    }

    pub fn struct_hash(&self) -> Hash {
        let mut encoded = Vec::with_capacity(9 * 32);
        encoded.extend_from_slice(keccak256(ORDER_TYPE.as_bytes()).as_bytes());
        encoded.extend_from_slice(&word(self.salt));
        encoded.extend_from_slice(&word(self.maker));
        encoded.extend_from_slice(&word(self.receiver));
        encoded.extend_from_slice(&word(self.maker_asset));
        encoded.extend_from_slice(&word(self.taker_asset));
        encoded.extend_from_slice(&word(self.making_amount));
        encoded.extend_from_slice(&word(self.taking_amount));
        encoded.extend_from_slice(&word(self.maker_traits.into()));

        keccak256(&encoded)
    }

    /// The exact bytes the maker signs: `0x1901 ‖ domainSeparator ‖ structHash`.
    pub fn signing_message(&self, domain: &Domain) -> Vec<u8> {
        let mut message = Vec::with_capacity(66);
        message.extend_from_slice(&[0x19, 0x01]);
        message.extend_from_slice(domain.separator().as_bytes());
        message.extend_from_slice(self.struct_hash().as_bytes());

        message
    }

    pub fn order_hash(&self, domain: &Domain) -> Hash {
        keccak256(&self.signing_message(domain))
    }

    /// Whether the low 160 bits of the salt commit to the extension.
    pub fn salt_matches_extension(&self) -> bool {
        self.salt & uint160_max() == U256::from(self.extension().hash()) & uint160_max()
    }

    pub fn escrow_factory(&self) -> EvmAddress {
        self.escrow_factory
    }

    pub fn salt(&self) -> U256 {
        self.salt
    }

    pub fn maker(&self) -> U256 {
        self.maker
    }

    pub fn receiver(&self) -> U256 {
        self.receiver
    }

    /// The party credited on the destination chain.
    pub fn receiver_or_maker(&self) -> U256 {
        if self.receiver.is_zero() {
            self.maker
        } else {
            self.receiver
        }
    }

    pub fn maker_asset(&self) -> U256 {
        self.maker_asset
    }

    pub fn taker_asset(&self) -> U256 {
        self.taker_asset
    }

    pub fn making_amount(&self) -> U256 {
        self.making_amount
    }

    pub fn taking_amount(&self) -> U256 {
        self.taking_amount
    }

    pub fn maker_traits(&self) -> MakerTraits {
        self.maker_traits
    }

    pub fn nonce(&self) -> u64 {
        self.maker_traits.nonce()
    }

    pub fn hashlock(&self) -> Hashlock {
        self.escrow.hashlock
    }

    pub fn timelocks(&self) -> TimeLocks {
        self.escrow.timelocks
    }

    pub fn src_chain_id(&self) -> ChainId {
        self.escrow.src_chain_id
    }

    pub fn dst_chain_id(&self) -> ChainId {
        self.escrow.dst_chain_id
    }

    pub fn src_safety_deposit(&self) -> U256 {
        self.escrow.src_safety_deposit
    }

    pub fn dst_safety_deposit(&self) -> U256 {
        self.escrow.dst_safety_deposit
    }

    pub fn auction(&self) -> &AuctionDetails {
        &self.details.auction
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.details.whitelist
    }
}

fn uint160_max() -> U256 {
    (U256::one() << 160) - 1
}

#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsafe timelock ordering")]
    UnsafeTimelockOrdering(#[from] TimeLocksError),
    #[error("partial fills ({allow_partial_fills}) and multiple fills ({allow_multiple_fills}) are not supported")]
    UnsupportedFillMode {
        allow_partial_fills: bool,
        allow_multiple_fills: bool,
    },
    #[error("{0} must not be zero")]
    ZeroAmount(&'static str),
    #[error("nonce {0} does not fit into 40 bits")]
    NonceTooWide(u64),
    #[error("salt does not fit into 96 bits")]
    SaltTooWide,
    #[error("source and destination chain are both {0}")]
    SameChain(ChainId),
    #[error("auction parameter out of range")]
    AuctionOutOfRange,
    #[error("fill amount {fill_amount} does not fill the whole making amount {making_amount}")]
    PartialFill {
        making_amount: U256,
        fill_amount: U256,
    },
    #[error("taker traits cannot be encoded")]
    TakerTraits(#[from] EncodeError),
}

use fusion::{
    address::{AddressKind, EvmAddress, NativeAddress},
    ethereum::{ChainId, U256},
    order::{CrossChainOrder, Details, Domain, EscrowParams, FillOptions, OrderInfo},
    resolver::{ChainContext, Config, Resolver},
    signer::{Signature, Signer, Wallet},
    simulation::{native, JsonCallEncoder, Ledger, SecretRelay},
    sui::MoveCallEncoder,
    timelocks::TimeLocks,
    RelativeTime, Secret, Timestamp,
};
use std::{str::FromStr, sync::Arc, time::Duration};

pub const T0: u32 = 1_700_000_000;

/// 100 and 99 units of a 6 decimals token.
pub const MAKING_AMOUNT: u64 = 100_000_000;
pub const TAKING_AMOUNT: u64 = 99_000_000;

/// 0.001 ether and 0.001 sui.
pub const SRC_SAFETY_DEPOSIT: u64 = 1_000_000_000_000_000;
pub const DST_SAFETY_DEPOSIT: u64 = 1_000_000;

pub fn config() -> Config {
    Config {
        confirmation_timeout: Duration::from_secs(30),
        poll_interval: Duration::from_secs(1),
        poll_attempts: 3,
        retries: 2,
    }
}

pub fn timelocks() -> TimeLocks {
    TimeLocks {
        deployed_at: Timestamp::from(0),
        src_withdrawal: RelativeTime::new(10),
        src_public_withdrawal: RelativeTime::new(120),
        src_cancellation: RelativeTime::new(121),
        src_public_cancellation: RelativeTime::new(122),
        dst_withdrawal: RelativeTime::new(10),
        dst_public_withdrawal: RelativeTime::new(100),
        dst_cancellation: RelativeTime::new(101),
    }
}

fn sui(s: &str) -> U256 {
    NativeAddress::parse(AddressKind::Sui, s).unwrap().to_u256()
}

pub fn dst_escrow_package() -> U256 {
    sui("0x3d4e")
}

fn evm(s: &str) -> EvmAddress {
    EvmAddress::from_str(s).unwrap()
}

/// An EVM source chain and a Sui destination chain with a funded maker and
/// resolver.
pub struct World {
    pub src: Ledger,
    pub dst: Ledger,
    pub relay: SecretRelay,
    pub maker: Wallet,
    pub maker_on_dst: U256,
    pub resolver: Arc<Resolver>,
    pub resolver_on_src: U256,
    pub resolver_on_dst: U256,
    pub src_token: U256,
    pub dst_token: U256,
}

impl World {
    pub async fn new(config: Config) -> Self {
        Self::with_swaps(config, 1).await
    }

    /// Funds maker and resolver for `swaps` orders.
    pub async fn with_swaps(config: Config, swaps: u64) -> Self {
        let src = Ledger::new(ChainId::ETHEREUM, Timestamp::from(T0));
        let dst = Ledger::new(ChainId::BINANCE, Timestamp::from(T0));

        let maker = Wallet::random();
        let maker_on_dst =
            sui("0x9e8a3a1cfbe2b4ad0a1f0c3b34b2e0a4c8b9a0d5c7f1e3d2b4a6c8e0f1a2b3c4");
        let resolver_on_src = Wallet::random().evm_address().to_u256();
        let resolver_on_dst = sui("0x5f1e");

        let src_token = evm("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48").to_u256();
        let dst_token =
            sui("0xdba34672e30cb065b1f93e3ab55318768fd6fef66c15942c9f7cb846e2f900e7");

        src.mint(src_token, maker.evm_address().to_u256(), U256::from(MAKING_AMOUNT * swaps))
            .await;
        src.mint(native(), resolver_on_src, U256::from(SRC_SAFETY_DEPOSIT * swaps))
            .await;
        dst.mint(dst_token, resolver_on_dst, U256::from(TAKING_AMOUNT * swaps))
            .await;
        dst.mint(native(), resolver_on_dst, U256::from(DST_SAFETY_DEPOSIT * swaps))
            .await;

        let resolver = Resolver::new(
            ChainContext {
                client: Arc::new(src.client(resolver_on_src)),
                encoder: Arc::new(JsonCallEncoder),
                identity: resolver_on_src,
            },
            ChainContext {
                client: Arc::new(dst.client(resolver_on_dst)),
                encoder: Arc::new(MoveCallEncoder::new(dst_escrow_package())),
                identity: resolver_on_dst,
            },
            Domain::aggregation_router(ChainId::ETHEREUM),
            config,
        );

        World {
            relay: SecretRelay::new(src.clone(), dst.clone()),
            src,
            dst,
            maker,
            maker_on_dst,
            resolver: Arc::new(resolver),
            resolver_on_src,
            resolver_on_dst,
            src_token,
            dst_token,
        }
    }

    /// A signed order whose secret is known to the relay.
    pub async fn order(&self, secret: &Secret, nonce: u64) -> (CrossChainOrder, Signature) {
        let order = CrossChainOrder::new(
            evm("0xa7bcb4eac8964306f9e3764f67db6a7af6ddf99a"),
            OrderInfo {
                salt: None,
                maker: self.maker.evm_address().to_u256(),
                receiver: Some(self.maker_on_dst),
                maker_asset: self.src_token,
                taker_asset: self.dst_token,
                making_amount: U256::from(MAKING_AMOUNT),
                taking_amount: U256::from(TAKING_AMOUNT),
            },
            EscrowParams {
                hashlock: secret.hashlock(),
                timelocks: timelocks(),
                src_chain_id: ChainId::ETHEREUM,
                dst_chain_id: ChainId::BINANCE,
                src_safety_deposit: U256::from(SRC_SAFETY_DEPOSIT),
                dst_safety_deposit: U256::from(DST_SAFETY_DEPOSIT),
            },
            Details::default(),
            FillOptions {
                nonce,
                ..FillOptions::default()
            },
        )
        .unwrap();

        let signature = self.maker.sign(&order.signing_message(&self.resolver.domain())).unwrap();
        self.relay
            .register(&self.resolver.domain(), order.clone(), *secret)
            .await;

        (order, signature)
    }
}

use crate::config::{file, File};
use anyhow::{Context, Result};
use fusion::{
    address::{AddressKind, NativeAddress},
    ethereum::{ChainId, U256},
    resolver,
    timelocks::TimeLocks,
    RelativeTime, Timestamp,
};
use std::time::Duration;
use tracing::level_filters::LevelFilter;

/// The effective configuration, every absent option filled with its default.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub logging: Logging,
    pub resolver: resolver::Config,
    pub chain: Chains,
    pub order: Order,
}

#[derive(Clone, Copy, Debug, derivative::Derivative, PartialEq)]
#[derivative(Default)]
pub struct Logging {
    #[derivative(Default(value = "LevelFilter::INFO"))]
    pub level: LevelFilter,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Chains {
    pub src: Chain,
    pub dst: Chain,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Chain {
    pub chain_id: ChainId,
    pub escrow_factory: NativeAddress,
    pub resolver: NativeAddress,
    pub token: NativeAddress,
}

impl Chain {
    fn default_src() -> Self {
        Chain {
            chain_id: ChainId::ETHEREUM,
            escrow_factory: evm("0xa7bcb4eac8964306f9e3764f67db6a7af6ddf99a"),
            resolver: evm("0x4e3f5c1ea1b6c55b8a2ef1c5d0e2b9a41c3d7f22"),
            token: evm("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
        }
    }

    fn default_dst() -> Self {
        Chain {
            chain_id: ChainId::BINANCE,
            escrow_factory: sui("0x3c2b1f4d9e0a7c6b5d8e1f2a3b4c5d6e7f8091a2b3c4d5e6f708192a3b4c5d6e"),
            resolver: sui("0x5f1e"),
            token: sui("0xdba34672e30cb065b1f93e3ab55318768fd6fef66c15942c9f7cb846e2f900e7"),
        }
    }

    pub fn kind(&self) -> AddressKind {
        self.resolver.kind()
    }

    fn from_file(chain: file::Chain) -> Result<Self> {
        let parse = |name: &str, value: &str| {
            NativeAddress::parse(chain.kind, value).with_context(|| {
                format!(
                    "{} {} is not a valid {} address",
                    name, value, chain.kind
                )
            })
        };

        Ok(Chain {
            chain_id: chain.chain_id,
            escrow_factory: parse("escrow factory", &chain.escrow_factory)?,
            resolver: parse("resolver", &chain.resolver)?,
            token: parse("token", &chain.token)?,
        })
    }
}

impl From<Chain> for file::Chain {
    fn from(chain: Chain) -> Self {
        file::Chain {
            chain_id: chain.chain_id,
            kind: chain.kind(),
            escrow_factory: chain.escrow_factory.to_string(),
            resolver: chain.resolver.to_string(),
            token: chain.token.to_string(),
        }
    }
}

/// Parameters of the demo order the `simulate` command fills.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Order {
    pub making_amount: U256,
    pub taking_amount: U256,
    pub src_safety_deposit: U256,
    pub dst_safety_deposit: U256,
    pub receiver: NativeAddress,
    pub timelocks: TimeLocks,
}

impl Default for Order {
    fn default() -> Self {
        Order {
            making_amount: U256::from(100_000_000u64),
            taking_amount: U256::from(99_000_000u64),
            src_safety_deposit: U256::from(1_000_000_000_000_000u64),
            dst_safety_deposit: U256::from(1_000_000u64),
            receiver: sui("0x9e8a3a1cfbe2b4ad0a1f0c3b34b2e0a4c8b9a0d5c7f1e3d2b4a6c8e0f1a2b3c4"),
            timelocks: TimeLocks {
                deployed_at: Timestamp::from(0),
                src_withdrawal: RelativeTime::new(10),
                src_public_withdrawal: RelativeTime::new(120),
                src_cancellation: RelativeTime::new(121),
                src_public_cancellation: RelativeTime::new(122),
                dst_withdrawal: RelativeTime::new(10),
                dst_public_withdrawal: RelativeTime::new(100),
                dst_cancellation: RelativeTime::new(101),
            },
        }
    }
}

impl Order {
    fn from_file(order: file::Order, receiver_kind: AddressKind) -> Result<Self> {
        let default = Order::default();

        let receiver = match order.receiver {
            Some(receiver) => NativeAddress::parse(receiver_kind, &receiver)
                .with_context(|| format!("receiver {} is not a valid address", receiver))?,
            None if receiver_kind == default.receiver.kind() => default.receiver,
            None => anyhow::bail!(
                "a receiver is required for a {} destination chain",
                receiver_kind
            ),
        };

        let timelocks = order.timelocks.map_or(default.timelocks, |t| TimeLocks {
            deployed_at: Timestamp::from(0),
            src_withdrawal: RelativeTime::new(t.src_withdrawal),
            src_public_withdrawal: RelativeTime::new(t.src_public_withdrawal),
            src_cancellation: RelativeTime::new(t.src_cancellation),
            src_public_cancellation: RelativeTime::new(t.src_public_cancellation),
            dst_withdrawal: RelativeTime::new(t.dst_withdrawal),
            dst_public_withdrawal: RelativeTime::new(t.dst_public_withdrawal),
            dst_cancellation: RelativeTime::new(t.dst_cancellation),
        });
        timelocks
            .validate()
            .context("timelocks of the configured order are not usable")?;

        Ok(Order {
            making_amount: order.making_amount.map_or(default.making_amount, U256::from),
            taking_amount: order.taking_amount.map_or(default.taking_amount, U256::from),
            src_safety_deposit: order
                .src_safety_deposit
                .map_or(default.src_safety_deposit, U256::from),
            dst_safety_deposit: order
                .dst_safety_deposit
                .map_or(default.dst_safety_deposit, U256::from),
            receiver,
            timelocks,
        })
    }
}

impl From<Order> for file::Order {
    fn from(order: Order) -> Self {
        let t = order.timelocks;

        file::Order {
            making_amount: Some(order.making_amount.low_u64()),
            taking_amount: Some(order.taking_amount.low_u64()),
            src_safety_deposit: Some(order.src_safety_deposit.low_u64()),
            dst_safety_deposit: Some(order.dst_safety_deposit.low_u64()),
            receiver: Some(order.receiver.to_string()),
            timelocks: Some(file::TimeLocks {
                src_withdrawal: t.src_withdrawal.into(),
                src_public_withdrawal: t.src_public_withdrawal.into(),
                src_cancellation: t.src_cancellation.into(),
                src_public_cancellation: t.src_public_cancellation.into(),
                dst_withdrawal: t.dst_withdrawal.into(),
                dst_public_withdrawal: t.dst_public_withdrawal.into(),
                dst_cancellation: t.dst_cancellation.into(),
            }),
        }
    }
}

fn resolver_from_file(file: file::Resolver) -> resolver::Config {
    let default = resolver::Config::default();

    resolver::Config {
        confirmation_timeout: file
            .confirmation_timeout_secs
            .map_or(default.confirmation_timeout, Duration::from_secs),
        poll_interval: file
            .poll_interval_secs
            .map_or(default.poll_interval, Duration::from_secs),
        poll_attempts: file.poll_attempts.unwrap_or(default.poll_attempts),
        retries: file.retries.unwrap_or(default.retries),
    }
}

impl From<Settings> for File {
    fn from(settings: Settings) -> Self {
        let Settings {
            logging,
            resolver,
            chain,
            order,
        } = settings;

        File {
            logging: Some(file::Logging {
                level: Some(logging.level.into()),
            }),
            resolver: Some(file::Resolver {
                confirmation_timeout_secs: Some(resolver.confirmation_timeout.as_secs()),
                poll_interval_secs: Some(resolver.poll_interval.as_secs()),
                poll_attempts: Some(resolver.poll_attempts),
                retries: Some(resolver.retries),
            }),
            chain: Some(file::Chains {
                src: Some(chain.src.into()),
                dst: Some(chain.dst.into()),
            }),
            order: Some(order.into()),
        }
    }
}

impl Settings {
    pub fn from_config_file_and_defaults(config_file: File) -> Result<Self> {
        let File {
            logging,
            resolver,
            chain,
            order,
        } = config_file;

        let (src, dst) = match chain {
            None => (Chain::default_src(), Chain::default_dst()),
            Some(file::Chains { src, dst }) => (
                src.map_or_else(|| Ok(Chain::default_src()), Chain::from_file)
                    .context("invalid [chain.src] section")?,
                dst.map_or_else(|| Ok(Chain::default_dst()), Chain::from_file)
                    .context("invalid [chain.dst] section")?,
            ),
        };
        if src.kind() != AddressKind::Evm {
            anyhow::bail!("the source chain must be an EVM chain, got {}", src.kind());
        }
        if src.chain_id == dst.chain_id {
            anyhow::bail!("source and destination share chain id {}", src.chain_id);
        }

        Ok(Self {
            logging: {
                match logging {
                    None => Logging::default(),
                    Some(inner) => match inner {
                        file::Logging { level: None } => Logging::default(),
                        file::Logging { level: Some(level) } => Logging {
                            level: level.into(),
                        },
                    },
                }
            },
            resolver: resolver.map_or_else(resolver::Config::default, resolver_from_file),
            order: order.map_or_else(
                || Order::from_file(file::Order::default(), dst.kind()),
                |order| Order::from_file(order, dst.kind()),
            )?,
            chain: Chains { src, dst },
        })
    }
}

fn evm(address: &str) -> NativeAddress {
    NativeAddress::parse(AddressKind::Evm, address).expect("static string to be a valid address")
}

fn sui(address: &str) -> NativeAddress {
    NativeAddress::parse(AddressKind::Sui, address).expect("static string to be a valid address")
}

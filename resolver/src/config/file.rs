use config as config_rs;
use fusion::{address::AddressKind, ethereum::ChainId};
use serde::{Deserialize, Serialize};
use std::{ffi::OsStr, path::Path};
use tracing::level_filters::LevelFilter;

/// This struct aims to represent the configuration file as it appears on disk.
///
/// Most importantly, optional elements of the configuration file are
/// represented as `Option`s` here. This allows us to create a dedicated step
/// for filling in default values for absent configuration options.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct File {
    pub logging: Option<Logging>,
    pub resolver: Option<Resolver>,
    pub chain: Option<Chains>,
    pub order: Option<Order>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Resolver {
    pub confirmation_timeout_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub poll_attempts: Option<u32>,
    pub retries: Option<u32>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Chains {
    pub src: Option<Chain>,
    pub dst: Option<Chain>,
}

/// Addresses are kept in their textual form, `kind` decides how they parse.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Chain {
    pub chain_id: ChainId,
    pub kind: AddressKind,
    pub escrow_factory: String,
    pub resolver: String,
    pub token: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Order {
    pub making_amount: Option<u64>,
    pub taking_amount: Option<u64>,
    pub src_safety_deposit: Option<u64>,
    pub dst_safety_deposit: Option<u64>,
    /// Address on the destination chain receiving the taking amount.
    pub receiver: Option<String>,
    pub timelocks: Option<TimeLocks>,
}

/// Stage offsets in seconds from the deployment of the respective escrow.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TimeLocks {
    pub src_withdrawal: u32,
    pub src_public_withdrawal: u32,
    pub src_cancellation: u32,
    pub src_public_cancellation: u32,
    pub dst_withdrawal: u32,
    pub dst_public_withdrawal: u32,
    pub dst_cancellation: u32,
}

impl File {
    pub fn read<D>(config_file: D) -> Result<Self, config_rs::ConfigError>
    where
        D: AsRef<OsStr>,
    {
        let config_file = Path::new(&config_file);

        config_rs::Config::builder()
            .add_source(config_rs::File::from(config_file))
            .build()?
            .try_deserialize()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Logging {
    pub level: Option<Level>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LevelFilter> for Level {
    fn from(level: LevelFilter) -> Self {
        // Suppressing all logs is not supported, `OFF` maps to `Error`.
        if level >= LevelFilter::TRACE {
            Level::Trace
        } else if level >= LevelFilter::DEBUG {
            Level::Debug
        } else if level >= LevelFilter::INFO {
            Level::Info
        } else if level >= LevelFilter::WARN {
            Level::Warn
        } else {
            Level::Error
        }
    }
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> Self {
        match level {
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Info => LevelFilter::INFO,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[derive(serde::Deserialize, PartialEq, Debug)]
    struct LoggingOnlyConfig {
        logging: Logging,
    }

    #[test]
    fn deserialize_log_level() {
        let file_contents = r#"
            [logging]
            level = "Debug"
            "#;

        let config = toml::from_str::<LoggingOnlyConfig>(file_contents).unwrap();

        assert_eq!(config.logging, Logging {
            level: Some(Level::Debug)
        });
    }

    #[test]
    fn level_filter_round_trips_through_level() {
        for level in [
            Level::Error,
            Level::Warn,
            Level::Info,
            Level::Debug,
            Level::Trace,
        ] {
            assert_eq!(Level::from(LevelFilter::from(level)), level);
        }
        assert_eq!(Level::from(LevelFilter::OFF), Level::Error);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let file_contents = r#"
            [resolver]
            retries = 2
            gas_price = 20
            "#;

        let file = toml::from_str::<File>(file_contents);

        assert!(file.is_err());
    }

    #[test]
    fn chain_sections_are_read_from_disk() {
        let tmp_dir = TempDir::new().unwrap();
        let path = tmp_dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(
            br#"
            [chain.dst]
            chain_id = 56
            kind = "sui"
            escrow_factory = "0x1"
            resolver = "0x5f1e"
            token = "0x2"
            "#,
        )
        .unwrap();

        let file = File::read(&path).unwrap();

        let chains = file.chain.unwrap();
        assert_eq!(chains.src, None);
        assert_eq!(
            chains.dst,
            Some(Chain {
                chain_id: ChainId::BINANCE,
                kind: AddressKind::Sui,
                escrow_factory: "0x1".to_owned(),
                resolver: "0x5f1e".to_owned(),
                token: "0x2".to_owned(),
            })
        );
    }
}

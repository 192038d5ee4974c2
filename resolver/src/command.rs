use crate::config::{File, Settings};
use std::path::PathBuf;
use structopt::StructOpt;

mod simulate;

pub use simulate::simulate;

#[derive(StructOpt, Debug)]
pub struct Options {
    /// Path to configuration file
    #[structopt(short = "c", long = "config", parse(from_os_str))]
    pub config_file: Option<PathBuf>,

    /// Commands available
    #[structopt(subcommand)]
    pub cmd: Command,
}

impl Options {
    pub fn from_args() -> Self {
        StructOpt::from_args()
    }
}

#[derive(StructOpt, Debug, Clone, Copy)]
pub enum Command {
    /// Fill the configured order between two simulated chains
    Simulate,
    /// Dump the current configuration
    DumpConfig,
}

pub fn dump_config(settings: Settings) -> anyhow::Result<()> {
    let file = File::from(settings);
    let serialized = toml::to_string(&file)?;
    println!("{}", serialized);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let options = Options::from_iter(&["resolver", "-c", "/tmp/config.toml", "simulate"]);

        assert_eq!(options.config_file, Some(PathBuf::from("/tmp/config.toml")));
        assert!(matches!(options.cmd, Command::Simulate));

        let options = Options::from_iter(&["resolver", "dump-config"]);

        assert_eq!(options.config_file, None);
        assert!(matches!(options.cmd, Command::DumpConfig));
    }
}

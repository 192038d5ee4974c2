use anyhow::Context;
use std::path::{Path, PathBuf};

/// This is to store the configuration file
// Linux: /home/<user>/.config/resolver/
// OSX: /Users/<user>/Library/Preferences/resolver/
fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "resolver")
        .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    config_dir()
        .map(|dir| Path::join(&dir, "config.toml"))
        .context("Could not generate default configuration path")
}

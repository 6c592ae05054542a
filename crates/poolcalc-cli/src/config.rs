//! Settings: command line and environment over an optional TOML file.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_BROKER: &str = "ws://127.0.0.1:9000";

/// Keys accepted in the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub broker: Option<String>,
    pub name1: Option<String>,
    pub name2: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub broker: String,
    pub name1: Option<String>,
    pub name2: Option<String>,
    pub bell: bool,
}

impl Settings {
    pub fn resolve(broker: Option<String>, file: FileConfig, quiet: bool) -> Self {
        Self {
            broker: broker
                .or(file.broker)
                .unwrap_or_else(|| DEFAULT_BROKER.to_string()),
            name1: file.name1,
            name2: file.name2,
            bell: !quiet,
        }
    }
}

pub fn load_file(path: &Path) -> anyhow::Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    parse_file(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn parse_file(raw: &str) -> anyhow::Result<FileConfig> {
    Ok(toml::from_str(raw)?)
}

use std::{collections::HashMap, path::PathBuf, time::Duration};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

pub struct WreckConfig {
    pub compile_timeout: Option<Duration>,
    pub compile_program: Option<PathBuf>,
}

impl WreckConfig {
    pub fn load() -> anyhow::Result<Self> {
        let raw_config = RawConfig::load(None)?;

        Ok(Self {
            compile_timeout: raw_config.compile.timeout.map(Duration::from_secs),
            compile_program: raw_config.compile.program,
        })
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    compile: CompileConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CompileConfig {
    timeout: Option<u64>,
    program: Option<PathBuf>,
}

impl RawConfig {
    fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("WRECK")
                    .separator("_")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}

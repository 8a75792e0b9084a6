use serde::{Deserialize, Serialize};
use tessera_core::{Result, StoreConfig, TesseraError, UploaderConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub uploader: UploaderConfig,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(::config::Environment::with_prefix("TESSERA").separator("__"))
            .build()
            .map_err(|e| TesseraError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| TesseraError::Config(e.to_string()))?;

        config.uploader.validate()?;
        Ok(config)
    }
}

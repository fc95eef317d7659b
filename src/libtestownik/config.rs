use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::libtestownik::error::{Error, Result};

fn default_count() -> u32 {
    4
}

/// Endpoint settings for the distractor generator. Owned by the caller and
/// persisted as a small JSON file next to the executable.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub model: String,
    /// How many wrong answers to ask for per request.
    #[serde(default = "default_count")]
    pub count: u32,
}

impl Default for LlmConfig {
    fn default() -> LlmConfig {
        LlmConfig {
            url: String::new(),
            key: String::new(),
            model: String::new(),
            count: default_count(),
        }
    }
}

impl LlmConfig {
    /// A missing file is an empty config, matching a first run.
    pub fn load(path: &Path) -> Result<LlmConfig> {
        if !path.exists() {
            debug!("[Config] {:?} does not exist, starting empty.", path);
            return Ok(LlmConfig::default());
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// All three endpoint fields must be filled in before any network I/O.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::Config("url"));
        }
        if self.key.trim().is_empty() {
            return Err(Error::Config("key"));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config("model"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> LlmConfig {
        LlmConfig {
            url: "https://api.example.com/v1".into(),
            key: "sk-test".into(),
            model: "test-model".into(),
            count: 4,
        }
    }

    #[test]
    fn validate_names_the_first_missing_field() {
        let mut config = filled();
        config.url.clear();
        assert!(matches!(config.validate(), Err(Error::Config("url"))));

        let mut config = filled();
        config.key = "   ".into();
        assert!(matches!(config.validate(), Err(Error::Config("key"))));

        let mut config = filled();
        config.model.clear();
        assert!(matches!(config.validate(), Err(Error::Config("model"))));

        assert!(filled().validate().is_ok());
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let config: LlmConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.url, "");
        assert_eq!(config.count, 4);
    }

    #[test]
    fn load_of_a_missing_file_is_an_empty_config() {
        let path = std::env::temp_dir().join("testownik-no-such-config.json");
        let config = LlmConfig::load(&path).unwrap();
        assert!(config.validate().is_err());
    }
}

use std::{
    env,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{artifact::EncodeOptions, recommend::PrepareOptions};

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    data_dir: PathBuf,
    model_dir: PathBuf,
    model_file: String,
    max_features: NonZeroUsize,
    default_n: NonZeroUsize,
    artifact_compression: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数から推薦エンジンの設定値を読み込み、検証する。
    ///
    /// すべての値に既定値があり、未設定の変数は既定値で補う。
    ///
    /// # Errors
    /// 数値や真偽値のパースに失敗した場合、または `MODEL_FILE` が空の場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()));
        let model_dir =
            PathBuf::from(env::var("MODEL_DIR").unwrap_or_else(|_| "models".to_string()));
        let model_file = parse_file_name("MODEL_FILE", "recommender.bin")?;

        // TF-IDF / query settings
        let max_features = parse_non_zero_usize("RECOMMENDER_MAX_FEATURES", 5000)?;
        let default_n = parse_non_zero_usize("RECOMMENDER_DEFAULT_N", 5)?;

        let artifact_compression = parse_bool("RECOMMENDER_ARTIFACT_COMPRESSION", true)?;

        Ok(Self {
            data_dir,
            model_dir,
            model_file,
            max_features,
            default_n,
            artifact_compression,
        })
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    #[must_use]
    pub fn model_file(&self) -> &str {
        &self.model_file
    }

    /// アーティファクトの保存先（`MODEL_DIR/MODEL_FILE`）。
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_file)
    }

    #[must_use]
    pub fn max_features(&self) -> NonZeroUsize {
        self.max_features
    }

    #[must_use]
    pub fn default_n(&self) -> NonZeroUsize {
        self.default_n
    }

    #[must_use]
    pub fn artifact_compression(&self) -> bool {
        self.artifact_compression
    }

    #[must_use]
    pub fn prepare_options(&self) -> PrepareOptions {
        PrepareOptions {
            max_features: self.max_features.get(),
        }
    }

    #[must_use]
    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            compress: self.artifact_compression,
        }
    }
}

fn parse_file_name(name: &'static str, default: &str) -> Result<String, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("file name must not be empty"),
        });
    }
    Ok(trimmed.to_string())
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    NonZeroUsize::new(parsed).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("must be greater than zero"),
    })
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("invalid boolean value: {raw}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_env(name: &str, value: &str) {
        // SAFETY: tests run sequentially and assign valid UTF-8 values.
        unsafe {
            env::set_var(name, value);
        }
    }

    fn remove_env(name: &str) {
        // SAFETY: tests run sequentially and clean up deterministic keys.
        unsafe {
            env::remove_var(name);
        }
    }

    fn reset_env() {
        remove_env("DATA_DIR");
        remove_env("MODEL_DIR");
        remove_env("MODEL_FILE");
        remove_env("RECOMMENDER_MAX_FEATURES");
        remove_env("RECOMMENDER_DEFAULT_N");
        remove_env("RECOMMENDER_ARTIFACT_COMPRESSION");
    }

    #[test]
    fn from_env_uses_defaults_when_missing() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();

        let config = Config::from_env().expect("config should load");

        assert_eq!(config.data_dir(), Path::new("data"));
        assert_eq!(config.model_dir(), Path::new("models"));
        assert_eq!(config.model_file(), "recommender.bin");
        assert_eq!(config.model_path(), PathBuf::from("models/recommender.bin"));
        assert_eq!(config.max_features().get(), 5000);
        assert_eq!(config.default_n().get(), 5);
        assert!(config.artifact_compression());
        assert_eq!(config.prepare_options(), PrepareOptions::default());
        assert_eq!(config.encode_options(), EncodeOptions::default());
    }

    #[test]
    fn from_env_overrides_values() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_env("DATA_DIR", "/srv/g1/corpus");
        set_env("MODEL_DIR", "/srv/g1/models");
        set_env("MODEL_FILE", "snapshot-v1.bin");
        set_env("RECOMMENDER_MAX_FEATURES", "1200");
        set_env("RECOMMENDER_DEFAULT_N", "10");
        set_env("RECOMMENDER_ARTIFACT_COMPRESSION", "off");

        let config = Config::from_env().expect("config should load");

        assert_eq!(config.data_dir(), Path::new("/srv/g1/corpus"));
        assert_eq!(
            config.model_path(),
            PathBuf::from("/srv/g1/models/snapshot-v1.bin")
        );
        assert_eq!(config.prepare_options().max_features, 1200);
        assert_eq!(config.default_n().get(), 10);
        assert!(!config.encode_options().compress);
        reset_env();
    }

    #[test]
    fn from_env_rejects_zero_max_features() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_env("RECOMMENDER_MAX_FEATURES", "0");

        let error = Config::from_env().expect_err("zero should be rejected");

        assert!(matches!(
            error,
            ConfigError::Invalid {
                name: "RECOMMENDER_MAX_FEATURES",
                ..
            }
        ));
        reset_env();
    }

    #[test]
    fn from_env_rejects_invalid_values() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_env("RECOMMENDER_DEFAULT_N", "five");

        let error = Config::from_env().expect_err("non-numeric n should fail");
        assert!(matches!(
            error,
            ConfigError::Invalid {
                name: "RECOMMENDER_DEFAULT_N",
                ..
            }
        ));

        reset_env();
        set_env("RECOMMENDER_ARTIFACT_COMPRESSION", "maybe");
        let error = Config::from_env().expect_err("invalid bool should fail");
        assert!(matches!(
            error,
            ConfigError::Invalid {
                name: "RECOMMENDER_ARTIFACT_COMPRESSION",
                ..
            }
        ));

        reset_env();
        set_env("MODEL_FILE", "   ");
        let error = Config::from_env().expect_err("blank file name should fail");
        assert!(matches!(error, ConfigError::Invalid { name: "MODEL_FILE", .. }));
        reset_env();
    }
}

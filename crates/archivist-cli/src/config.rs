//! `archivist.toml` loading.
//!
//! Every field has a default, so a missing file or a partial one is fine.
//! `BOT_TOKEN` and `OWNER_ID` from the environment (or `.env`) override
//! the `[bot]` section.

use archivist_core::{
    ArchivistError, ArchivistResult, OwnerId, DEFAULT_MAX_PART_SIZE, DEFAULT_MAX_TOTAL_SIZE,
};
use archivist_pipeline::PipelineConfig;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ArchivistConfig {
    #[serde(default = "default_authorized_file")]
    pub authorized_file: PathBuf,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub owner_id: Option<i64>,
    /// Bot API server; point at a self-hosted one to lift the 20 MB
    /// download limit.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_max_total_size")]
    pub max_total_size: u64,
    #[serde(default = "default_max_part_size")]
    pub max_part_size: u64,
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

impl Default for ArchivistConfig {
    fn default() -> Self {
        Self {
            authorized_file: default_authorized_file(),
            bot: BotConfig::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            owner_id: None,
            api_base: default_api_base(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_total_size: default_max_total_size(),
            max_part_size: default_max_part_size(),
            staging_dir: default_staging_dir(),
            idle_timeout_secs: default_idle_timeout_secs(),
            reap_interval_secs: default_reap_interval_secs(),
        }
    }
}

fn default_authorized_file() -> PathBuf {
    PathBuf::from("authorized.txt")
}
fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}
fn default_max_total_size() -> u64 {
    DEFAULT_MAX_TOTAL_SIZE
}
fn default_max_part_size() -> u64 {
    DEFAULT_MAX_PART_SIZE
}
fn default_staging_dir() -> PathBuf {
    PathBuf::from("./staging")
}
fn default_idle_timeout_secs() -> u64 {
    3600
}
fn default_reap_interval_secs() -> u64 {
    60
}

impl ArchivistConfig {
    pub fn from_toml(text: &str) -> ArchivistResult<Self> {
        toml::from_str(text).map_err(|e| ArchivistError::Config(e.to_string()))
    }

    /// Reads `path`, falling back to defaults when it does not exist.
    pub async fn load(path: &Path) -> ArchivistResult<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ArchivistError::Config(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))),
        }
    }

    /// Applies `BOT_TOKEN` / `OWNER_ID` overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ArchivistResult<()> {
        if let Some(token) = lookup("BOT_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.bot.token = token.trim().to_string();
        }
        if let Some(owner) = lookup("OWNER_ID") {
            let owner: OwnerId = owner
                .parse()
                .map_err(|_| ArchivistError::Config(format!("OWNER_ID is not an integer: {owner}")))?;
            self.bot.owner_id = Some(owner.0);
        }
        Ok(())
    }

    pub fn owner(&self) -> ArchivistResult<OwnerId> {
        self.bot
            .owner_id
            .map(OwnerId)
            .ok_or_else(|| ArchivistError::Config("bot.owner_id (or OWNER_ID) is required".into()))
    }

    pub fn token(&self) -> ArchivistResult<&str> {
        if self.bot.token.is_empty() {
            return Err(ArchivistError::Config(
                "bot.token (or BOT_TOKEN) is required".into(),
            ));
        }
        Ok(&self.bot.token)
    }

    pub fn pipeline_config(&self) -> ArchivistResult<PipelineConfig> {
        if self.archive.max_part_size == 0 {
            return Err(ArchivistError::Config(
                "archive.max_part_size must be positive".into(),
            ));
        }
        Ok(PipelineConfig {
            max_total_size: self.archive.max_total_size,
            max_part_size: self.archive.max_part_size,
            staging_root: self.archive.staging_dir.clone(),
            idle_timeout: Duration::from_secs(self.archive.idle_timeout_secs),
        })
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.archive.reap_interval_secs.max(1))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ArchivistConfig::from_toml("").unwrap();
        assert_eq!(config.authorized_file, PathBuf::from("authorized.txt"));
        assert_eq!(config.archive.max_total_size, 20 * 1024 * 1024 * 1024);
        assert_eq!(config.archive.max_part_size, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.bot.api_base, "https://api.telegram.org");
        assert!(config.owner().is_err());
        assert!(config.token().is_err());
    }

    #[test]
    fn test_partial_file() {
        let config = ArchivistConfig::from_toml(
            r#"
            [bot]
            token = "123:abc"
            owner_id = 99

            [archive]
            max_part_size = 1048576
            staging_dir = "/tmp/zips"
            "#,
        )
        .unwrap();
        assert_eq!(config.token().unwrap(), "123:abc");
        assert_eq!(config.owner().unwrap(), OwnerId(99));

        let pipeline = config.pipeline_config().unwrap();
        assert_eq!(pipeline.max_part_size, 1_048_576);
        assert_eq!(pipeline.max_total_size, DEFAULT_MAX_TOTAL_SIZE);
        assert_eq!(pipeline.staging_root, PathBuf::from("/tmp/zips"));
        assert_eq!(pipeline.idle_timeout, Duration::from_secs(3600));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ArchivistConfig::from_toml("[bot]\ntoken = \"file\"\nowner_id = 1").unwrap();
        config
            .apply_env(|key| match key {
                "BOT_TOKEN" => Some("env-token".into()),
                "OWNER_ID" => Some(" 42 ".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.token().unwrap(), "env-token");
        assert_eq!(config.owner().unwrap(), OwnerId(42));

        let err = config
            .apply_env(|key| (key == "OWNER_ID").then(|| "abc".to_string()))
            .unwrap_err();
        assert!(matches!(err, ArchivistError::Config(_)));
    }

    #[test]
    fn test_zero_part_size_rejected() {
        let config = ArchivistConfig::from_toml("[archive]\nmax_part_size = 0").unwrap();
        assert!(config.pipeline_config().is_err());
    }

    #[test]
    fn test_malformed_toml() {
        assert!(ArchivistConfig::from_toml("[archive\n").is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_default() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ArchivistConfig::load(&tmp.path().join("nope.toml"))
            .await
            .unwrap();
        assert_eq!(config.archive.reap_interval_secs, 60);
    }
}

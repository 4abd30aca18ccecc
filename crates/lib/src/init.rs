//! `poast init`: write a template config file with the six credential fields left blank.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;

fn template() -> Config {
    let blank = || Some(String::new());
    Config {
        slack_app_token: blank(),
        slack_bot_token: blank(),
        twitter_consumer_key: blank(),
        twitter_consumer_secret: blank(),
        twitter_access_token: blank(),
        twitter_access_secret: blank(),
        ..Config::default()
    }
}

/// Create the config file (and its parent directory) if it does not exist.
/// Returns `true` when a new file was written, `false` when one was already there.
pub fn init_config_file(config_path: &Path) -> Result<bool> {
    if config_path.exists() {
        log::debug!("config already exists at {}, skipping", config_path.display());
        return Ok(false);
    }
    if let Some(dir) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating config directory {}", dir.display()))?;
    }
    let body = serde_json::to_string_pretty(&template()).context("serializing config template")?;
    std::fs::write(config_path, body + "\n")
        .with_context(|| format!("writing config template to {}", config_path.display()))?;
    log::info!("created config template at {}", config_path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, ConfigError};

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("poast-init-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    #[test]
    fn writes_template_with_blank_credentials() {
        let dir = scratch_dir("template");
        let path = dir.join("nested").join("config.json");

        assert!(init_config_file(&path).expect("init"));
        let (config, used) = load_config(Some(path.clone())).expect("load");
        assert_eq!(used, path);
        assert_eq!(config.slack_app_token.as_deref(), Some(""));
        assert!(config.slack_api_url.is_none());
        assert!(matches!(
            config.credentials_with(&|_: &str| None::<String>),
            Err(ConfigError::Missing(_))
        ));

        let raw = std::fs::read_to_string(&path).expect("read");
        assert!(raw.contains("\"twitter_access_secret\": \"\""));
        assert!(!raw.contains("reconnect_delay_secs"));

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn existing_file_is_left_alone() {
        let dir = scratch_dir("existing");
        let path = dir.join("config.json");
        std::fs::write(&path, "{\"slack_app_token\":\"xapp-keep\"}").expect("seed");

        assert!(!init_config_file(&path).expect("init"));
        let raw = std::fs::read_to_string(&path).expect("read");
        assert_eq!(raw, "{\"slack_app_token\":\"xapp-keep\"}");

        std::fs::remove_dir_all(dir).ok();
    }
}

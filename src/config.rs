use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::wordpress::SITE_HOST;

const DEFAULT_ENV_PREFIX: &str = "BLOG_TUI";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_http_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout: default_http_timeout(),
        }
    }
}

fn default_user_agent() -> String {
    format!("blog-tui/{}", crate::VERSION)
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaConfig {
    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub probe_timeout: Duration,
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            probe_timeout: default_probe_timeout(),
            allowed_hosts: default_allowed_hosts(),
        }
    }
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_allowed_hosts() -> Vec<String> {
    vec![SITE_HOST.to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_file() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("blog-tui").join("blog-tui.log"))
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = merge_config(cfg, load_env(prefix));

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Values in `other` that differ from the defaults win.
fn merge_config(mut base: Config, other: Config) -> Config {
    let defaults = Config::default();

    if !other.http.user_agent.trim().is_empty() && other.http.user_agent != defaults.http.user_agent
    {
        base.http.user_agent = other.http.user_agent;
    }
    if other.http.timeout != defaults.http.timeout && !other.http.timeout.is_zero() {
        base.http.timeout = other.http.timeout;
    }

    if other.media.probe_timeout != defaults.media.probe_timeout
        && !other.media.probe_timeout.is_zero()
    {
        base.media.probe_timeout = other.media.probe_timeout;
    }
    if other.media.allowed_hosts != defaults.media.allowed_hosts {
        base.media.allowed_hosts = other.media.allowed_hosts;
    }

    if !other.log.level.trim().is_empty() && other.log.level != defaults.log.level {
        base.log.level = other.log.level;
    }
    if other.log.file.is_some() && other.log.file != defaults.log.file {
        base.log.file = other.log.file;
    }

    base
}

fn load_env(prefix: &str) -> Config {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    let mut cfg = Config::default();
    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }
    cfg
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "http.user_agent" => cfg.http.user_agent = value,
        "http.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.http.timeout = duration;
            }
        }
        "media.probe_timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.media.probe_timeout = duration;
            }
        }
        "media.allowed_hosts" => {
            cfg.media.allowed_hosts = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "log.level" => cfg.log.level = value,
        "log.file" => cfg.log.file = Some(PathBuf::from(value)),
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("blog-tui").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    fn isolated(dir: &Path, prefix: &str) -> LoadOptions {
        LoadOptions {
            config_file: Some(dir.join("absent.yaml")),
            env_prefix: Some(prefix.to_string()),
        }
    }

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(isolated(dir.path(), "BLOG_TUI_TEST_DEFAULTS")).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.media.allowed_hosts, vec![SITE_HOST.to_string()]);
        assert_eq!(cfg.http.timeout, Duration::from_secs(20));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "http:\n  timeout: 5s\nmedia:\n  probe_timeout: 2s\nlog:\n  level: debug\n",
        )
        .unwrap();

        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("BLOG_TUI_TEST_FILE".into()),
        })
        .unwrap();

        assert_eq!(cfg.http.timeout, Duration::from_secs(5));
        assert_eq!(cfg.media.probe_timeout, Duration::from_secs(2));
        assert_eq!(cfg.log.level, "debug");
        assert_eq!(cfg.http.user_agent, default_user_agent());
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "http: 42\n").unwrap();

        let err = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("BLOG_TUI_TEST_INVALID".into()),
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config file"));
    }

    #[test]
    fn env_overrides() {
        let dir = tempdir().unwrap();
        env::set_var("BLOG_TUI_TEST_ENV_HTTP__TIMEOUT", "3s");
        env::set_var("BLOG_TUI_TEST_ENV_MEDIA__ALLOWED_HOSTS", "a.example, b.example");
        let cfg = load(isolated(dir.path(), "BLOG_TUI_TEST_ENV")).unwrap();
        env::remove_var("BLOG_TUI_TEST_ENV_HTTP__TIMEOUT");
        env::remove_var("BLOG_TUI_TEST_ENV_MEDIA__ALLOWED_HOSTS");

        assert_eq!(cfg.http.timeout, Duration::from_secs(3));
        assert_eq!(
            cfg.media.allowed_hosts,
            vec!["a.example".to_string(), "b.example".to_string()]
        );
    }
}

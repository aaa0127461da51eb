use color_eyre::{eyre::eyre, Result};
use pnv::bridge::BridgeSettings;
use pnv::lifecycle::DEFAULT_DESCRIPTOR_PATH;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Site origin, e.g. https://peranaivai.com
  pub origin: Option<String>,
  #[serde(default = "default_descriptor_path")]
  pub descriptor_path: String,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub pwa: PwaConfig,
}

fn default_descriptor_path() -> String {
  DEFAULT_DESCRIPTOR_PATH.to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// Cache database location (defaults to the data directory)
  pub path: Option<PathBuf>,
  /// Keep everything in memory; nothing survives a restart
  #[serde(default)]
  pub ephemeral: bool,
}

/// Bridge flags; delays are in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PwaConfig {
  pub show_install_prompt: bool,
  pub install_prompt_delay: u64,
  pub show_update_notification: bool,
  /// 0 disables auto-apply
  pub auto_update_delay: u64,
  pub enable_offline_indicator: bool,
  pub update_interval: u64,
  /// Treat the app as already installed
  pub standalone: bool,
}

impl Default for PwaConfig {
  fn default() -> Self {
    let defaults = BridgeSettings::default();
    Self {
      show_install_prompt: defaults.show_install_prompt,
      install_prompt_delay: defaults.install_prompt_delay.as_secs(),
      show_update_notification: defaults.show_update_notification,
      auto_update_delay: defaults.auto_update_delay.as_secs(),
      enable_offline_indicator: defaults.enable_offline_indicator,
      update_interval: defaults.update_interval.as_secs(),
      standalone: false,
    }
  }
}

impl PwaConfig {
  pub fn bridge_settings(&self) -> BridgeSettings {
    BridgeSettings {
      show_install_prompt: self.show_install_prompt,
      install_prompt_delay: Duration::from_secs(self.install_prompt_delay),
      show_update_notification: self.show_update_notification,
      auto_update_delay: Duration::from_secs(self.auto_update_delay),
      enable_offline_indicator: self.enable_offline_indicator,
      update_interval: Duration::from_secs(self.update_interval.max(1)),
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: None,
      descriptor_path: default_descriptor_path(),
      cache: CacheConfig::default(),
      pwa: PwaConfig::default(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./pnv.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/pnv/config.yaml
  ///
  /// With no file found the defaults are used when `origin_given` is set.
  pub fn load(explicit_path: Option<&Path>, origin_given: bool) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None if origin_given => Ok(Self::default()),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/pnv/config.yaml\n\
                 or pass the site with --origin."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("pnv.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("pnv").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  /// The configured origin, validated.
  pub fn origin_url(&self) -> Result<Url> {
    let raw = self
      .origin
      .as_deref()
      .ok_or_else(|| eyre!("No origin configured. Set `origin` in the config or pass --origin."))?;
    let url = Url::parse(raw).map_err(|e| eyre!("Invalid origin {}: {}", raw, e))?;
    if !matches!(url.scheme(), "http" | "https") {
      return Err(eyre!("Origin must be http or https: {}", raw));
    }
    Ok(url)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config() {
    let config = Config::parse("origin: https://peranaivai.com\n").unwrap();
    assert_eq!(config.descriptor_path, "/pnv-manifest.json");
    assert!(!config.cache.ephemeral);
    assert_eq!(config.pwa.bridge_settings(), BridgeSettings::default());
    assert_eq!(
      config.origin_url().unwrap().as_str(),
      "https://peranaivai.com/"
    );
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
origin: http://localhost:5173
descriptor_path: /manifest.json
cache:
  path: /tmp/pnv/cache.db
  ephemeral: true
pwa:
  show_install_prompt: false
  auto_update_delay: 0
  update_interval: 300
"#;
    let config = Config::parse(yaml).unwrap();
    assert_eq!(config.descriptor_path, "/manifest.json");
    assert_eq!(config.cache.path, Some(PathBuf::from("/tmp/pnv/cache.db")));
    assert!(config.cache.ephemeral);

    let settings = config.pwa.bridge_settings();
    assert!(!settings.show_install_prompt);
    assert!(settings.show_update_notification);
    assert_eq!(settings.auto_update_delay, Duration::ZERO);
    assert_eq!(settings.update_interval, Duration::from_secs(300));
    assert_eq!(settings.install_prompt_delay, Duration::from_secs(30));
  }

  #[test]
  fn test_origin_must_be_http() {
    let config = Config::parse("origin: ftp://peranaivai.com\n").unwrap();
    assert!(config.origin_url().is_err());
    assert!(Config::default().origin_url().is_err());
  }

  #[test]
  fn test_explicit_missing_file_is_error() {
    let missing = Path::new("/nonexistent/pnv.yaml");
    assert!(Config::load(Some(missing), true).is_err());
  }
}

//! Configuration management for postveil.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::dispatcher::TimelineRoute;
use crate::dom::Selector;
use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "postveil";

/// Default rule document file name.
const DOCUMENT_FILE_NAME: &str = "rules.json";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `POSTVEIL_`)
/// 2. TOML config file at `~/.config/postveil/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rule store configuration.
    pub store: StoreConfig,
    /// Matching and treatment configuration.
    pub engine: EngineConfig,
    /// Route configuration.
    pub routes: RoutesConfig,
}

/// Rule-store configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the persisted rule document.
    /// Defaults to `~/.local/share/postveil/rules.json`
    pub document_path: Option<PathBuf>,
}

/// Matching and treatment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `data-testid` value marking post body text nodes.
    pub body_text_marker: String,
    /// `data-testid` value marking the post author handle node.
    pub author_handle_marker: String,
    /// Prefix of the label shown on reveal overlays.
    pub overlay_label_prefix: String,
}

/// Route configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Timeline routes and their container labels.
    pub timelines: Vec<TimelineRoute>,
    /// URL path of the settings page that receives the entry point.
    pub settings_path: String,
    /// `aria-label` of the settings section the entry point lands in.
    pub settings_section_label: String,
    /// How long to wait for the settings section to render, in milliseconds.
    pub settings_wait_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            body_text_marker: "post-text".to_string(),
            author_handle_marker: "author-handle".to_string(),
            overlay_label_prefix: "Hidden by".to_string(),
        }
    }
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            timelines: vec![TimelineRoute {
                paths: vec!["/home".to_string()],
                container_label: "Home Timeline".to_string(),
                deep: false,
            }],
            settings_path: "/settings/muted_phrases".to_string(),
            settings_section_label: "Section details".to_string(),
            settings_wait_ms: 10_000,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `POSTVEIL_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("POSTVEIL_").split("_"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.engine.body_text_marker.is_empty() {
            return Err(Error::ConfigValidation {
                message: "body_text_marker must not be empty".to_string(),
            });
        }
        if self.engine.author_handle_marker.is_empty() {
            return Err(Error::ConfigValidation {
                message: "author_handle_marker must not be empty".to_string(),
            });
        }
        if self.routes.settings_wait_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "settings_wait_ms must be greater than 0".to_string(),
            });
        }
        for route in &self.routes.timelines {
            if route.paths.is_empty() {
                return Err(Error::ConfigValidation {
                    message: "timeline route has no paths".to_string(),
                });
            }
            if route.container_label.is_empty() {
                return Err(Error::ConfigValidation {
                    message: "timeline route has an empty container_label".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Get the rule document path, resolving defaults if not set.
    #[must_use]
    pub fn document_path(&self) -> PathBuf {
        self.store
            .document_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DOCUMENT_FILE_NAME))
    }

    /// Selector for the settings section that receives the entry point.
    #[must_use]
    pub fn settings_section_selector(&self) -> Selector {
        Selector::tag("section").attr("aria-label", &self.routes.settings_section_label)
    }

    /// How long to wait for the settings section to render.
    #[must_use]
    pub fn settings_wait(&self) -> Duration {
        Duration::from_millis(self.routes.settings_wait_ms)
    }
}

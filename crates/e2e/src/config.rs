//! Runner configuration
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `PAGECHECK_*` environment variables, then CLI flags (applied by the
//! binary). A relative `specs_dir` read from a file is taken relative to that
//! file's directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::{ParseError, Url};

use crate::driver::DriverKind;
use crate::error::{E2eError, E2eResult};
use crate::http::HttpConfig;
use crate::playwright::{Browser, PlaywrightConfig};

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "pagecheck.toml";

/// Top-level configuration for a test run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eConfig {
    /// Which page driver to run specs against
    pub driver: DriverKind,

    /// Base URL that relative `navigate` targets are resolved against
    pub base_url: Option<String>,

    /// Directory holding YAML test specs
    pub specs_dir: PathBuf,

    /// Output directory for results
    pub output_dir: PathBuf,

    /// Upper bound for a single navigation
    pub navigation_timeout_ms: u64,

    /// Upper bound for one attempt of a whole test
    pub test_timeout_ms: u64,

    /// Extra attempts for a failing test
    pub retries: u32,

    pub playwright: PlaywrightConfig,

    pub http: HttpConfig,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Playwright,
            base_url: None,
            specs_dir: PathBuf::from("specs"),
            output_dir: PathBuf::from("test-results"),
            navigation_timeout_ms: 30_000,
            test_timeout_ms: 30_000,
            retries: 0,
            playwright: PlaywrightConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl E2eConfig {
    /// Load configuration from file, falling back to defaults when it is missing
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load configuration from a file that must exist
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        if !path.is_file() {
            return Err(E2eError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;

        if config.specs_dir.is_relative() {
            if let Some(base) = path.parent() {
                config.specs_dir = base.join(&config.specs_dir);
            }
        }
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> E2eResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PAGECHECK_*` overrides from the process environment
    pub fn with_env_overrides(mut self) -> E2eResult<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(self)
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> E2eResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(driver) = lookup("PAGECHECK_DRIVER") {
            self.driver = driver.parse()?;
        }
        if let Some(browser) = lookup("PAGECHECK_BROWSER") {
            self.playwright.browser = browser.parse::<Browser>()?;
        }
        if let Some(headless) = lookup("PAGECHECK_HEADLESS") {
            self.playwright.headless = parse_bool(&headless).ok_or_else(|| {
                E2eError::Config(format!("PAGECHECK_HEADLESS must be a boolean, got {:?}", headless))
            })?;
        }
        if let Some(base_url) = lookup("PAGECHECK_BASE_URL") {
            self.base_url = Some(base_url).filter(|u| !u.is_empty());
        }
        self.validate()
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> E2eResult<()> {
        if self.navigation_timeout_ms == 0 {
            return Err(E2eError::Config("navigation_timeout_ms must be positive".into()));
        }
        if self.test_timeout_ms == 0 {
            return Err(E2eError::Config("test_timeout_ms must be positive".into()));
        }
        if let Some(base) = &self.base_url {
            Url::parse(base)
                .map_err(|e| E2eError::Config(format!("invalid base_url {:?}: {}", base, e)))?;
        }
        Ok(())
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_millis(self.test_timeout_ms)
    }

    /// Resolve a `navigate` target against `base_url`
    ///
    /// Absolute URLs are returned unchanged. Relative ones need a base.
    pub fn resolve_url(&self, url: &str) -> E2eResult<String> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute.to_string()),
            Err(ParseError::RelativeUrlWithoutBase) => {
                let base = self.base_url.as_deref().ok_or_else(|| {
                    E2eError::Config(format!("relative url {:?} requires base_url", url))
                })?;
                let base = Url::parse(base)
                    .map_err(|e| E2eError::Config(format!("invalid base_url {:?}: {}", base, e)))?;
                base.join(url)
                    .map(|u| u.to_string())
                    .map_err(|e| E2eError::Config(format!("cannot join {:?} onto base: {}", url, e)))
            }
            Err(e) => Err(E2eError::Config(format!("invalid url {:?}: {}", url, e))),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

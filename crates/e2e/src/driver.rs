//! Page driver abstraction
//!
//! A `PageDriver` is the minimal browser capability a test needs: load a URL
//! and read back the document title.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::E2eConfig;
use crate::error::{E2eError, E2eResult};
use crate::http::HttpDriver;
use crate::playwright::PlaywrightDriver;

#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Short identifier used in logs and reports
    fn name(&self) -> &str;

    /// Load `url` into the page. Fails with `E2eError::Navigation` when the
    /// page cannot be reached.
    async fn navigate(&self, url: &str) -> E2eResult<()>;

    /// Current document title. Empty before the first navigation.
    async fn title(&self) -> E2eResult<String>;

    /// Release the underlying browser. Safe to call more than once.
    async fn close(&self) -> E2eResult<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// Real browser through Playwright
    #[default]
    Playwright,
    /// Plain HTTP fetch with `<title>` extraction
    Http,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Playwright => "playwright",
            DriverKind::Http => "http",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "playwright" => Ok(DriverKind::Playwright),
            "http" => Ok(DriverKind::Http),
            other => Err(E2eError::Config(format!("unknown driver: {}", other))),
        }
    }
}

/// Open the driver selected by `config`
pub async fn open_driver(config: &E2eConfig) -> E2eResult<Box<dyn PageDriver>> {
    match config.driver {
        DriverKind::Playwright => {
            let driver = PlaywrightDriver::launch(
                config.playwright.clone(),
                config.navigation_timeout(),
            )
            .await?;
            Ok(Box::new(driver))
        }
        DriverKind::Http => {
            let driver = HttpDriver::new(&config.http, config.navigation_timeout())?;
            Ok(Box::new(driver))
        }
    }
}

//! Declarative YAML test specification

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{E2eError, E2eResult};

/// A complete test specification parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique name for this test
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering tests
    #[serde(default)]
    pub tags: Vec<String>,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,
}

/// A single step in a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Load a URL, absolute or relative to the configured base
    Navigate {
        url: String,
    },

    /// Compare the current document title
    ExpectTitle {
        title: String,
        #[serde(default)]
        mode: TitleMatch,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

impl TestStep {
    /// Short label used in logs and reports
    pub fn name(&self) -> String {
        match self {
            TestStep::Navigate { url } => format!("navigate:{}", url),
            TestStep::ExpectTitle { title, mode } => format!("expect_title({}):{}", mode.as_str(), title),
            TestStep::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleMatch {
    #[default]
    Exact,
    Contains,
    Regex,
}

impl TitleMatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            TitleMatch::Exact => "exact",
            TitleMatch::Contains => "contains",
            TitleMatch::Regex => "regex",
        }
    }

    /// Whether `actual` satisfies `expected` under this mode
    pub fn matches(&self, expected: &str, actual: &str) -> E2eResult<bool> {
        Ok(match self {
            TitleMatch::Exact => actual == expected,
            TitleMatch::Contains => actual.contains(expected),
            TitleMatch::Regex => Regex::new(expected)?.is_match(actual),
        })
    }
}

impl TestSpec {
    /// Parse a test spec from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a test spec from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all test specs from a directory, ordered by path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        if !dir.is_dir() {
            let shown = std::env::current_dir()
                .map(|cwd| cwd.join(dir))
                .unwrap_or_else(|_| dir.to_path_buf());
            return Err(E2eError::SpecParse(format!(
                "specs directory not found: {}",
                shown.display()
            )));
        }

        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let spec = Self::from_file(entry.path())?;
            specs.push(spec);
        }

        Ok(specs)
    }

    /// Filter specs by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    /// Reject specs that could never pass meaningfully
    pub fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SpecParse("test name must not be empty".into()));
        }
        if self.steps.is_empty() {
            return Err(E2eError::SpecParse(format!("{}: no steps", self.name)));
        }

        let mut navigated = false;
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                TestStep::Navigate { .. } => navigated = true,
                TestStep::ExpectTitle { title, mode } => {
                    if !navigated {
                        return Err(E2eError::SpecParse(format!(
                            "{}: step {} checks the title before any navigation",
                            self.name,
                            i + 1
                        )));
                    }
                    if *mode == TitleMatch::Regex {
                        Regex::new(title).map_err(|e| {
                            E2eError::SpecParse(format!(
                                "{}: step {} has an invalid pattern: {}",
                                self.name,
                                i + 1,
                                e
                            ))
                        })?;
                    }
                }
                TestStep::Log { .. } => {}
            }
        }

        Ok(())
    }
}

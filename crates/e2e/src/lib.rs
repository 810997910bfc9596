//! pagecheck E2E Test Framework
//!
//! This crate provides a Rust-controlled browser smoke-test framework that:
//! - Controls Playwright through a long-lived Node bridge process
//! - Falls back to a plain HTTP driver when no browser is needed
//! - Parses declarative YAML test specs
//! - Writes a JSON report of every run
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── open_driver(config) -> Box<dyn PageDriver>           │
//! │    ├── run_spec(spec: TestSpec) -> TestResult               │
//! │    └── write_results(suite) -> test-results.json            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PageDriver                                                 │
//! │    ├── PlaywrightDriver  (node bridge, JSON lines)          │
//! │    └── HttpDriver        (reqwest + <title> extraction)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestSpec (YAML)                                            │
//! │    ├── name, description, tags                              │
//! │    └── steps: [Step]                                        │
//! │          ├── navigate { url }                               │
//! │          ├── expect_title { title, mode? }                  │
//! │          └── log { message }                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod http;
pub mod playwright;
pub mod runner;
pub mod spec;

pub use config::E2eConfig;
pub use driver::{open_driver, DriverKind, PageDriver};
pub use error::{E2eError, E2eResult};
pub use runner::{TestResult, TestRunner, TestSuiteResult};
pub use spec::{TestSpec, TestStep, TitleMatch};

/// Page the shipped smoke test opens
pub const EXAMPLE_URL: &str = "https://example.com";

/// Title that page is expected to carry
pub const EXAMPLE_TITLE: &str = "Example Domain";

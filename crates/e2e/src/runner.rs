//! Main test runner that orchestrates page drivers and collects results

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::E2eConfig;
use crate::driver::{open_driver, PageDriver};
use crate::error::{E2eError, E2eResult};
use crate::spec::{TestSpec, TestStep};

/// Result of executing a test step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
    /// Value read from the page, e.g. the title an expectation saw
    pub observed: Option<String>,
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub attempts: u32,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
}

/// Result of running all tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub started_at: String,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    /// Wrap a single test result as a suite
    pub fn from_single(result: TestResult) -> Self {
        let started_at = chrono::Utc::now().to_rfc3339();
        Self {
            total: 1,
            passed: usize::from(result.success),
            failed: usize::from(!result.success),
            skipped: 0,
            duration_ms: result.duration_ms,
            started_at,
            results: vec![result],
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Main E2E test runner
pub struct TestRunner {
    config: E2eConfig,
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRunner {
    /// Create a new test runner with default configuration
    pub fn new() -> Self {
        Self::with_config(E2eConfig::default())
    }

    /// Create a test runner with custom configuration
    pub fn with_config(config: E2eConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &E2eConfig {
        &self.config
    }

    /// Run all tests in the specs directory
    pub async fn run_all(&self) -> E2eResult<TestSuiteResult> {
        info!("Loading specs from {}", self.config.specs_dir.display());
        let specs = TestSpec::load_all(&self.config.specs_dir)?;
        self.run_specs(&specs).await
    }

    /// Run tests matching a tag; the rest count as skipped
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.config.specs_dir)?;
        let (selected, rest): (Vec<TestSpec>, Vec<TestSpec>) = specs
            .into_iter()
            .partition(|s| s.tags.iter().any(|t| t == tag));

        let mut results = self.run_specs(&selected).await?;
        results.skipped = rest.len();
        results.total += rest.len();
        Ok(results)
    }

    /// Run a specific test by name
    pub async fn run_test(&self, name: &str) -> E2eResult<TestResult> {
        let specs = TestSpec::load_all(&self.config.specs_dir)?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Test not found: {}", name)))?;

        self.run_spec(&spec).await
    }

    /// Run a list of test specs
    pub async fn run_specs(&self, specs: &[TestSpec]) -> E2eResult<TestSuiteResult> {
        let started_at = chrono::Utc::now().to_rfc3339();
        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;

        info!("Running {} test(s) with the {} driver...", specs.len(), self.config.driver);

        for spec in specs {
            let result = self.run_spec(spec).await?;
            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Test Results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        Ok(TestSuiteResult {
            total: specs.len(),
            passed,
            failed,
            skipped: 0,
            duration_ms,
            started_at,
            results,
        })
    }

    /// Run a single test spec against freshly opened drivers
    pub async fn run_spec(&self, spec: &TestSpec) -> E2eResult<TestResult> {
        self.run_spec_using(spec, || open_driver(&self.config)).await
    }

    /// Run a spec with retries, opening a new driver for every attempt
    ///
    /// Failing to open a driver is a harness error and is returned as `Err`.
    /// Step failures and timeouts end up in the returned `TestResult`.
    pub async fn run_spec_using<F, Fut>(&self, spec: &TestSpec, open: F) -> E2eResult<TestResult>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = E2eResult<Box<dyn PageDriver>>>,
    {
        let start = Instant::now();
        let max_attempts = self.config.retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("Running test: {} (attempt {}/{})", spec.name, attempt, max_attempts);

            let driver = open().await?;
            let attempt_start = Instant::now();
            let mut steps = Vec::new();
            let outcome = tokio::time::timeout(
                self.config.test_timeout(),
                self.run_steps(driver.as_ref(), spec, &mut steps),
            )
            .await;

            if let Err(e) = driver.close().await {
                warn!("Failed to close {} driver: {}", driver.name(), e);
            }

            let test_error = match outcome {
                Ok(test_error) => test_error,
                Err(_) => {
                    let error = E2eError::Timeout(format!(
                        "test '{}' exceeded {} ms",
                        spec.name, self.config.test_timeout_ms
                    ))
                    .to_string();
                    // The step that was running when the deadline hit
                    if let Some(step) = spec.steps.get(steps.len()) {
                        let finished_ms: u64 = steps.iter().map(|s| s.duration_ms).sum();
                        steps.push(StepResult {
                            success: false,
                            step_name: step.name(),
                            duration_ms: (attempt_start.elapsed().as_millis() as u64)
                                .saturating_sub(finished_ms),
                            error: Some(error.clone()),
                            observed: None,
                        });
                    }
                    Some(error)
                }
            };

            let mut result = TestResult {
                name: spec.name.clone(),
                success: test_error.is_none(),
                attempts: attempt,
                duration_ms: 0,
                steps,
                error: test_error,
            };

            if result.success || attempt >= max_attempts {
                result.attempts = attempt;
                result.duration_ms = start.elapsed().as_millis() as u64;
                return Ok(result);
            }

            warn!(
                "{} failed on attempt {}/{}: {}; retrying",
                spec.name,
                attempt,
                max_attempts,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    /// Run one attempt of `spec` on an already open driver
    pub async fn run_spec_with(&self, driver: &dyn PageDriver, spec: &TestSpec) -> TestResult {
        let start = Instant::now();
        let mut steps = Vec::new();
        let test_error = self.run_steps(driver, spec, &mut steps).await;

        TestResult {
            name: spec.name.clone(),
            success: test_error.is_none(),
            attempts: 1,
            duration_ms: start.elapsed().as_millis() as u64,
            steps,
            error: test_error,
        }
    }

    /// Execute steps in order, recording each as it finishes
    ///
    /// Stops at the first failing step and returns its error. Results land in
    /// `steps` as they complete, so they survive the future being cancelled.
    async fn run_steps(
        &self,
        driver: &dyn PageDriver,
        spec: &TestSpec,
        steps: &mut Vec<StepResult>,
    ) -> Option<String> {
        for step in &spec.steps {
            let step_start = Instant::now();
            let step_name = step.name();
            debug!("Executing step: {}", step_name);

            let outcome = self.execute_step(driver, step).await;
            let duration_ms = step_start.elapsed().as_millis() as u64;

            match outcome {
                Ok(observed) => steps.push(StepResult {
                    success: true,
                    step_name,
                    duration_ms,
                    error: None,
                    observed,
                }),
                Err(e) => {
                    let observed = match &e {
                        E2eError::TitleMismatch { actual, .. } => Some(actual.clone()),
                        _ => None,
                    };
                    let test_error = format!("{}: {}", step_name, e);
                    steps.push(StepResult {
                        success: false,
                        step_name,
                        duration_ms,
                        error: Some(e.to_string()),
                        observed,
                    });
                    return Some(test_error);
                }
            }
        }

        None
    }

    async fn execute_step(&self, driver: &dyn PageDriver, step: &TestStep) -> E2eResult<Option<String>> {
        match step {
            TestStep::Navigate { url } => {
                let url = self.config.resolve_url(url)?;
                driver.navigate(&url).await?;
                Ok(None)
            }
            TestStep::ExpectTitle { title, mode } => {
                let actual = driver.title().await?;
                if mode.matches(title, &actual)? {
                    Ok(Some(actual))
                } else {
                    Err(E2eError::TitleMismatch {
                        expected: title.clone(),
                        actual,
                    })
                }
            }
            TestStep::Log { message } => {
                info!("[TEST LOG] {}", message);
                Ok(None)
            }
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

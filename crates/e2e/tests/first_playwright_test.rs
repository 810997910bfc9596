//! The "First Playwright Test" smoke test and the runner scenarios around it.
//!
//! The live tests reach https://example.com and are ignored by default:
//!
//! ```text
//! cargo test -p pagecheck-e2e --test first_playwright_test -- --ignored
//! ```

use async_trait::async_trait;
use httpmock::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pagecheck_e2e::http::{HttpConfig, HttpDriver};
use pagecheck_e2e::playwright::{PlaywrightConfig, PlaywrightDriver};
use pagecheck_e2e::{
    DriverKind, E2eConfig, E2eError, E2eResult, PageDriver, TestRunner, TestSpec, EXAMPLE_TITLE,
    EXAMPLE_URL,
};

/// In-memory driver serving canned titles per URL
#[derive(Clone, Default)]
struct ScriptedDriver {
    titles: Arc<HashMap<String, String>>,
    unreachable: Arc<Vec<String>>,
    nav_delay: Option<Duration>,
    title_delay: Option<Duration>,
    current: Arc<Mutex<Option<String>>>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedDriver {
    fn serving(url: &str, title: &str) -> Self {
        let titles = [(url.to_string(), title.to_string())].into_iter().collect();
        Self {
            titles: Arc::new(titles),
            ..Default::default()
        }
    }

    fn unreachable(url: &str) -> Self {
        Self {
            unreachable: Arc::new(vec![url.to_string()]),
            ..Default::default()
        }
    }

    fn opener(&self) -> impl Fn() -> std::future::Ready<E2eResult<Box<dyn PageDriver>>> + '_ {
        move || std::future::ready(Ok(Box::new(self.clone()) as Box<dyn PageDriver>))
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn navigate(&self, url: &str) -> E2eResult<()> {
        if let Some(delay) = self.nav_delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.iter().any(|u| u == url) {
            return Err(E2eError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_INTERNET_DISCONNECTED".into(),
            });
        }
        *self.current.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    async fn title(&self) -> E2eResult<String> {
        if let Some(delay) = self.title_delay {
            tokio::time::sleep(delay).await;
        }
        let current = self.current.lock().unwrap().clone();
        Ok(current
            .and_then(|url| self.titles.get(&url).cloned())
            .unwrap_or_default())
    }

    async fn close(&self) -> E2eResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn shipped_spec() -> TestSpec {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("specs")
        .join("first-playwright-test.yaml");
    TestSpec::from_file(&path).expect("shipped spec parses")
}

fn title_spec(url: &str, title: &str) -> TestSpec {
    TestSpec::from_yaml(&format!(
        "name: title-check\nsteps:\n  - action: navigate\n    url: \"{url}\"\n  - action: expect_title\n    title: \"{title}\"\n"
    ))
    .unwrap()
}

fn http_runner(base_url: Option<String>) -> TestRunner {
    TestRunner::with_config(E2eConfig {
        driver: DriverKind::Http,
        base_url,
        navigation_timeout_ms: 5_000,
        ..Default::default()
    })
}

#[test]
fn shipped_spec_targets_example_domain() {
    let spec = shipped_spec();
    assert_eq!(spec.name, "First Playwright Test");
    assert_eq!(
        spec.steps,
        title_spec(EXAMPLE_URL, EXAMPLE_TITLE).steps,
        "shipped spec must navigate to {} and expect {:?}",
        EXAMPLE_URL,
        EXAMPLE_TITLE
    );
}

#[tokio::test]
async fn passes_when_title_matches() {
    let driver = ScriptedDriver::serving("https://example.com/", EXAMPLE_TITLE);
    let runner = TestRunner::new();

    let result = runner.run_spec_using(&shipped_spec(), driver.opener()).await.unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[1].observed.as_deref(), Some(EXAMPLE_TITLE));
    assert_eq!(driver.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fails_when_navigation_fails() {
    let driver = ScriptedDriver::unreachable("https://example.com/");
    let runner = TestRunner::new();

    let result = runner.run_spec_using(&shipped_spec(), driver.opener()).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.steps.len(), 1, "must stop after the failed navigation");
    assert!(!result.steps[0].success);
    let error = result.error.unwrap();
    assert!(error.contains("Navigation to https://example.com/ failed"), "{}", error);
    assert_eq!(driver.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fails_when_title_differs() {
    let driver = ScriptedDriver::serving("https://example.com/", "Example Domain (moved)");
    let runner = TestRunner::new();

    let result = runner.run_spec_using(&shipped_spec(), driver.opener()).await.unwrap();

    assert!(!result.success);
    let step = &result.steps[1];
    assert!(!step.success);
    assert_eq!(step.observed.as_deref(), Some("Example Domain (moved)"));
    assert!(result.error.unwrap().contains("Title mismatch"));
}

#[tokio::test]
async fn retries_with_a_fresh_driver() {
    let flaky = ScriptedDriver::unreachable("https://example.com/");
    let healthy = ScriptedDriver::serving("https://example.com/", EXAMPLE_TITLE);
    let opened = AtomicUsize::new(0);

    let runner = TestRunner::with_config(E2eConfig {
        retries: 2,
        ..Default::default()
    });

    let result = runner
        .run_spec_using(&shipped_spec(), || {
            let driver = if opened.fetch_add(1, Ordering::SeqCst) == 0 {
                flaky.clone()
            } else {
                healthy.clone()
            };
            std::future::ready(Ok(Box::new(driver) as Box<dyn PageDriver>))
        })
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(opened.load(Ordering::SeqCst), 2);
    assert_eq!(flaky.closed.load(Ordering::SeqCst), 1);
    assert_eq!(healthy.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhausted_retries_report_failure() {
    let driver = ScriptedDriver::serving("https://example.com/", "Something Else");
    let runner = TestRunner::with_config(E2eConfig {
        retries: 1,
        ..Default::default()
    });

    let result = runner.run_spec_using(&shipped_spec(), driver.opener()).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(driver.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_timeout_fails_the_test() {
    let driver = ScriptedDriver {
        nav_delay: Some(Duration::from_secs(10)),
        ..ScriptedDriver::serving("https://example.com/", EXAMPLE_TITLE)
    };
    let runner = TestRunner::with_config(E2eConfig {
        test_timeout_ms: 50,
        ..Default::default()
    });

    let result = runner.run_spec_using(&shipped_spec(), driver.opener()).await.unwrap();

    assert!(!result.success);
    assert!(result.error.unwrap().contains("exceeded 50 ms"));
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.steps[0].step_name, "navigate:https://example.com");
    assert!(!result.steps[0].success);
    assert_eq!(driver.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn timeout_keeps_completed_steps() {
    let driver = ScriptedDriver {
        title_delay: Some(Duration::from_secs(10)),
        ..ScriptedDriver::serving("https://example.com/", EXAMPLE_TITLE)
    };
    let runner = TestRunner::with_config(E2eConfig {
        test_timeout_ms: 100,
        ..Default::default()
    });

    let result = runner.run_spec_using(&shipped_spec(), driver.opener()).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.steps.len(), 2, "{:?}", result.steps);
    assert!(result.steps[0].success, "navigation finished before the deadline");
    assert!(!result.steps[1].success);
    assert!(result.steps[1].error.as_deref().unwrap().contains("exceeded 100 ms"));
    assert_eq!(driver.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn driver_open_failure_is_a_harness_error() {
    let runner = TestRunner::new();
    let err = runner
        .run_spec_using(&shipped_spec(), || {
            std::future::ready(Err::<Box<dyn PageDriver>, _>(E2eError::PlaywrightNotFound))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, E2eError::PlaywrightNotFound));
}

#[tokio::test]
async fn http_driver_reads_served_title() {
    let server = MockServer::start_async().await;
    let page = server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body("<!doctype html><html><head>\n<title>Example Domain</title>\n</head><body></body></html>");
        })
        .await;

    let runner = http_runner(Some(server.base_url()));
    let result = runner.run_spec(&title_spec("/", EXAMPLE_TITLE)).await.unwrap();

    page.assert_async().await;
    assert!(result.success, "{:?}", result.error);
}

#[tokio::test]
async fn http_driver_title_mismatch_fails() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).body("<title>Example Domain v2</title>");
        })
        .await;

    let runner = http_runner(Some(server.base_url()));
    let result = runner.run_spec(&title_spec("/", EXAMPLE_TITLE)).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.steps[1].observed.as_deref(), Some("Example Domain v2"));
}

#[tokio::test]
async fn http_driver_error_page_still_navigates() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/missing");
            then.status(404).body("<title>Not Found</title>");
        })
        .await;

    let driver = HttpDriver::new(&HttpConfig::default(), Duration::from_secs(5)).unwrap();
    driver.navigate(&server.url("/missing")).await.unwrap();
    assert_eq!(driver.title().await.unwrap(), "Not Found");
}

#[tokio::test]
async fn http_driver_unreachable_host_is_navigation_error() {
    let driver = HttpDriver::new(&HttpConfig::default(), Duration::from_secs(2)).unwrap();
    let err = driver.navigate("http://127.0.0.1:1/").await.unwrap_err();
    assert!(err.is_navigation(), "{}", err);
}

#[tokio::test]
async fn run_all_writes_report() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).body("<title>Example Domain</title>");
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let specs_dir = dir.path().join("specs");
    std::fs::create_dir_all(&specs_dir).unwrap();
    std::fs::write(
        specs_dir.join("pass.yaml"),
        "name: pass\ntags: [smoke]\nsteps:\n  - action: navigate\n    url: /\n  - action: expect_title\n    title: Example Domain\n",
    )
    .unwrap();
    std::fs::write(
        specs_dir.join("fail.yaml"),
        "name: fail\nsteps:\n  - action: navigate\n    url: /\n  - action: expect_title\n    title: Example\n    mode: exact\n",
    )
    .unwrap();

    let runner = TestRunner::with_config(E2eConfig {
        driver: DriverKind::Http,
        base_url: Some(server.base_url()),
        specs_dir,
        output_dir: dir.path().join("results"),
        ..Default::default()
    });

    let suite = runner.run_all().await.unwrap();
    assert_eq!(suite.total, 2);
    assert_eq!(suite.passed, 1);
    assert_eq!(suite.failed, 1);
    assert!(!suite.success());

    let tagged = runner.run_tagged("smoke").await.unwrap();
    assert_eq!(tagged.passed, 1);
    assert_eq!(tagged.skipped, 1);
    assert!(tagged.success());

    let path = runner.write_results(&suite).unwrap();
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(report["failed"], 1);
    assert_eq!(report["results"].as_array().unwrap().len(), 2);
}

/// First Playwright Test: a real browser opens example.com.
///
/// Requires Node with the `playwright` package and installed browsers.
#[tokio::test]
#[ignore]
async fn first_playwright_test() {
    let driver = PlaywrightDriver::launch(PlaywrightConfig::default(), Duration::from_secs(30))
        .await
        .expect("playwright is installed");

    driver.navigate(EXAMPLE_URL).await.expect("example.com is reachable");
    let title = driver.title().await.unwrap();
    driver.close().await.unwrap();

    assert_eq!(title, EXAMPLE_TITLE);
}

/// The same check without a browser. Requires network access.
#[tokio::test]
#[ignore]
async fn example_domain_title_over_http() {
    let driver = HttpDriver::new(&HttpConfig::default(), Duration::from_secs(30)).unwrap();
    driver.navigate(EXAMPLE_URL).await.expect("example.com is reachable");
    assert_eq!(driver.title().await.unwrap(), EXAMPLE_TITLE);
}

//! Playwright browser automation
//!
//! Playwright itself lives in Node, so the driver writes a small bridge script
//! to a temp dir and keeps one `node` child alive for the whole test. Commands
//! go over stdin and replies come back on stdout, one JSON object per line:
//!
//! ```text
//! -> {"id":1,"op":"goto","url":"https://example.com","timeout_ms":30000}
//! <- {"id":1,"ok":true,"value":"https://example.com/"}
//! -> {"id":2,"op":"title"}
//! <- {"id":2,"ok":true,"value":"Example Domain"}
//! ```
//!
//! The bridge answers `id: 0` once the browser is up.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::driver::PageDriver;
use crate::error::{E2eError, E2eResult};

/// How long `close` waits for the browser to shut down cleanly
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

const BRIDGE_SCRIPT: &str = r#"
const readline = require('readline');
const playwright = require('playwright');

const options = JSON.parse(process.argv[2]);

function reply(msg) {
  return new Promise((resolve) => process.stdout.write(JSON.stringify(msg) + '\n', resolve));
}

(async () => {
  let browser;
  try {
    browser = await playwright[options.browser].launch({ headless: options.headless });
  } catch (error) {
    await reply({ id: 0, ok: false, error: 'launch failed: ' + error.message });
    process.exit(1);
  }
  const context = await browser.newContext({ viewport: options.viewport });
  const page = await context.newPage();
  await reply({ id: 0, ok: true, value: browser.version() });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    let cmd;
    try {
      cmd = JSON.parse(line);
    } catch (error) {
      await reply({ id: -1, ok: false, error: 'malformed command: ' + error.message });
      continue;
    }
    try {
      switch (cmd.op) {
        case 'goto':
          await page.goto(cmd.url, { timeout: cmd.timeout_ms, waitUntil: 'load' });
          await reply({ id: cmd.id, ok: true, value: page.url() });
          break;
        case 'title':
          await reply({ id: cmd.id, ok: true, value: await page.title() });
          break;
        case 'close':
          await browser.close();
          await reply({ id: cmd.id, ok: true });
          rl.close();
          process.exit(0);
        default:
          await reply({ id: cmd.id, ok: false, error: 'unknown op: ' + cmd.op });
      }
    } catch (error) {
      await reply({ id: cmd.id, ok: false, error: error.message });
    }
  }
  await browser.close();
})();
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(E2eError::Config(format!("unknown browser: {}", other))),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Node executable used to run the bridge
    pub node_binary: PathBuf,

    /// Directory with the `playwright` package, exported as `NODE_PATH`
    pub node_path: Option<PathBuf>,

    /// Upper bound for browser startup
    pub launch_timeout_ms: u64,

    /// Slack on top of the navigation timeout before the bridge is considered hung
    pub reply_grace_ms: u64,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: PathBuf::from("node"),
            node_path: None,
            launch_timeout_ms: 30_000,
            reply_grace_ms: 5_000,
        }
    }
}

impl PlaywrightConfig {
    fn node_command(&self) -> Command {
        let mut cmd = Command::new(&self.node_binary);
        if let Some(node_path) = &self.node_path {
            cmd.env("NODE_PATH", node_path);
        }
        cmd
    }

    fn launch_options(&self) -> serde_json::Value {
        serde_json::json!({
            "browser": self.browser.as_str(),
            "headless": self.headless,
            "viewport": {
                "width": self.viewport_width,
                "height": self.viewport_height,
            },
        })
    }
}

#[derive(Debug, Serialize)]
struct BridgeCommand<'a> {
    id: u64,
    op: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    id: i64,
    ok: bool,
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl BridgeReply {
    fn value_str(&self) -> String {
        match &self.value {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    fn error_message(&self) -> String {
        self.error.clone().unwrap_or_else(|| "unknown error".to_string())
    }
}

struct Bridge {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl Bridge {
    async fn send(&mut self, cmd: &BridgeCommand<'_>) -> E2eResult<()> {
        let mut line = serde_json::to_string(cmd)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Read lines until the reply for `id` arrives
    async fn recv(&mut self, id: u64) -> E2eResult<BridgeReply> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| E2eError::Playwright("bridge process exited".into()))?;

            match serde_json::from_str::<BridgeReply>(&line) {
                Ok(reply) if reply.id == id as i64 => return Ok(reply),
                Ok(reply) => warn!("Ignoring stray bridge reply {}: {:?}", reply.id, reply.error),
                Err(_) => debug!("[bridge] {}", line),
            }
        }
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill Playwright bridge: {}", e);
        }
    }
}

/// Browser driven through Playwright
pub struct PlaywrightDriver {
    browser: Browser,
    navigation_timeout: Duration,
    reply_grace: Duration,
    next_id: AtomicU64,
    bridge: Mutex<Option<Bridge>>,
    // Holds the bridge script for the lifetime of the child
    _script_dir: TempDir,
}

impl PlaywrightDriver {
    /// Launch a browser and wait until it is ready to take commands
    pub async fn launch(config: PlaywrightConfig, navigation_timeout: Duration) -> E2eResult<Self> {
        Self::check_playwright_installed(&config).await?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        debug!("Starting Playwright bridge: {}", script_path.display());

        let mut child = config
            .node_command()
            .arg(&script_path)
            .arg(config.launch_options().to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                E2eError::Playwright(format!(
                    "failed to spawn {}: {}",
                    config.node_binary.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdout unavailable".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[bridge stderr] {}", line);
                }
            });
        }

        let mut bridge = Bridge {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        };

        let launch_timeout = Duration::from_millis(config.launch_timeout_ms);
        let ready = timeout(launch_timeout, bridge.recv(0))
            .await
            .map_err(|_| E2eError::Timeout(format!("{} launch", config.browser)))??;

        if !ready.ok {
            return Err(E2eError::Playwright(ready.error_message()));
        }

        info!("Launched {} {}", config.browser, ready.value_str());

        Ok(Self {
            browser: config.browser,
            navigation_timeout,
            reply_grace: Duration::from_millis(config.reply_grace_ms),
            next_id: AtomicU64::new(1),
            bridge: Mutex::new(Some(bridge)),
            _script_dir: script_dir,
        })
    }

    /// Check that Node can resolve the `playwright` package
    async fn check_playwright_installed(config: &PlaywrightConfig) -> E2eResult<()> {
        let status = config
            .node_command()
            .args(["-e", "require.resolve('playwright')"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    pub fn browser(&self) -> Browser {
        self.browser
    }

    /// Send one command and wait for its reply
    async fn request(
        &self,
        op: &str,
        url: Option<&str>,
        wait: Duration,
    ) -> E2eResult<BridgeReply> {
        let mut guard = self.bridge.lock().await;
        let bridge = guard
            .as_mut()
            .ok_or_else(|| E2eError::Playwright("browser is closed".into()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cmd = BridgeCommand {
            id,
            op,
            url,
            timeout_ms: url.map(|_| self.navigation_timeout.as_millis() as u64),
        };
        bridge.send(&cmd).await?;

        let outcome = timeout(wait, bridge.recv(id)).await;
        match outcome {
            Ok(reply) => reply,
            Err(_) => {
                // A hung bridge cannot be trusted with further commands.
                warn!("Playwright bridge did not answer '{}' in {:?}; killing it", op, wait);
                if let Some(mut bridge) = guard.take() {
                    bridge.kill().await;
                }
                Err(E2eError::Timeout(format!("playwright {}", op)))
            }
        }
    }
}

#[async_trait]
impl PageDriver for PlaywrightDriver {
    fn name(&self) -> &str {
        "playwright"
    }

    async fn navigate(&self, url: &str) -> E2eResult<()> {
        let reply = self
            .request("goto", Some(url), self.navigation_timeout + self.reply_grace)
            .await?;

        if !reply.ok {
            return Err(E2eError::Navigation {
                url: url.to_string(),
                reason: reply.error_message(),
            });
        }

        debug!("Navigated to {}", reply.value_str());
        Ok(())
    }

    async fn title(&self) -> E2eResult<String> {
        let reply = self.request("title", None, self.reply_grace).await?;
        if !reply.ok {
            return Err(E2eError::Playwright(reply.error_message()));
        }
        Ok(reply.value_str())
    }

    async fn close(&self) -> E2eResult<()> {
        let Some(mut bridge) = self.bridge.lock().await.take() else {
            return Ok(());
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cmd = BridgeCommand {
            id,
            op: "close",
            url: None,
            timeout_ms: None,
        };

        let graceful = async {
            bridge.send(&cmd).await?;
            bridge.recv(id).await?;
            bridge.child.wait().await?;
            Ok::<_, E2eError>(())
        };

        let outcome = timeout(CLOSE_TIMEOUT, graceful).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Browser did not close cleanly: {}", e);
                bridge.kill().await;
            }
            Err(_) => {
                warn!("Browser close timed out; killing bridge");
                bridge.kill().await;
            }
        }

        Ok(())
    }
}

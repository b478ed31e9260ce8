use anyhow::{Context, Result, anyhow};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use page_bridge::navigation::is_candidate_page;

/// Dialogs block `evaluate` until the operator answers them.
const TAB_TIMEOUT: Duration = Duration::from_secs(600);

/// Chrome connection for the lifetime of the agent. Dropping it closes a
/// browser we launched ourselves.
pub struct BrowserSession {
    _browser: Browser,
    pub tab: Arc<Tab>,
}

#[derive(Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

impl BrowserSession {
    /// Attaches to the operator's Chrome, or launches one when asked to or
    /// when nothing is listening.
    pub async fn open(
        debug_url: &str,
        launch: bool,
        open_url: Option<&str>,
        markers: &[String],
    ) -> Result<Self> {
        let browser = if launch {
            launch_browser().await?
        } else {
            match attach(debug_url).await {
                Ok(browser) => browser,
                Err(e) => {
                    warn!("could not attach to {}: {:#}. Launching Chrome instead.", debug_url, e);
                    launch_browser().await?
                }
            }
        };

        let markers = markers.to_vec();
        let open_url = open_url.map(str::to_string);
        tokio::task::spawn_blocking(move || -> Result<Self> {
            let tab = pick_tab(&browser, &markers)?;
            tab.set_default_timeout(TAB_TIMEOUT);
            if let Some(url) = open_url {
                info!(%url, "opening page");
                tab.navigate_to(&url)?;
                tab.wait_until_navigated()?;
            }
            Ok(Self {
                _browser: browser,
                tab,
            })
        })
        .await
        .map_err(|e| anyhow!("browser setup panicked: {}", e))?
    }
}

async fn attach(debug_url: &str) -> Result<Browser> {
    let endpoint = format!("{}/json/version", debug_url.trim_end_matches('/'));
    info!(%endpoint, "attaching to Chrome");
    let version: VersionInfo = reqwest::get(&endpoint)
        .await
        .with_context(|| format!("no DevTools endpoint at {endpoint}"))?
        .json()
        .await
        .context("unexpected DevTools version response")?;

    let ws = version.web_socket_debugger_url;
    tokio::task::spawn_blocking(move || Browser::connect(ws))
        .await
        .map_err(|e| anyhow!("attach panicked: {}", e))?
}

async fn launch_browser() -> Result<Browser> {
    let profile = dirs::data_local_dir()
        .ok_or_else(|| anyhow!("no local data directory for the Chrome profile"))?
        .join("page-bridge")
        .join("profile");
    std::fs::create_dir_all(&profile)
        .with_context(|| format!("creating Chrome profile at {}", profile.display()))?;

    tokio::task::spawn_blocking(move || -> Result<Browser> {
        let options = LaunchOptions {
            headless: false,
            user_data_dir: Some(profile),
            args: vec![
                std::ffi::OsStr::new("--no-first-run"),
                std::ffi::OsStr::new("--no-default-browser-check"),
            ],
            // The operator may leave the page idle for a long time.
            idle_browser_timeout: Duration::from_secs(60 * 60 * 24),
            ..Default::default()
        };
        info!("launching Chrome");
        Browser::new(options).map_err(|e| anyhow!("Browser launch failed: {}", e))
    })
    .await
    .map_err(|e| anyhow!("launch panicked: {}", e))?
}

/// Prefers a tab already showing a candidate page.
fn pick_tab(browser: &Browser, markers: &[String]) -> Result<Arc<Tab>> {
    let existing = {
        let tabs = browser
            .get_tabs()
            .lock()
            .map_err(|_| anyhow!("tab list lock poisoned"))?;
        tabs.iter()
            .find(|t| is_candidate_page(&t.get_url(), markers))
            .or_else(|| tabs.first())
            .cloned()
    };
    match existing {
        Some(tab) => {
            info!(url = %tab.get_url(), "using existing tab");
            Ok(tab)
        }
        None => {
            info!("no tabs found, creating one");
            browser.new_tab()
        }
    }
}

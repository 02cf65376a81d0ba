use std::path::Path;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use crate::error::{RecorderError, RecorderResult};
use crate::settings::PageSettings;

/// Expression evaluated in the page to read the completion signal. The page
/// script sets the global exactly once when its animation is done.
const FINISHED_EXPRESSION: &str = "window.animationFinished === true";
const READY_SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);
const FINISHED_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An isolated Chromium session pointed at the target page.
///
/// `open` and `close` bracket the browser lifetime; both controllers call
/// `close` exactly once, including on their error paths.
pub struct PageSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    console_task: JoinHandle<()>,
}

impl PageSession {
    /// Launch Chromium, navigate to the configured URL and block until the
    /// readiness selector matches.
    ///
    /// Frame capture opens headless; direct recording opens headful because
    /// the encoder grabs the real screen.
    pub async fn open(settings: &PageSettings, headless: bool) -> RecorderResult<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(settings.viewport_width, settings.viewport_height)
            .viewport(Viewport {
                width: settings.viewport_width,
                height: settings.viewport_height,
                ..Viewport::default()
            })
            .arg("--window-position=0,0")
            // Outer window is slightly shorter than the emulated viewport,
            // matching the reference capture geometry.
            .arg(format!(
                "--window-size={},{}",
                settings.viewport_width,
                settings.viewport_height.saturating_sub(20)
            ))
            .arg("--autoplay-policy=no-user-gesture-required");
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(RecorderError::Navigation)?;

        let (browser, mut handler) = Browser::launch(config).await?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match Self::navigate(&browser, settings).await {
            Ok(page) => page,
            Err(error) => {
                let mut browser = browser;
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                return Err(error);
            }
        };

        let console_task = Self::spawn_console_forwarder(&page).await;

        Ok(Self {
            browser,
            page,
            handler_task,
            console_task,
        })
    }

    async fn navigate(browser: &Browser, settings: &PageSettings) -> RecorderResult<Page> {
        let page = browser.new_page(settings.url.as_str()).await.map_err(|error| {
            RecorderError::Navigation(format!("failed to open '{}': {error}", settings.url))
        })?;

        page.wait_for_navigation().await.map_err(|error| {
            RecorderError::Navigation(format!("'{}' did not finish loading: {error}", settings.url))
        })?;

        Self::wait_for_selector(
            &page,
            &settings.ready_selector,
            Duration::from_millis(settings.ready_timeout_ms),
        )
        .await?;

        Ok(page)
    }

    async fn wait_for_selector(
        page: &Page,
        selector: &str,
        timeout: Duration,
    ) -> RecorderResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(RecorderError::Navigation(format!(
                    "readiness selector '{selector}' did not appear within {timeout:?}"
                )));
            }
            sleep(READY_SELECTOR_POLL_INTERVAL).await;
        }
    }

    /// Forward page console messages to the host log as they arrive.
    async fn spawn_console_forwarder(page: &Page) -> JoinHandle<()> {
        let events = page.event_listener::<EventConsoleApiCalled>().await;
        tokio::spawn(async move {
            let Ok(mut events) = events else {
                return;
            };
            while let Some(event) = events.next().await {
                let message = event
                    .args
                    .iter()
                    .filter_map(|argument| argument.value.as_ref())
                    .map(|value| match value {
                        serde_json::Value::String(text) => text.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                if !message.is_empty() {
                    tracing::info!("page console: {message}");
                }
            }
        })
    }

    /// Point-in-time read of the completion flag. An absent or non-boolean
    /// binding reads as `false`.
    pub async fn is_finished(&self) -> RecorderResult<bool> {
        let result = self.page.evaluate(FINISHED_EXPRESSION).await?;
        Ok(result.into_value::<bool>().unwrap_or(false))
    }

    /// Suspend until the completion flag becomes true, polling internally.
    ///
    /// Fails with `RecorderError::Timeout` once `timeout` has elapsed
    /// without the flag being observed.
    pub async fn wait_until_finished(&self, timeout: Duration) -> RecorderResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_finished().await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(RecorderError::Timeout { waited: timeout });
            }
            sleep(FINISHED_POLL_INTERVAL).await;
        }
    }

    /// Write a PNG screenshot of the current render state to `path`.
    pub async fn capture_still(&self, path: &Path) -> RecorderResult<()> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.page
            .save_screenshot(params, path)
            .await
            .map_err(|error| RecorderError::Capture {
                path: path.to_path_buf(),
                message: error.to_string(),
            })?;
        Ok(())
    }

    /// Release the browser session. Consumes the handle so a session cannot
    /// be used after it has been closed.
    pub async fn close(mut self) -> RecorderResult<()> {
        self.console_task.abort();
        let close_result = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        close_result?;
        Ok(())
    }
}

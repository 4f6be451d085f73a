use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info, warn};

use crate::models::RenderedDocument;

/// Desktop Chrome identity; review sites serve a degraded page to anything
/// that looks like a bot.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);
const FINAL_SETTLE: Duration = Duration::from_secs(1);

/// How the materializer decides that a page has finished loading content.
#[derive(Debug, Clone)]
pub enum TerminationPolicy {
    /// Click a "load more" style control until it disappears. Terminates on a
    /// real signal: the absence of the trigger. `max_rounds` caps the loop in
    /// case the site regrows the control forever.
    ControlDriven {
        trigger_text: String,
        settle: Duration,
        max_rounds: u32,
    },
    /// A fixed number of scroll-to-bottom cycles with a fixed delay each.
    /// No completion signal exists; slow connections may under-capture.
    ScrollDriven { cycles: u32, delay: Duration },
}

/// Fully renders a dynamic page into static markup using headless Chrome.
/// The browser process is torn down when this struct drops, error or not.
pub struct PageMaterializer {
    browser: Browser,
}

impl PageMaterializer {
    pub fn new(headless: bool) -> Result<Self> {
        info!("Launching Chrome (headless: {})...", headless);

        let options = LaunchOptions::default_builder()
            .headless(headless)
            .window_size(Some((1440, 900)))
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self { browser })
    }

    /// Navigate to `url`, run the termination policy until the page is fully
    /// hydrated, then capture the complete document markup.
    pub fn materialize(&self, url: &str, policy: &TerminationPolicy) -> Result<RenderedDocument> {
        let tab = self.browser.new_tab()?;
        tab.set_default_timeout(NAVIGATION_TIMEOUT);
        tab.set_user_agent(USER_AGENT, Some(ACCEPT_LANGUAGE), None)?;

        info!("Navigating to {}", url);
        tab.navigate_to(url)
            .with_context(|| format!("Failed to navigate to {}", url))?;
        tab.wait_until_navigated()
            .context("Page did not finish loading within the navigation timeout")?;

        match policy {
            TerminationPolicy::ControlDriven {
                trigger_text,
                settle,
                max_rounds,
            } => {
                info!("Page loaded. Searching for '{}' control...", trigger_text);
                let mut control = TabControl {
                    tab: tab.as_ref(),
                    trigger_text: trigger_text.as_str(),
                };
                let rounds = drive_load_more(&mut control, *settle, *max_rounds)?;
                info!(
                    "'{}' activated {} time(s); content assumed complete",
                    trigger_text, rounds
                );
            }
            TerminationPolicy::ScrollDriven { cycles, delay } => {
                info!("Page loaded. Running {} scroll cycle(s)...", cycles);
                for cycle in 0..*cycles {
                    debug!("Scroll cycle {}", cycle + 1);
                    scroll_to_end(tab.as_ref())?;
                    thread::sleep(*delay);
                }
            }
        }

        // One last nudge so anything triggered by the final interaction
        // finishes rendering before capture.
        scroll_to_end(tab.as_ref())?;
        thread::sleep(FINAL_SETTLE);

        let html = tab
            .get_content()
            .context("Failed to capture rendered document")?;
        info!("Captured rendered document ({} bytes)", html.len());

        Ok(RenderedDocument::new(url, html))
    }
}

/// One lookup-and-activate attempt on a "load more" style control.
///
/// Factored behind a trait so the polling loop itself can be exercised
/// without a live browser.
pub trait LoadMoreControl {
    /// Find the trigger and activate it. `Ok(false)` means the trigger is
    /// absent and content is complete.
    fn activate(&mut self) -> Result<bool>;

    /// Issue an end-of-content signal so lazy content below the fold loads.
    fn scroll_to_end(&mut self) -> Result<()>;
}

/// Repeatedly activate the control until it disappears, waiting `settle`
/// between rounds. Returns the number of activations performed.
pub fn drive_load_more(
    control: &mut dyn LoadMoreControl,
    settle: Duration,
    max_rounds: u32,
) -> Result<u32> {
    let mut rounds = 0;
    while rounds < max_rounds {
        if !control.activate()? {
            return Ok(rounds);
        }
        rounds += 1;
        debug!("Activated 'load more' (round {})", rounds);
        thread::sleep(settle);
        control.scroll_to_end()?;
    }
    warn!(
        "'load more' control still present after {} rounds; capturing anyway",
        max_rounds
    );
    Ok(rounds)
}

struct TabControl<'a> {
    tab: &'a Tab,
    trigger_text: &'a str,
}

impl LoadMoreControl for TabControl<'_> {
    fn activate(&mut self) -> Result<bool> {
        // JSON-escape the needle so it embeds safely in the script.
        let needle = serde_json::to_string(self.trigger_text)?;
        let script = format!(
            r#"
            (() => {{
                const button = Array.from(document.querySelectorAll('button'))
                    .find(b => b.textContent.trim().includes({needle}));
                if (!button) return false;
                button.click();
                return true;
            }})()
            "#
        );
        let result = self.tab.evaluate(&script, false)?;
        Ok(result.value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    fn scroll_to_end(&mut self) -> Result<()> {
        scroll_to_end(self.tab)
    }
}

fn scroll_to_end(tab: &Tab) -> Result<()> {
    tab.evaluate("window.scrollTo(0, document.body.scrollHeight);", false)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reports the trigger present for a fixed number of rounds, then absent.
    struct FadingControl {
        remaining: u32,
        activations: u32,
        scrolls: u32,
    }

    impl LoadMoreControl for FadingControl {
        fn activate(&mut self) -> Result<bool> {
            if self.remaining == 0 {
                return Ok(false);
            }
            self.remaining -= 1;
            self.activations += 1;
            Ok(true)
        }

        fn scroll_to_end(&mut self) -> Result<()> {
            self.scrolls += 1;
            Ok(())
        }
    }

    #[test]
    fn loop_terminates_when_trigger_disappears() {
        let mut control = FadingControl {
            remaining: 3,
            activations: 0,
            scrolls: 0,
        };
        let rounds = drive_load_more(&mut control, Duration::ZERO, 100).unwrap();
        assert_eq!(rounds, 3);
        assert_eq!(control.activations, 3);
        // One end-of-content signal per activation.
        assert_eq!(control.scrolls, 3);
    }

    #[test]
    fn loop_terminates_immediately_when_trigger_never_appears() {
        let mut control = FadingControl {
            remaining: 0,
            activations: 0,
            scrolls: 0,
        };
        let rounds = drive_load_more(&mut control, Duration::ZERO, 100).unwrap();
        assert_eq!(rounds, 0);
        assert_eq!(control.activations, 0);
    }

    #[test]
    fn loop_respects_round_cap() {
        let mut control = FadingControl {
            remaining: u32::MAX,
            activations: 0,
            scrolls: 0,
        };
        let rounds = drive_load_more(&mut control, Duration::ZERO, 5).unwrap();
        assert_eq!(rounds, 5);
        assert_eq!(control.activations, 5);
    }
}

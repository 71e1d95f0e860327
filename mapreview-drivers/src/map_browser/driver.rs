use crate::map_browser::{
    behavioral::BehavioralEngine, capabilities::chrome_capabilities, page::MapPage,
};
use anyhow::{Context, Result};
use fantoccini::{Client, ClientBuilder};
use mapreview_common::BrowserSettings;
use tracing::info;

const WEBDRIVER_URL_ENV: &str = "MAPREVIEW_WEBDRIVER_URL";

/// Thin wrapper around a `fantoccini` WebDriver client.
pub struct MapDriver {
    pub client: Client,
    pub behavioral_engine: BehavioralEngine,
}

impl MapDriver {
    /// Connect to a running WebDriver service.
    ///
    /// The endpoint is `MAPREVIEW_WEBDRIVER_URL` when set, otherwise
    /// `settings.webdriver_url` (chromedriver on `localhost:9515` by default).
    pub async fn new(settings: &BrowserSettings) -> Result<Self> {
        let endpoint =
            std::env::var(WEBDRIVER_URL_ENV).unwrap_or_else(|_| settings.webdriver_url.clone());

        let client = ClientBuilder::native()
            .capabilities(chrome_capabilities(settings))
            .connect(&endpoint)
            .await
            .with_context(|| format!("failed to connect to WebDriver at {endpoint}"))?;

        info!(
            target: "browser.session",
            %endpoint,
            headless = settings.headless,
            "browser session started"
        );

        Ok(Self {
            client,
            behavioral_engine: BehavioralEngine::new(),
        })
    }

    /// A page bound to this session. The first window seen becomes the
    /// page's root window.
    pub async fn page(&self) -> Result<MapPage> {
        let main_window = self.client.window().await?;
        Ok(MapPage::new(
            self.client.clone(),
            self.behavioral_engine.clone(),
            Some(main_window),
        ))
    }

    /// Close the underlying browser session.
    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        info!(target: "browser.session", "browser session closed");
        Ok(())
    }
}

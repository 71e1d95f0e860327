//! Common types and utilities shared across mapreview crates.
//!
//! This crate defines the locator vocabulary, the interaction failure
//! taxonomy, browser settings, observability helpers, and the shared error
//! type used throughout the workspace. It stays dependency-light so that the
//! driver, config and crawl crates can all depend on it.
//!
//! # Overview
//!
//! - [`Locator`]: a CSS or XPath selector addressing a live element
//! - [`ProbeError`]: classified failures reported by a browsing backend
//! - [`BrowserSettings`]: how the WebDriver session is started
//! - [`observability`]: centralised tracing/logging initialisation
//! - [`MapReviewError`] and [`Result`]: run-level error handling
//!
//! # Examples
//!
//! ```rust
//! use mapreview_common::{BrowserSettings, Locator, ProbeError};
//!
//! let settings = BrowserSettings::default();
//! assert_eq!(settings.webdriver_url, "http://localhost:9515");
//!
//! let tab = Locator::xpath("//a[@role='tab']");
//! assert_eq!(tab.as_str(), "//a[@role='tab']");
//!
//! assert!(ProbeError::Stale("detached".into()).is_retryable());
//! ```
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod observability;

/// Selector for a live element, in either CSS or XPath syntax.
///
/// Deserializes from `{css: "..."}` or `{xpath: "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locator {
    Css(String),
    #[serde(alias = "XPath")]
    Xpath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::Xpath(expr.into())
    }

    /// The raw selector text.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Css(s) | Self::Xpath(s) => s,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css={s}"),
            Self::Xpath(s) => write!(f, "xpath={s}"),
        }
    }
}

/// Classified failure of a single browsing operation.
///
/// The first four kinds are transient on a mutating page and are retried by
/// the click protocol; `ContextNotFound`, `Backend` and `Cancelled` are not.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// No element matched within the allotted wait.
    #[error("element not found: {0}")]
    NotFound(String),

    /// The click was received by another element.
    #[error("click intercepted: {0}")]
    Intercepted(String),

    /// The element handle was invalidated by a DOM mutation.
    #[error("stale element reference: {0}")]
    Stale(String),

    /// An awaited condition never became true.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// An expected frame or window never appeared.
    #[error("context not found: {0}")]
    ContextNotFound(String),

    /// Anything else the backend reported.
    #[error("backend error: {0}")]
    Backend(String),

    /// The run was cancelled while waiting.
    #[error("cancelled while waiting for {0}")]
    Cancelled(String),
}

impl ProbeError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Intercepted(_) | Self::Stale(_) | Self::Timeout(_)
        )
    }

    /// Short kind name used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Intercepted(_) => "intercepted",
            Self::Stale(_) => "stale",
            Self::Timeout(_) => "timeout",
            Self::ContextNotFound(_) => "context_not_found",
            Self::Backend(_) => "backend",
            Self::Cancelled(_) => "cancelled",
        }
    }
}

/// How the browser session is started.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Run chrome without a visible window.
    pub headless: bool,
    /// WebDriver endpoint (chromedriver by default).
    pub webdriver_url: String,
    pub window_width: u32,
    pub window_height: u32,
    /// Optional user agent override.
    pub user_agent: Option<String>,
    /// Browser UI language, e.g. `ko-KR`.
    pub language: String,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            webdriver_url: "http://localhost:9515".to_string(),
            window_width: 1920,
            window_height: 1080,
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
            ),
            language: "ko-KR".to_string(),
        }
    }
}

/// Run-level errors.
#[derive(thiserror::Error, Debug)]
pub enum MapReviewError {
    /// The browser session could not be started at all.
    #[error("browser session unavailable: {0}")]
    SessionUnavailable(String),

    /// A driver (browser, network, etc.) reported an error.
    #[error("driver error: {0}")]
    Driver(#[from] anyhow::Error),

    /// A browsing operation failed outside the click protocol.
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// Configuration was incomplete or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The selected site profile cannot be compiled.
    #[error("site profile error: {0}")]
    Profile(String),

    /// Records could not be written out.
    #[error("sink error: {0}")]
    Sink(String),
}

/// Convenient alias for results that use [`MapReviewError`].
pub type Result<T> = std::result::Result<T, MapReviewError>;

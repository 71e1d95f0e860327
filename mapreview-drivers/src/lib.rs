//! Driver layer for browser automation.
//!
//! This crate owns the WebDriver session and the element-level primitives
//! the crawl engine composes into its click protocol.
//!
//! - [`map_browser::driver::MapDriver`]: WebDriver client wrapper and session bootstrap
//! - [`map_browser::page::MapPage`]: element queries, hit-testing, frame and window switching
//! - [`map_browser::behavioral::BehavioralEngine`]: human-like timings and typing
//! - [`map_browser::capabilities`]: chrome arguments derived from [`mapreview_common::BrowserSettings`]
pub mod map_browser;

//! Resilient interaction and extraction engine for map review pages.
//!
//! - Ordered fallback lists (`candidate`)
//! - The browsing seam and its WebDriver implementation (`probe`, `browser`)
//! - Context switching between the page and its embedded documents (`context`)
//! - The safe-click protocol (`interactor`) and bounded expansion (`expander`)
//! - Tolerant review extraction from snapshots (`extractor`)
//! - Per-target pipeline with failure isolation (`orchestrator`)
//! - Site profiles, record sinks and debug captures (`profile`, `sink`, `diagnostics`)
//!
//! `testing` provides a scripted in-memory probe for exercising the engine
//! without a browser.

pub mod browser;
pub mod candidate;
pub mod context;
pub mod diagnostics;
pub mod expander;
pub mod extractor;
pub mod interactor;
pub mod orchestrator;
pub mod probe;
pub mod profile;
pub mod sink;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use candidate::CandidateSet;
pub use context::{ContextId, DocumentContext, Snapshot};
pub use extractor::{ExtractionRecord, TolerantExtractor};
pub use interactor::{InteractionOutcome, InteractionPolicy, SafeInteractor};
pub use orchestrator::{CrawlOrchestrator, CrawlSettings, ResultSet, RunSummary, Target};
pub use probe::Probe;
pub use profile::SiteProfile;
pub use sink::{CsvSink, RecordSink};

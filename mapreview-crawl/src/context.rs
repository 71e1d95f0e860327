//! Navigable contexts and switching between them.
//!
//! The map sites embed their search results and place details in
//! sub-documents that are loaded asynchronously and re-rendered at will, so a
//! handle into one of them is never trusted across steps. Every switch starts
//! again from the main window's top-level document and descends.

use crate::candidate::CandidateSet;
use crate::probe::{locate_first, wait_for, PollBudget, Probe, Readiness};
use mapreview_common::{Locator, ProbeError};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const OVERLAY_SETTLE: Duration = Duration::from_millis(150);

/// Identifies the active navigable scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextId {
    Root,
    Search,
    Detail,
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Root => "root",
            Self::Search => "search",
            Self::Detail => "detail",
        })
    }
}

/// How the boundary of an embedded context is recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Boundary {
    /// An embedded frame matched by the first present locator.
    Frame(CandidateSet<Locator>),
    /// The newest browser window, for sites that open details in a new tab.
    Window,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub boundary: Boundary,
    /// A missing boundary means the content lives in the root document.
    pub optional: bool,
}

/// Immutable copy of a context's markup, taken for offline parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub context: ContextId,
    pub html: String,
}

impl Snapshot {
    pub fn new(context: ContextId, html: impl Into<String>) -> Self {
        Self {
            context,
            html: html.into(),
        }
    }
}

/// Polling knobs used while discovering contexts and dismissing overlays.
#[derive(Debug, Clone, Copy)]
pub struct ContextTiming {
    pub boundary_polls: PollBudget,
    pub overlay_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ContextTiming {
    fn default() -> Self {
        Self {
            boundary_polls: PollBudget {
                attempts: 15,
                interval: Duration::from_secs(1),
            },
            overlay_timeout: Duration::from_millis(800),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Tracks which context is active and mediates every switch.
#[derive(Debug, Clone)]
pub struct DocumentContext {
    search: Option<Scope>,
    detail: Scope,
    overlays: Option<CandidateSet<Locator>>,
    timing: ContextTiming,
    active: ContextId,
    cancel: CancellationToken,
}

impl DocumentContext {
    /// `search == None` means search results render in the root document.
    pub fn new(
        search: Option<Scope>,
        detail: Scope,
        overlays: Option<CandidateSet<Locator>>,
        timing: ContextTiming,
    ) -> Self {
        Self {
            search,
            detail,
            overlays,
            timing,
            active: ContextId::Root,
            cancel: CancellationToken::new(),
        }
    }

    /// Abandon boundary polls and overlay waits once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn active(&self) -> ContextId {
        self.active
    }

    /// Re-anchor at the root, then descend into `target`.
    ///
    /// Returns the context that is actually active afterwards: an optional
    /// scope whose boundary never appears leaves the root active.
    pub async fn switch_to<P: Probe>(
        &mut self,
        probe: &mut P,
        target: ContextId,
    ) -> Result<ContextId, ProbeError> {
        self.active = ContextId::Root;
        probe.enter_root().await?;

        let scope = match target {
            ContextId::Root => return Ok(ContextId::Root),
            ContextId::Search => match &self.search {
                Some(scope) => scope.clone(),
                None => {
                    trace!(target: "crawl.context", "search renders in root");
                    return Ok(ContextId::Root);
                }
            },
            ContextId::Detail => self.detail.clone(),
        };

        match self.descend(probe, &scope.boundary).await {
            Ok(()) => {
                self.active = target;
                debug!(target: "crawl.context", context = %target, "entered context");
                Ok(target)
            }
            Err(ProbeError::ContextNotFound(_)) if scope.optional => {
                debug!(
                    target: "crawl.context",
                    context = %target,
                    "optional boundary absent, staying in root"
                );
                Ok(ContextId::Root)
            }
            Err(e) => Err(e),
        }
    }

    async fn descend<P: Probe>(&self, probe: &mut P, boundary: &Boundary) -> Result<(), ProbeError> {
        let polls = self.timing.boundary_polls;
        for attempt in 0..polls.attempts {
            if attempt > 0 {
                probe.pause(polls.interval).await;
            }
            if self.cancel.is_cancelled() {
                return Err(ProbeError::Cancelled(boundary_name(boundary)));
            }
            let entered = match boundary {
                Boundary::Frame(selectors) => self.try_enter_frame(probe, selectors).await,
                Boundary::Window => try_enter_newest_window(probe).await,
            };
            match entered {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) if e.is_retryable() => {
                    trace!(target: "crawl.context", attempt, error = %e, "boundary not ready");
                }
                Err(e) => return Err(e),
            }
        }
        Err(ProbeError::ContextNotFound(boundary_name(boundary)))
    }

    async fn try_enter_frame<P: Probe>(
        &self,
        probe: &mut P,
        selectors: &CandidateSet<Locator>,
    ) -> Result<bool, ProbeError> {
        for locator in selectors {
            if let Some(frame) = probe.locate(locator).await? {
                probe.enter_frame(frame).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Copy the active context's markup.
    pub async fn snapshot<P: Probe>(&self, probe: &mut P) -> Result<Snapshot, ProbeError> {
        let html = probe.content().await?;
        Ok(Snapshot {
            context: self.active,
            html,
        })
    }

    /// Best-effort click on every known close/dismiss control.
    ///
    /// Each control gets a sub-second budget and all failures are ignored.
    pub async fn dismiss_overlays<P: Probe>(&self, probe: &mut P) {
        let Some(overlays) = &self.overlays else {
            return;
        };
        let budget = PollBudget::within(self.timing.overlay_timeout, self.timing.poll_interval);
        for locator in overlays {
            if self.cancel.is_cancelled() {
                return;
            }
            let single = CandidateSet::single(locator.clone());
            let dismissed = async {
                let (_, element) = locate_first(probe, &single, budget, &self.cancel).await?;
                wait_for(probe, &element, Readiness::Clickable, budget, &self.cancel).await?;
                probe.forced_click(&element).await
            }
            .await;
            match dismissed {
                Ok(()) => {
                    debug!(target: "crawl.context", overlay = %locator, "dismissed overlay");
                    probe.pause(OVERLAY_SETTLE).await;
                }
                Err(e) => trace!(target: "crawl.context", overlay = %locator, error = %e, "overlay not dismissed"),
            }
        }
    }
}

fn boundary_name(boundary: &Boundary) -> String {
    match boundary {
        Boundary::Frame(selectors) => format!("frame {selectors}"),
        Boundary::Window => "secondary window".to_string(),
    }
}

async fn try_enter_newest_window<P: Probe>(probe: &mut P) -> Result<bool, ProbeError> {
    let count = probe.window_count().await?;
    if count < 2 {
        return Ok(false);
    }
    probe.enter_window(count - 1).await?;
    Ok(true)
}

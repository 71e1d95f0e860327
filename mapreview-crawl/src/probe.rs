//! The browsing seam.
//!
//! [`Probe`] is the only way the crawl core touches a live document. The
//! WebDriver implementation lives in [`crate::browser`]; tests drive the core
//! through the scripted probe in `testing`.

use crate::candidate::CandidateSet;
use async_trait::async_trait;
use mapreview_common::{Locator, ProbeError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A viewport coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Primitive operations against the active browsing context.
///
/// Implementations never retry on their own: one call is one attempt, and
/// failures are reported as a classified [`ProbeError`].
#[async_trait]
pub trait Probe: Send {
    /// Handle to a live element. Handles may go stale at any time.
    type Element: Clone + Send + Sync;

    async fn navigate(&mut self, url: &str) -> Result<(), ProbeError>;

    /// Look up one element in the active context; `Ok(None)` when absent.
    async fn locate(&mut self, locator: &Locator) -> Result<Option<Self::Element>, ProbeError>;

    async fn is_visible(&mut self, element: &Self::Element) -> Result<bool, ProbeError>;

    async fn is_clickable(&mut self, element: &Self::Element) -> Result<bool, ProbeError>;

    async fn center_point(&mut self, element: &Self::Element) -> Result<Point, ProbeError>;

    /// The topmost element at `point`, if any.
    async fn hit_test(&mut self, point: Point) -> Result<Option<Self::Element>, ProbeError>;

    /// Whether `inner` is `outer` itself or one of its descendants.
    async fn encloses(
        &mut self,
        outer: &Self::Element,
        inner: &Self::Element,
    ) -> Result<bool, ProbeError>;

    async fn scroll_into_center(&mut self, element: &Self::Element) -> Result<(), ProbeError>;

    async fn hover(&mut self, element: &Self::Element) -> Result<(), ProbeError>;

    async fn click(&mut self, element: &Self::Element) -> Result<(), ProbeError>;

    /// Activate the element without going through hit-testing.
    async fn forced_click(&mut self, element: &Self::Element) -> Result<(), ProbeError>;

    /// Replace the element's value with `text`.
    async fn type_text(&mut self, element: &Self::Element, text: &str) -> Result<(), ProbeError>;

    /// Press Enter in the element.
    async fn submit(&mut self, element: &Self::Element) -> Result<(), ProbeError>;

    async fn scroll_by(&mut self, dy: i64) -> Result<(), ProbeError>;

    /// Serialized markup of the active context.
    async fn content(&mut self) -> Result<String, ProbeError>;

    /// Make the top-level document of the main window active.
    async fn enter_root(&mut self) -> Result<(), ProbeError>;

    async fn enter_frame(&mut self, frame: Self::Element) -> Result<(), ProbeError>;

    async fn window_count(&mut self) -> Result<usize, ProbeError>;

    async fn enter_window(&mut self, index: usize) -> Result<(), ProbeError>;

    async fn close_secondary_windows(&mut self) -> Result<(), ProbeError>;

    /// Suspend for `duration`. Every wait in the core goes through here.
    async fn pause(&mut self, duration: Duration);
}

/// A bounded poll: `attempts` checks spaced `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub attempts: u32,
    pub interval: Duration,
}

impl PollBudget {
    /// Enough polls of `interval` to cover `timeout`, at least one.
    ///
    /// ```
    /// use mapreview_crawl::probe::PollBudget;
    /// use std::time::Duration;
    ///
    /// let b = PollBudget::within(Duration::from_secs(4), Duration::from_millis(250));
    /// assert_eq!(b.attempts, 17);
    /// assert_eq!(PollBudget::within(Duration::ZERO, Duration::from_millis(250)).attempts, 1);
    /// ```
    pub fn within(timeout: Duration, interval: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let polls = timeout.as_millis() / interval_ms;
        Self {
            attempts: u32::try_from(polls).unwrap_or(u32::MAX).saturating_add(1),
            interval,
        }
    }
}

/// Sleep between polls, then bail out if the run was cancelled meanwhile.
async fn next_poll<P: Probe>(
    probe: &mut P,
    poll: u32,
    budget: PollBudget,
    cancel: &CancellationToken,
    waiting_for: impl FnOnce() -> String,
) -> Result<(), ProbeError> {
    if poll > 0 {
        probe.pause(budget.interval).await;
    }
    if cancel.is_cancelled() {
        return Err(ProbeError::Cancelled(waiting_for()));
    }
    Ok(())
}

/// Poll until some candidate is present; the earliest candidate wins on each
/// poll. Returns `NotFound` once the budget is spent, `Cancelled` as soon as
/// `cancel` fires.
pub async fn locate_first<P: Probe>(
    probe: &mut P,
    set: &CandidateSet<Locator>,
    budget: PollBudget,
    cancel: &CancellationToken,
) -> Result<(usize, P::Element), ProbeError> {
    for poll in 0..budget.attempts {
        next_poll(probe, poll, budget, cancel, || set.to_string()).await?;
        for (index, locator) in set.iter().enumerate() {
            if let Some(element) = probe.locate(locator).await? {
                return Ok((index, element));
            }
        }
    }
    Err(ProbeError::NotFound(set.to_string()))
}

/// A condition on a located element that the click protocol waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    Visible,
    Clickable,
}

/// Poll until `element` meets `readiness`; `Timeout` once the budget is spent.
pub(crate) async fn wait_for<P: Probe>(
    probe: &mut P,
    element: &P::Element,
    readiness: Readiness,
    budget: PollBudget,
    cancel: &CancellationToken,
) -> Result<(), ProbeError> {
    for poll in 0..budget.attempts {
        next_poll(probe, poll, budget, cancel, || format!("{readiness:?}").to_lowercase()).await?;
        let ready = match readiness {
            Readiness::Visible => probe.is_visible(element).await?,
            Readiness::Clickable => probe.is_clickable(element).await?,
        };
        if ready {
            return Ok(());
        }
    }
    Err(ProbeError::Timeout(format!("element to become {readiness:?}").to_lowercase()))
}

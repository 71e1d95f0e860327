//! The safe-click protocol.
//!
//! Clicks on map UIs race with animations, lazy loads and consent overlays,
//! so no click in the crawler is issued directly. [`SafeInteractor::click`]
//! runs locate, visible, occlusion check, clickable and click as one attempt,
//! re-locating from scratch on every retry, and always answers with an
//! [`InteractionOutcome`].

use crate::candidate::CandidateSet;
use crate::context::DocumentContext;
use crate::diagnostics::Diagnostics;
use crate::probe::{locate_first, wait_for, PollBudget, Probe, Readiness};
use mapreview_common::{Locator, ProbeError};
use mapreview_config::ClickConfig;
use rand::Rng;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const OCCLUSION_SETTLE: Duration = Duration::from_millis(150);

/// Result of one safe-click invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionOutcome {
    Succeeded,
    ExhaustedRetries,
    NotFound,
}

impl InteractionOutcome {
    pub fn is_success(self) -> bool {
        self == Self::Succeeded
    }
}

impl fmt::Display for InteractionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Succeeded => "succeeded",
            Self::ExhaustedRetries => "exhausted retries",
            Self::NotFound => "not found",
        })
    }
}

/// Budgets and pacing of the click protocol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionPolicy {
    /// Total number of attempts.
    pub retries: u32,
    /// Per-step wait within one attempt.
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Fall back to a script click when a direct click is intercepted.
    pub forced_fallback: bool,
    /// Pixels scrolled before a retry.
    pub scroll_step: i64,
    pub backoff_base: Duration,
    pub backoff_step: Duration,
    pub settle_min: Duration,
    pub settle_max: Duration,
}

impl Default for InteractionPolicy {
    fn default() -> Self {
        Self {
            retries: 4,
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
            forced_fallback: true,
            scroll_step: 140,
            backoff_base: Duration::from_millis(200),
            backoff_step: Duration::from_millis(200),
            settle_min: Duration::from_millis(250),
            settle_max: Duration::from_millis(500),
        }
    }
}

impl InteractionPolicy {
    /// Default pacing with the budget of a configured click kind.
    pub fn from_click(click: ClickConfig, poll_interval: Duration) -> Self {
        Self {
            retries: click.retries,
            timeout: Duration::from_millis(click.timeout_ms),
            poll_interval,
            ..Self::default()
        }
    }

    /// Wait before attempt `attempt + 1`.
    ///
    /// ```
    /// use mapreview_crawl::interactor::InteractionPolicy;
    /// use std::time::Duration;
    ///
    /// let p = InteractionPolicy::default();
    /// assert_eq!(p.backoff(1), Duration::from_millis(400));
    /// assert_eq!(p.backoff(3), Duration::from_millis(800));
    /// ```
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base + self.backoff_step * attempt
    }

    fn step_budget(&self) -> PollBudget {
        PollBudget::within(self.timeout, self.poll_interval)
    }

    fn settle(&self) -> Duration {
        if self.settle_max <= self.settle_min {
            return self.settle_min;
        }
        rand::thread_rng().gen_range(self.settle_min..=self.settle_max)
    }
}

/// Runs the safe-click protocol under one policy.
#[derive(Debug, Clone)]
pub struct SafeInteractor {
    policy: InteractionPolicy,
    cancel: CancellationToken,
    diagnostics: Option<Diagnostics>,
}

impl SafeInteractor {
    pub fn new(policy: InteractionPolicy) -> Self {
        Self {
            policy,
            cancel: CancellationToken::new(),
            diagnostics: None,
        }
    }

    /// Stop retrying once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Save the active context's markup when a click gives up.
    pub fn with_diagnostics(mut self, diagnostics: Option<Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn policy(&self) -> &InteractionPolicy {
        &self.policy
    }

    /// Click the first present candidate of `targets` within the active context.
    ///
    /// Never fails: transient errors are retried within the attempt budget,
    /// anything else ends the invocation early.
    pub async fn click<P: Probe>(
        &self,
        probe: &mut P,
        ctx: &DocumentContext,
        targets: &CandidateSet<Locator>,
        label: &str,
    ) -> InteractionOutcome {
        let retries = self.policy.retries;
        let mut last_error: Option<ProbeError> = None;

        for attempt in 1..=retries {
            if self.cancel.is_cancelled() {
                debug!(target: "crawl.click", label, attempt, "cancelled before attempt");
                break;
            }
            match self.attempt(probe, ctx, targets).await {
                Ok(index) => {
                    probe.pause(self.policy.settle()).await;
                    info!(target: "crawl.click", label, attempt, candidate = index, "click succeeded");
                    return InteractionOutcome::Succeeded;
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        target: "crawl.click",
                        label,
                        attempt,
                        retries,
                        kind = e.kind(),
                        "click attempt failed, retrying"
                    );
                    last_error = Some(e);
                    if attempt == retries || self.cancel.is_cancelled() {
                        break;
                    }
                    ctx.dismiss_overlays(probe).await;
                    if let Err(e) = probe.scroll_by(self.policy.scroll_step).await {
                        debug!(target: "crawl.click", error = %e, "scroll before retry failed");
                    }
                    probe.pause(self.policy.backoff(attempt)).await;
                }
                Err(e) => {
                    warn!(target: "crawl.click", label, attempt, kind = e.kind(), error = %e, "click aborted");
                    last_error = Some(e);
                    break;
                }
            }
        }

        let outcome = match last_error {
            Some(ProbeError::NotFound(_)) => InteractionOutcome::NotFound,
            _ => InteractionOutcome::ExhaustedRetries,
        };
        warn!(
            target: "crawl.click",
            label,
            %outcome,
            error = last_error.as_ref().map(|e| e.to_string()),
            "click gave up"
        );
        if let Some(diagnostics) = &self.diagnostics {
            match probe.content().await {
                Ok(html) => diagnostics.capture_quietly(&format!("click_{label}"), &html),
                Err(e) => debug!(target: "crawl.click", error = %e, "no content to capture"),
            }
        }
        outcome
    }

    /// One pass through the protocol. Returns the winning candidate index.
    async fn attempt<P: Probe>(
        &self,
        probe: &mut P,
        ctx: &DocumentContext,
        targets: &CandidateSet<Locator>,
    ) -> Result<usize, ProbeError> {
        let budget = self.policy.step_budget();

        let (index, element) = locate_first(probe, targets, budget, &self.cancel).await?;
        wait_for(probe, &element, Readiness::Visible, budget, &self.cancel).await?;
        bring_into_view(probe, &element).await?;

        if is_occluded(probe, &element).await {
            debug!(target: "crawl.click", candidate = index, "target occluded, dismissing overlays");
            ctx.dismiss_overlays(probe).await;
            probe.pause(OCCLUSION_SETTLE).await;
        }

        wait_for(probe, &element, Readiness::Clickable, budget, &self.cancel).await?;
        bring_into_view(probe, &element).await?;

        match probe.click(&element).await {
            Ok(()) => Ok(index),
            Err(ProbeError::Intercepted(reason)) if self.policy.forced_fallback => {
                debug!(target: "crawl.click", %reason, "direct click intercepted, forcing");
                probe.forced_click(&element).await?;
                Ok(index)
            }
            Err(e) => Err(e),
        }
    }
}

/// Center the element and hover it. Hover failures are ignored.
async fn bring_into_view<P: Probe>(probe: &mut P, element: &P::Element) -> Result<(), ProbeError> {
    probe.scroll_into_center(element).await?;
    if let Err(e) = probe.hover(element).await {
        debug!(target: "crawl.click", error = %e, "hover failed");
    }
    Ok(())
}

/// Whether something other than the element or its descendants sits at its
/// center. Probe errors count as "not occluded".
async fn is_occluded<P: Probe>(probe: &mut P, element: &P::Element) -> bool {
    let Ok(center) = probe.center_point(element).await else {
        return false;
    };
    match probe.hit_test(center).await {
        Ok(Some(top)) => !probe.encloses(element, &top).await.unwrap_or(true),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Boundary, ContextTiming, Scope};
    use crate::testing::{ScriptedElement, ScriptedProbe};

    const TARGET: &str = "a.place_bluelink";
    const OVERLAY: &str = "//button[@aria-label='닫기']";

    fn policy(retries: u32) -> InteractionPolicy {
        InteractionPolicy {
            retries,
            timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(50),
            ..InteractionPolicy::default()
        }
    }

    fn context() -> DocumentContext {
        let overlays = CandidateSet::single(Locator::xpath(OVERLAY));
        DocumentContext::new(
            None,
            Scope {
                boundary: Boundary::Window,
                optional: false,
            },
            Some(overlays),
            ContextTiming::default(),
        )
    }

    fn targets() -> CandidateSet<Locator> {
        CandidateSet::new("result", vec![Locator::css("a.missing"), Locator::css(TARGET)]).unwrap()
    }

    #[tokio::test]
    async fn succeeds_first_try_and_settles() {
        let mut probe = ScriptedProbe::new();
        probe.add_element(ScriptedElement::new(Locator::css(TARGET)));
        let outcome = SafeInteractor::new(policy(3)).click(&mut probe, &context(), &targets(), "result").await;
        assert_eq!(outcome, InteractionOutcome::Succeeded);
        assert_eq!(probe.clicks(TARGET), 1);
        let settle = *probe.pauses().last().unwrap();
        assert!(settle >= Duration::from_millis(250) && settle <= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn recovers_after_transient_failures_within_budget() {
        for m in 0..4u32 {
            let mut probe = ScriptedProbe::new();
            let failures = (0..m).map(|i| {
                if i % 2 == 0 {
                    ProbeError::Stale("re-rendered".into())
                } else {
                    ProbeError::Timeout("animation".into())
                }
            });
            probe.add_element(ScriptedElement::new(Locator::css(TARGET)).click_failures(failures));
            let outcome = SafeInteractor::new(policy(4)).click(&mut probe, &context(), &targets(), "result").await;
            assert_eq!(outcome, InteractionOutcome::Succeeded, "m = {m}");
            assert_eq!(probe.clicks(TARGET), m as usize + 1);
        }
    }

    #[tokio::test]
    async fn as_many_failures_as_attempts_exhausts_the_budget() {
        let mut probe = ScriptedProbe::new();
        let failures = (0..4).map(|_| ProbeError::Stale("re-rendered".into()));
        probe.add_element(ScriptedElement::new(Locator::css(TARGET)).click_failures(failures));
        let outcome = SafeInteractor::new(policy(4)).click(&mut probe, &context(), &targets(), "result").await;
        assert_eq!(outcome, InteractionOutcome::ExhaustedRetries);
        assert_eq!(probe.clicks(TARGET), 4);
        assert_eq!(probe.scrolls().len(), 3);
    }

    #[tokio::test]
    async fn indefinite_interception_exhausts_exactly_the_budget() {
        let mut probe = ScriptedProbe::new();
        probe.add_element(ScriptedElement::new(Locator::css(TARGET)).always_intercepted());
        let outcome = SafeInteractor::new(policy(3)).click(&mut probe, &context(), &targets(), "result").await;
        assert_eq!(outcome, InteractionOutcome::ExhaustedRetries);
        assert_eq!(probe.clicks(TARGET), 3);
        assert_eq!(probe.forced_clicks(TARGET), 3);
        assert_eq!(probe.scrolls(), vec![140, 140]);
    }

    #[tokio::test]
    async fn backoff_grows_with_attempt() {
        let mut probe = ScriptedProbe::new();
        probe.add_element(ScriptedElement::new(Locator::css(TARGET)).always_intercepted());
        SafeInteractor::new(policy(3)).click(&mut probe, &context(), &targets(), "result").await;
        let pauses = probe.pauses();
        assert!(pauses.contains(&Duration::from_millis(400)));
        assert!(pauses.contains(&Duration::from_millis(600)));
        assert!(!pauses.contains(&Duration::from_millis(800)));
    }

    #[tokio::test]
    async fn intercepted_click_falls_back_to_forced_click() {
        let mut probe = ScriptedProbe::new();
        probe.add_element(
            ScriptedElement::new(Locator::css(TARGET))
                .click_failures([ProbeError::Intercepted("banner".into())]),
        );
        let outcome = SafeInteractor::new(policy(1)).click(&mut probe, &context(), &targets(), "result").await;
        assert_eq!(outcome, InteractionOutcome::Succeeded);
        assert_eq!(probe.forced_clicks(TARGET), 1);
    }

    #[tokio::test]
    async fn occlusion_dismisses_overlays_before_clicking() {
        let mut probe = ScriptedProbe::new();
        probe.add_element(ScriptedElement::new(Locator::css(TARGET)).occluded(1));
        probe.add_element(ScriptedElement::new(Locator::xpath(OVERLAY)));
        let outcome = SafeInteractor::new(policy(2)).click(&mut probe, &context(), &targets(), "result").await;
        assert_eq!(outcome, InteractionOutcome::Succeeded);
        assert_eq!(probe.forced_clicks(OVERLAY), 1);
        assert_eq!(probe.clicks(TARGET), 1);
    }

    #[tokio::test]
    async fn absent_target_reports_not_found() {
        let mut probe = ScriptedProbe::new();
        let outcome = SafeInteractor::new(policy(2)).click(&mut probe, &context(), &targets(), "result").await;
        assert_eq!(outcome, InteractionOutcome::NotFound);
    }

    #[tokio::test]
    async fn fatal_error_aborts_without_retrying() {
        let mut probe = ScriptedProbe::new();
        probe.add_element(
            ScriptedElement::new(Locator::css(TARGET))
                .click_failures([ProbeError::Backend("session lost".into())]),
        );
        let outcome = SafeInteractor::new(policy(4)).click(&mut probe, &context(), &targets(), "result").await;
        assert_eq!(outcome, InteractionOutcome::ExhaustedRetries);
        assert_eq!(probe.clicks(TARGET), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_retries() {
        let mut probe = ScriptedProbe::new();
        probe.add_element(ScriptedElement::new(Locator::css(TARGET)));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = SafeInteractor::new(policy(4))
            .with_cancellation(cancel)
            .click(&mut probe, &context(), &targets(), "result")
            .await;
        assert_eq!(outcome, InteractionOutcome::ExhaustedRetries);
        assert_eq!(probe.clicks(TARGET), 0);
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_running_poll() {
        let cancel = CancellationToken::new();
        let mut probe = ScriptedProbe::new();
        probe.cancel_on_pause(cancel.clone());
        let outcome = SafeInteractor::new(InteractionPolicy::default())
            .with_cancellation(cancel)
            .click(&mut probe, &context(), &targets(), "result")
            .await;
        assert_eq!(outcome, InteractionOutcome::ExhaustedRetries);
        assert_eq!(probe.paused(), Duration::from_millis(250));
        assert!(probe.scrolls().is_empty());
    }

    #[tokio::test]
    async fn give_up_saves_a_capture() {
        let dir = tempfile::tempdir().unwrap();
        let mut probe = ScriptedProbe::new();
        probe.set_root_html("<html><body>stuck</body></html>");
        let outcome = SafeInteractor::new(policy(1))
            .with_diagnostics(Some(Diagnostics::new(dir.path())))
            .click(&mut probe, &context(), &targets(), "tab")
            .await;
        assert_eq!(outcome, InteractionOutcome::NotFound);
        let captures: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(captures.len(), 1);
    }
}

//! Bounded "show more" expansion.

use crate::candidate::CandidateSet;
use crate::context::DocumentContext;
use crate::interactor::{InteractionOutcome, SafeInteractor};
use crate::probe::Probe;
use mapreview_common::Locator;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What one expansion did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpansionReport {
    /// Successful reveal clicks.
    pub clicks: u32,
    /// Safe-click invocations, including the final unsuccessful one.
    pub attempts: u32,
    /// Whether the loop stopped because `clicks` reached the cap.
    pub capped: bool,
}

/// Repeatedly activates a reveal control until it stops working or a cap is hit.
///
/// The loop performs at most `cap` invocations of the click protocol, so its
/// running time is bounded by `cap` times the protocol's worst case.
#[derive(Debug, Clone)]
pub struct PaginationExpander {
    interactor: SafeInteractor,
    pause_after_reveal: Duration,
    cancel: CancellationToken,
}

impl PaginationExpander {
    pub fn new(interactor: SafeInteractor, pause_after_reveal: Duration) -> Self {
        Self {
            interactor,
            pause_after_reveal,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn expand<P: Probe>(
        &self,
        probe: &mut P,
        ctx: &DocumentContext,
        reveal: &CandidateSet<Locator>,
        cap: u32,
    ) -> ExpansionReport {
        let mut report = ExpansionReport::default();

        while report.clicks < cap {
            if self.cancel.is_cancelled() {
                debug!(target: "crawl.expand", clicks = report.clicks, "expansion cancelled");
                break;
            }
            ctx.dismiss_overlays(probe).await;
            report.attempts += 1;
            match self.interactor.click(probe, ctx, reveal, "reveal").await {
                InteractionOutcome::Succeeded => {
                    report.clicks += 1;
                    debug!(target: "crawl.expand", clicks = report.clicks, cap, "revealed more");
                    probe.pause(self.pause_after_reveal).await;
                }
                outcome => {
                    debug!(target: "crawl.expand", %outcome, "reveal control exhausted");
                    break;
                }
            }
        }

        report.capped = report.clicks >= cap;
        info!(
            target: "crawl.expand",
            clicks = report.clicks,
            attempts = report.attempts,
            capped = report.capped,
            "expansion finished"
        );
        report
    }
}

//! Per-target crawl pipeline.
//!
//! Each target runs Search, SelectResult, OpenDetail, SelectTab, Expand and
//! Extract in order. A failure in any stage is logged and recorded against
//! that target only; the run moves on to the next one.

use crate::candidate::CandidateSet;
use crate::context::{ContextId, ContextTiming, DocumentContext};
use crate::diagnostics::Diagnostics;
use crate::expander::{ExpansionReport, PaginationExpander};
use crate::extractor::{Extraction, ExtractionRecord, TolerantExtractor};
use crate::interactor::{InteractionOutcome, InteractionPolicy, SafeInteractor};
use crate::probe::{locate_first, PollBudget, Probe};
use crate::profile::SiteProfile;
use mapreview_common::{Locator, ProbeError};
use mapreview_config::CrawlConfig;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const REVEAL_PAUSE: Duration = Duration::from_millis(400);

/// An entity to search for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Append-only, ordered records of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    records: Vec<ExtractionRecord>,
}

impl ResultSet {
    fn append(&mut self, records: Vec<ExtractionRecord>) {
        self.records.extend(records);
    }

    pub fn records(&self) -> &[ExtractionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<ExtractionRecord> {
        self.records
    }
}

/// Pipeline stage of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Search,
    SelectResult,
    OpenDetail,
    SelectTab,
    Expand,
    Extract,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Search => "search",
            Self::SelectResult => "select_result",
            Self::OpenDetail => "open_detail",
            Self::SelectTab => "select_tab",
            Self::Expand => "expand",
            Self::Extract => "extract",
        })
    }
}

/// Why a target was abandoned.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("{stage}: {source}")]
    Probe {
        stage: Stage,
        #[source]
        source: ProbeError,
    },

    #[error("{stage}: click on {label} {outcome}")]
    Interaction {
        stage: Stage,
        label: &'static str,
        outcome: InteractionOutcome,
    },

    #[error("review tab was clicked but never became active")]
    TabNotConfirmed,

    #[error("cancelled during {0}")]
    Cancelled(Stage),
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Probe { stage, .. } | Self::Interaction { stage, .. } | Self::Cancelled(stage) => *stage,
            Self::TabNotConfirmed => Stage::SelectTab,
        }
    }

    /// Attribute a probe failure to `stage`; a wait cut short by
    /// cancellation is reported as such.
    fn at(stage: Stage) -> impl FnOnce(ProbeError) -> StageError {
        move |source| match source {
            ProbeError::Cancelled(_) => StageError::Cancelled(stage),
            source => StageError::Probe { stage, source },
        }
    }
}

/// What happened to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetStatus {
    Extracted {
        records: usize,
        noise_dropped: usize,
        contentless_dropped: usize,
        expansion: ExpansionReport,
    },
    Failed(StageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub target: String,
    pub status: TargetStatus,
}

/// Outcome of a whole run. `results` holds everything extracted before the
/// run ended, including when it was cancelled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub results: ResultSet,
    pub reports: Vec<TargetReport>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.status, TargetStatus::Failed(_)))
            .count()
    }
}

/// Waits, budgets and pauses of the pipeline.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Presence waits outside the click protocol.
    pub wait: PollBudget,
    pub context: ContextTiming,
    pub submit: InteractionPolicy,
    pub result: InteractionPolicy,
    pub tab: InteractionPolicy,
    pub reveal: InteractionPolicy,
    pub max_reveal_clicks: u32,
    pub reveal_pause: Duration,
    /// Pause after navigation and after submitting the query.
    pub settle: Duration,
    pub target_pause: Duration,
}

impl CrawlSettings {
    pub fn from_config(cfg: &CrawlConfig) -> Self {
        let poll = Duration::from_millis(cfg.poll_interval_ms);
        Self {
            wait: PollBudget::within(Duration::from_secs(cfg.wait_secs), poll),
            context: ContextTiming {
                boundary_polls: PollBudget {
                    attempts: cfg.frame_poll_attempts,
                    interval: Duration::from_millis(cfg.frame_poll_interval_ms),
                },
                overlay_timeout: Duration::from_millis(cfg.overlay_timeout_ms),
                poll_interval: poll,
            },
            submit: InteractionPolicy::from_click(cfg.submit_click, poll),
            result: InteractionPolicy::from_click(cfg.result_click, poll),
            tab: InteractionPolicy::from_click(cfg.tab_click, poll),
            reveal: InteractionPolicy::from_click(cfg.reveal_click, poll),
            max_reveal_clicks: cfg.max_reveal_clicks,
            reveal_pause: REVEAL_PAUSE,
            settle: Duration::from_millis(cfg.settle_ms),
            target_pause: Duration::from_millis(cfg.target_pause_ms),
        }
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self::from_config(&CrawlConfig::default())
    }
}

/// Drives the pipeline over a sequence of targets within one session.
#[derive(Debug, Clone)]
pub struct CrawlOrchestrator {
    profile: SiteProfile,
    settings: CrawlSettings,
    extractor: TolerantExtractor,
    cancel: CancellationToken,
    diagnostics: Option<Diagnostics>,
}

impl CrawlOrchestrator {
    pub fn new(profile: SiteProfile, settings: CrawlSettings) -> Self {
        let extractor = TolerantExtractor::new(profile.schema.clone());
        Self {
            profile,
            settings,
            extractor,
            cancel: CancellationToken::new(),
            diagnostics: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Option<Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    /// Crawl every target in order and return what was collected.
    pub async fn run<P: Probe>(&self, probe: &mut P, targets: &[Target]) -> RunSummary {
        let mut summary = RunSummary::default();
        let total = targets.len();

        for (index, target) in targets.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if index > 0 {
                if let Err(e) = probe.close_secondary_windows().await {
                    debug!(target: "crawl.run", error = %e, "could not close secondary windows");
                }
                probe.pause(self.settings.target_pause).await;
            }

            info!(target: "crawl.run", index = index + 1, total, name = %target.name, "crawling target");
            let mut ctx = self
                .profile
                .document_context(self.settings.context)
                .with_cancellation(self.cancel.clone());

            let status = match self.crawl_one(probe, &mut ctx, target).await {
                Ok((extraction, expansion)) => {
                    let status = TargetStatus::Extracted {
                        records: extraction.records.len(),
                        noise_dropped: extraction.noise_dropped,
                        contentless_dropped: extraction.contentless_dropped,
                        expansion,
                    };
                    info!(
                        target: "crawl.run",
                        name = %target.name,
                        records = extraction.records.len(),
                        "target done"
                    );
                    summary.results.append(extraction.records);
                    status
                }
                Err(e) => {
                    warn!(
                        target: "crawl.run",
                        name = %target.name,
                        stage = %e.stage(),
                        error = %e,
                        "target failed, moving on"
                    );
                    if let StageError::Cancelled(_) = e {
                        summary.cancelled = true;
                    } else {
                        self.capture(probe, e.stage(), &target.name).await;
                    }
                    TargetStatus::Failed(e)
                }
            };
            summary.reports.push(TargetReport {
                target: target.name.clone(),
                status,
            });
            if summary.cancelled {
                break;
            }
        }

        summary.cancelled |= self.cancel.is_cancelled();
        info!(
            target: "crawl.run",
            records = summary.results.len(),
            targets = summary.reports.len(),
            failed = summary.failed(),
            cancelled = summary.cancelled,
            "run finished"
        );
        summary
    }

    async fn crawl_one<P: Probe>(
        &self,
        probe: &mut P,
        ctx: &mut DocumentContext,
        target: &Target,
    ) -> Result<(Extraction, ExpansionReport), StageError> {
        self.checkpoint(Stage::Search)?;
        self.search(probe, ctx, target).await?;

        self.checkpoint(Stage::SelectResult)?;
        ctx.switch_to(probe, ContextId::Search)
            .await
            .map_err(StageError::at(Stage::SelectResult))?;
        self.click(probe, ctx, self.settings.result, &self.profile.first_result, Stage::SelectResult, "first result")
            .await?;

        self.checkpoint(Stage::OpenDetail)?;
        ctx.switch_to(probe, ContextId::Detail)
            .await
            .map_err(StageError::at(Stage::OpenDetail))?;
        ctx.dismiss_overlays(probe).await;

        self.checkpoint(Stage::SelectTab)?;
        self.select_tab(probe, ctx).await?;

        self.checkpoint(Stage::Expand)?;
        ctx.switch_to(probe, ContextId::Detail)
            .await
            .map_err(StageError::at(Stage::Expand))?;
        let expansion = match &self.profile.reveal {
            Some(reveal) => {
                let interactor = self.interactor(self.settings.reveal);
                PaginationExpander::new(interactor, self.settings.reveal_pause)
                    .with_cancellation(self.cancel.clone())
                    .expand(probe, ctx, reveal, self.settings.max_reveal_clicks)
                    .await
            }
            None => ExpansionReport::default(),
        };

        self.checkpoint(Stage::Extract)?;
        ctx.switch_to(probe, ContextId::Detail)
            .await
            .map_err(StageError::at(Stage::Extract))?;
        let snapshot = ctx.snapshot(probe).await.map_err(StageError::at(Stage::Extract))?;
        Ok((self.extractor.extract(&snapshot, &target.name), expansion))
    }

    /// Open the site, type the query and submit it.
    async fn search<P: Probe>(
        &self,
        probe: &mut P,
        ctx: &mut DocumentContext,
        target: &Target,
    ) -> Result<(), StageError> {
        let at = StageError::at;
        ctx.switch_to(probe, ContextId::Root).await.map_err(at(Stage::Search))?;
        probe.navigate(&self.profile.home_url).await.map_err(at(Stage::Search))?;
        probe.pause(self.settings.settle).await;

        let (_, input) = locate_first(probe, &self.profile.search_input, self.settings.wait, &self.cancel)
            .await
            .map_err(at(Stage::Search))?;
        let query = self.profile.query_for(&target.name);
        probe.type_text(&input, &query).await.map_err(at(Stage::Search))?;

        match &self.profile.search_submit {
            Some(submit) => {
                self.click(probe, ctx, self.settings.submit, submit, Stage::Search, "search submit")
                    .await?
            }
            None => probe.submit(&input).await.map_err(at(Stage::Search))?,
        }
        debug!(target: "crawl.run", %query, "query submitted");
        probe.pause(self.settings.settle).await;
        Ok(())
    }

    /// Click the review tab.
    ///
    /// With confirmation markers configured, each tab candidate gets its own
    /// click and the next one is tried when the markers never show up.
    async fn select_tab<P: Probe>(
        &self,
        probe: &mut P,
        ctx: &mut DocumentContext,
    ) -> Result<(), StageError> {
        let tabs = &self.profile.review_tab;
        let Some(confirm) = &self.profile.tab_confirm else {
            return self
                .click(probe, ctx, self.settings.tab, tabs, Stage::SelectTab, "review tab")
                .await;
        };

        let mut last = StageError::TabNotConfirmed;
        for (index, tab) in tabs.iter().enumerate() {
            self.checkpoint(Stage::SelectTab)?;
            ctx.switch_to(probe, ContextId::Detail)
                .await
                .map_err(StageError::at(Stage::SelectTab))?;
            let single = CandidateSet::single(tab.clone());
            match self
                .click(probe, ctx, self.settings.tab, &single, Stage::SelectTab, "review tab")
                .await
            {
                Ok(()) => {}
                Err(e @ StageError::Cancelled(_)) => return Err(e),
                Err(e) => {
                    last = e;
                    continue;
                }
            }

            ctx.switch_to(probe, ContextId::Detail)
                .await
                .map_err(StageError::at(Stage::SelectTab))?;
            match locate_first(probe, confirm, self.settings.wait, &self.cancel).await {
                Ok((marker, _)) => {
                    debug!(target: "crawl.run", candidate = index, marker, "review tab confirmed");
                    return Ok(());
                }
                Err(ProbeError::NotFound(_)) => {
                    debug!(target: "crawl.run", candidate = index, tab = %tab, "tab not confirmed, trying next");
                    last = StageError::TabNotConfirmed;
                }
                Err(e) => return Err(StageError::at(Stage::SelectTab)(e)),
            }
        }
        Err(last)
    }

    async fn click<P: Probe>(
        &self,
        probe: &mut P,
        ctx: &DocumentContext,
        policy: InteractionPolicy,
        targets: &CandidateSet<Locator>,
        stage: Stage,
        label: &'static str,
    ) -> Result<(), StageError> {
        match self.interactor(policy).click(probe, ctx, targets, label).await {
            InteractionOutcome::Succeeded => Ok(()),
            _ if self.cancel.is_cancelled() => Err(StageError::Cancelled(stage)),
            outcome => Err(StageError::Interaction {
                stage,
                label,
                outcome,
            }),
        }
    }

    fn interactor(&self, policy: InteractionPolicy) -> SafeInteractor {
        SafeInteractor::new(policy)
            .with_cancellation(self.cancel.clone())
            .with_diagnostics(self.diagnostics.clone())
    }

    fn checkpoint(&self, stage: Stage) -> Result<(), StageError> {
        if self.cancel.is_cancelled() {
            return Err(StageError::Cancelled(stage));
        }
        Ok(())
    }

    async fn capture<P: Probe>(&self, probe: &mut P, stage: Stage, name: &str) {
        let Some(diagnostics) = &self.diagnostics else {
            return;
        };
        if let Ok(html) = probe.content().await {
            diagnostics.capture_quietly(&format!("stage_{stage}_{name}"), &html);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProbe;

    fn orchestrator() -> CrawlOrchestrator {
        let spec = mapreview_config::builtin_site("kakao").unwrap();
        CrawlOrchestrator::new(SiteProfile::from_spec(&spec).unwrap(), CrawlSettings::default())
    }

    #[test]
    fn settings_follow_config() {
        let settings = CrawlSettings::default();
        assert_eq!(settings.result.retries, 3);
        assert_eq!(settings.result.timeout, Duration::from_secs(6));
        assert_eq!(settings.reveal.retries, 2);
        assert_eq!(settings.context.boundary_polls.attempts, 15);
        assert_eq!(settings.target_pause, Duration::from_millis(800));
        assert_eq!(settings.wait.attempts, 61);
    }

    #[test]
    fn stage_error_names_its_stage() {
        let e = StageError::Interaction {
            stage: Stage::SelectResult,
            label: "first result",
            outcome: InteractionOutcome::NotFound,
        };
        assert_eq!(e.to_string(), "select_result: click on first result not found");
        assert_eq!(StageError::TabNotConfirmed.stage(), Stage::SelectTab);
    }

    #[test]
    fn cancelled_wait_is_reported_as_cancellation() {
        let e = StageError::at(Stage::OpenDetail)(ProbeError::Cancelled("frame".to_string()));
        assert!(matches!(e, StageError::Cancelled(Stage::OpenDetail)));
        let e = StageError::at(Stage::OpenDetail)(ProbeError::Timeout("frame".to_string()));
        assert!(matches!(e, StageError::Probe { stage: Stage::OpenDetail, .. }));
    }

    #[tokio::test]
    async fn cancelled_before_start_touches_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut probe = ScriptedProbe::new();
        let summary = orchestrator()
            .with_cancellation(cancel)
            .run(&mut probe, &[Target::from("A"), Target::from("B")])
            .await;
        assert!(summary.cancelled);
        assert!(summary.reports.is_empty());
        assert!(summary.results.is_empty());
        assert!(probe.navigations().is_empty());
    }

    #[tokio::test]
    async fn missing_search_box_fails_only_that_stage() {
        let mut probe = ScriptedProbe::new();
        let summary = orchestrator().run(&mut probe, &[Target::from("A")]).await;
        assert!(!summary.cancelled);
        assert_eq!(summary.failed(), 1);
        match &summary.reports[0].status {
            TargetStatus::Failed(e) => assert_eq!(e.stage(), Stage::Search),
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(probe.navigations(), vec!["https://map.kakao.com/".to_string()]);
    }
}

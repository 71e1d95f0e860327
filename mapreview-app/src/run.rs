use anyhow::{Context, Result, bail};
use mapreview_common::MapReviewError;
use mapreview_config::MapReviewConfig;
use mapreview_crawl::diagnostics::Diagnostics;
use mapreview_crawl::sink::SinkReport;
use mapreview_crawl::{CrawlOrchestrator, CrawlSettings, CsvSink, RecordSink, SiteProfile, Target};
use mapreview_drivers::map_browser::driver::MapDriver;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Crawl every configured target in one browser session and write the
/// collected records, including after cancellation.
pub async fn crawl(cfg: MapReviewConfig, cancel: CancellationToken) -> Result<SinkReport> {
    let spec = cfg.site.resolve().context("resolving site profile")?;
    let profile = SiteProfile::from_spec(&spec).map_err(|e| MapReviewError::Profile(e.to_string()))?;

    let targets: Vec<Target> = cfg
        .targets
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(Target::from)
        .collect();
    if targets.is_empty() {
        bail!(MapReviewError::Config(
            "no targets: set `targets:` in the config or pass --target".to_string()
        ));
    }

    let driver = MapDriver::new(&cfg.browser)
        .await
        .map_err(|e| MapReviewError::SessionUnavailable(format!("{e:#}")))?;
    let mut page = match driver.page().await {
        Ok(page) => page,
        Err(e) => {
            log_close_failure(driver.close().await);
            return Err(MapReviewError::SessionUnavailable(format!("{e:#}")).into());
        }
    };

    info!(
        target: "crawl.run",
        site = %profile.name,
        targets = targets.len(),
        "starting crawl"
    );
    let orchestrator = CrawlOrchestrator::new(profile, CrawlSettings::from_config(&cfg.crawl))
        .with_cancellation(cancel)
        .with_diagnostics(cfg.debug.capture_dir.clone().map(Diagnostics::new));
    let summary = orchestrator.run(&mut page, &targets).await;

    drop(page);
    log_close_failure(driver.close().await);

    let mut sink = CsvSink::new(&cfg.output.dir, &cfg.output.file_prefix);
    let report = sink.write(summary.results.records())?;
    info!(
        target: "crawl.run",
        location = %report.location,
        records = report.records,
        failed = summary.failed(),
        cancelled = summary.cancelled,
        "crawl finished"
    );
    Ok(report)
}

/// A session that fails to close is not worth failing the run over.
fn log_close_failure(result: Result<()>) {
    if let Err(e) = result {
        warn!(target: "crawl.run", error = %format!("{e:#}"), "closing browser session failed");
    }
}

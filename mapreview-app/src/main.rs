use anyhow::{Context, Result};
use clap::Parser;
use mapreview_common::observability::init_logging;
use mapreview_config::{MapReviewConfig, MapReviewConfigLoader, SiteSelection};
use mapreview_runtime::MapReviewRuntime;
use std::path::PathBuf;
use std::time::Duration;
mod run;

/// Crawl place reviews from a map site into a CSV file.
#[derive(Debug, Parser)]
#[command(name = "mapreview", version)]
struct Cli {
    /// YAML config; ignored when the file does not exist.
    #[arg(short, long, env = "MAPREVIEW_CONFIG", default_value = "mapreview.yaml")]
    config: PathBuf,

    /// Built-in site profile (`naver` or `kakao`).
    #[arg(long)]
    site: Option<String>,

    /// Place to crawl; repeat for several. Replaces the configured targets.
    #[arg(short, long = "target", value_name = "NAME")]
    targets: Vec<String>,

    /// Run the browser without a window.
    #[arg(long)]
    headless: bool,

    /// Directory for the CSV output.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Save HTML captures of failed clicks and stages here.
    #[arg(long)]
    capture_dir: Option<PathBuf>,
}

impl Cli {
    /// Flags win over file and environment values.
    fn apply(self, cfg: &mut MapReviewConfig) -> Result<()> {
        if let Some(site) = self.site {
            mapreview_config::builtin_site(&site)?;
            cfg.site = SiteSelection::Builtin(site);
        }
        if !self.targets.is_empty() {
            cfg.targets = self.targets;
        }
        if self.headless {
            cfg.browser.headless = true;
        }
        if let Some(dir) = self.output_dir {
            cfg.output.dir = dir;
        }
        if let Some(dir) = self.capture_dir {
            cfg.debug.capture_dir = Some(dir);
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1) Load config (env wins over file, flags win over both)
    let mut cfg = MapReviewConfigLoader::new()
        .with_optional_file(&cli.config)
        .load()
        .with_context(|| format!("loading {}", cli.config.display()))?;
    cli.apply(&mut cfg)?;

    let log_path = init_logging(cfg.logging.clone())?;
    tracing::debug!(path = %log_path.display(), "logging initialised");

    let runtime = MapReviewRuntime::build("mapreview", None)?;
    runtime.cancel_on_ctrl_c();
    let cancel = runtime.handle().cancellation();

    let outcome = runtime.block_on(run::crawl(cfg, cancel));
    runtime.shutdown(Duration::from_secs(2));

    let report = outcome?;
    println!("{} records -> {}", report.records, report.location);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "mapreview",
            "--site",
            "kakao",
            "--target",
            "성화해장국 인하점",
            "-t",
            "인하반점",
            "--headless",
            "--output-dir",
            "/tmp/out",
        ]);
        let mut cfg = MapReviewConfigLoader::new()
            .with_yaml_str("targets: [ignored]")
            .load()
            .unwrap();
        cli.apply(&mut cfg).unwrap();

        assert!(matches!(cfg.site, SiteSelection::Builtin(ref s) if s == "kakao"));
        assert_eq!(cfg.targets, vec!["성화해장국 인하점", "인하반점"]);
        assert!(cfg.browser.headless);
        assert_eq!(cfg.output.dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn unknown_site_flag_is_rejected() {
        let cli = Cli::parse_from(["mapreview", "--site", "daum"]);
        let mut cfg = MapReviewConfigLoader::new().load().unwrap();
        assert!(cli.apply(&mut cfg).is_err());
    }
}

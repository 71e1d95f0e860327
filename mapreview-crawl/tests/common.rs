#![allow(dead_code)]

use std::sync::OnceLock;

use mapreview_common::observability::{LogConfig, LogFormat};
use mapreview_config::SiteSpec;
use mapreview_crawl::testing::{Handle, ScriptedElement, ScriptedProbe};

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let config = LogConfig {
            app_name: "mapreview-tests".to_string(),
            log_dir: Some(std::env::temp_dir().join("mapreview-tests")),
            emit_stderr: true,
            format: if std::env::var("MAPREVIEW_LOG_FORMAT")
                .map(|raw| raw.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(false)
            {
                LogFormat::Json
            } else {
                LogFormat::Text
            },
            default_filter: "debug".to_string(),
        };

        mapreview_common::observability::init_logging(config).unwrap_or_default()
    });
}

pub fn fixture(name: &str) -> String {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("fixture {}: {e}", path.display()))
}

/// The naver map page without a review tab: search box in the root, results
/// in `#searchIframe`, details in a routed `#entryIframe` whose handle is
/// returned.
pub fn naver_frames(spec: &SiteSpec) -> (ScriptedProbe, Handle) {
    let mut probe = ScriptedProbe::new();
    probe.add_element(ScriptedElement::new(spec.search_input[0].clone()));
    let results = probe.add_frame("#searchIframe", "<html><body><ul class='results'></ul></body></html>");
    probe.add_element(ScriptedElement::new(spec.first_result[0].clone()).inside(results));
    let entry = probe.add_routed_frame("#entryIframe");
    (probe, entry)
}

/// [`naver_frames`] plus the first review tab and its confirmation marker
/// inside the detail frame.
pub fn naver_session(spec: &SiteSpec) -> (ScriptedProbe, Handle) {
    let (mut probe, entry) = naver_frames(spec);
    probe.add_element(ScriptedElement::new(spec.review_tab[0].clone()).inside(entry));
    probe.add_element(ScriptedElement::new(spec.tab_confirm[0].clone()).inside(entry));
    (probe, entry)
}

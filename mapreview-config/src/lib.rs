//! Loader for crawl configuration with YAML + environment overlays.
//!
//! A config names the targets to crawl, the site profile to crawl them with,
//! and the knobs of the browser session, click protocol, output and logging.
//! Sources are merged in the order they are added; `MAPREVIEW__`-prefixed
//! environment variables (with `__` as the nesting separator) are applied on
//! top, and `${VAR}` placeholders are expanded before deserialization.
//!
//! Site profiles are either one of the built-ins shipped in `profiles/`
//! (`naver`, `kakao`) or an inline [`SiteSpec`].
use config::{Config, ConfigError, Environment, File};
use mapreview_common::observability::LogConfig;
use mapreview_common::{BrowserSettings, Locator};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

const NAVER_PROFILE: &str = include_str!("../profiles/naver.yaml");
const KAKAO_PROFILE: &str = include_str!("../profiles/kakao.yaml");

#[derive(Debug, Deserialize)]
pub struct MapReviewConfig {
    pub version: Option<String>,
    /// Place names to search for, in crawl order.
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub site: SiteSelection,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LogConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

/// Either the name of a built-in profile or a full inline profile.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SiteSelection {
    Builtin(String),
    Inline(Box<SiteSpec>),
}

impl Default for SiteSelection {
    fn default() -> Self {
        Self::Builtin("naver".to_string())
    }
}

impl SiteSelection {
    /// Materialise the selected profile.
    pub fn resolve(&self) -> Result<SiteSpec, ConfigError> {
        match self {
            Self::Builtin(name) => builtin_site(name),
            Self::Inline(spec) => Ok((**spec).clone()),
        }
    }
}

/// Look up a built-in site profile by name.
///
/// ```
/// let naver = mapreview_config::builtin_site("naver").unwrap();
/// assert_eq!(naver.name, "naver");
/// assert!(mapreview_config::builtin_site("daum").is_err());
/// ```
pub fn builtin_site(name: &str) -> Result<SiteSpec, ConfigError> {
    let raw = match name.to_ascii_lowercase().as_str() {
        "naver" => NAVER_PROFILE,
        "kakao" => KAKAO_PROFILE,
        other => {
            return Err(ConfigError::Message(format!(
                "unknown site profile `{other}` (expected naver or kakao)"
            )));
        }
    };
    // Locators are written as `{css: ...}` maps, which serde_yaml only accepts
    // for enums as `!css` tags; go through a JSON value like `load` does.
    let value: Value =
        serde_yaml::from_str(raw).map_err(|e| ConfigError::Message(format!("{name}: {e}")))?;
    serde_json::from_value(value).map_err(|e| ConfigError::Message(format!("{name}: {e}")))
}

/// Everything the crawler needs to know about one map site.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteSpec {
    pub name: String,
    pub home_url: String,
    /// Query typed into the search box; `{name}` is replaced by the target.
    #[serde(default = "default_query_template")]
    pub query_template: String,
    pub search_input: Vec<Locator>,
    /// Submit button; when empty the query is submitted with Enter.
    #[serde(default)]
    pub search_submit: Vec<Locator>,
    #[serde(default)]
    pub search_scope: Option<ScopeSpec>,
    pub first_result: Vec<Locator>,
    pub detail_scope: ScopeSpec,
    #[serde(default)]
    pub overlays: Vec<Locator>,
    pub review_tab: Vec<Locator>,
    #[serde(default)]
    pub tab_confirm: Vec<Locator>,
    /// "More" controls; when empty the list is extracted as first rendered.
    #[serde(default)]
    pub reveal: Vec<Locator>,
    pub extraction: ExtractionSpec,
}

fn default_query_template() -> String {
    "{name}".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopeSpec {
    #[serde(flatten)]
    pub boundary: ScopeBoundary,
    /// When set, a missing boundary means "stay in the outer document".
    #[serde(default)]
    pub optional: bool,
}

/// How an embedded context is discovered.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopeBoundary {
    Frame { selectors: Vec<Locator> },
    Window,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionSpec {
    /// Candidate list roots, tried in order.
    pub containers: Vec<String>,
    /// Candidate item selectors within a root, tried in order.
    pub items: Vec<String>,
    /// An item is kept only if its text contains one of these. Empty keeps all.
    #[serde(default)]
    pub noise_keywords: Vec<String>,
    pub fields: FieldsSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldsSpec {
    #[serde(default)]
    pub author: Option<FieldSpec>,
    pub content: FieldSpec,
    #[serde(default)]
    pub date: Option<FieldSpec>,
    #[serde(default)]
    pub tag: Option<FieldSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    pub selectors: Vec<String>,
    #[serde(default)]
    pub min_chars: usize,
    /// Regex the text must match.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Substrings of which the text must contain at least one.
    #[serde(default)]
    pub require_any: Vec<String>,
    /// Prefixes removed from the text before acceptance checks.
    #[serde(default)]
    pub strip: Vec<String>,
    #[serde(default)]
    pub scan: ScanMode,
    /// Separator placed between the element's text nodes. Empty by default,
    /// so `2024.<b>5</b>.12` reads as `2024.5.12`.
    #[serde(default)]
    pub join: String,
}

/// Whether a selector contributes only its first match or any match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    #[default]
    First,
    Any,
}

/// Budget of one kind of click.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ClickConfig {
    pub timeout_ms: u64,
    pub retries: u32,
}

impl ClickConfig {
    const fn new(timeout_ms: u64, retries: u32) -> Self {
        Self {
            timeout_ms,
            retries,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Presence waits outside the click protocol (search box, tab confirmation).
    pub wait_secs: u64,
    pub max_reveal_clicks: u32,
    pub poll_interval_ms: u64,
    pub frame_poll_attempts: u32,
    pub frame_poll_interval_ms: u64,
    pub overlay_timeout_ms: u64,
    pub target_pause_ms: u64,
    pub settle_ms: u64,
    pub submit_click: ClickConfig,
    pub result_click: ClickConfig,
    pub tab_click: ClickConfig,
    pub reveal_click: ClickConfig,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            wait_secs: 15,
            max_reveal_clicks: 30,
            poll_interval_ms: 250,
            frame_poll_attempts: 15,
            frame_poll_interval_ms: 1000,
            overlay_timeout_ms: 800,
            target_pause_ms: 800,
            settle_ms: 1500,
            submit_click: ClickConfig::new(10_000, 4),
            result_click: ClickConfig::new(6_000, 3),
            tab_click: ClickConfig::new(8_000, 3),
            reveal_click: ClickConfig::new(4_000, 2),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub file_prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            file_prefix: "reviews".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Where HTML captures of failed clicks and stages are written.
    pub capture_dir: Option<PathBuf>,
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct MapReviewConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    env_prefix: &'static str,
}

impl Default for MapReviewConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl MapReviewConfigLoader {
    /// Start with no file sources; `MAPREVIEW__` env overrides are applied last.
    ///
    /// ```
    /// use mapreview_config::MapReviewConfigLoader;
    ///
    /// let config = MapReviewConfigLoader::new()
    ///     .with_yaml_str("version: '1'\ntargets: []")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert!(config.targets.is_empty());
    /// assert_eq!(config.crawl.max_reveal_clicks, 30);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
            env_prefix: "MAPREVIEW",
        }
    }

    /// Attach a required YAML/TOML/JSON file; the format is inferred by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent, so runs can rely purely on
    /// environment variables and CLI flags.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use mapreview_config::{MapReviewConfigLoader, SiteSelection};
    ///
    /// let cfg = MapReviewConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// targets: ["성화해장국 인하점"]
    /// site: kakao
    /// browser:
    ///   headless: true
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.targets.len(), 1);
    /// assert!(cfg.browser.headless);
    /// assert!(matches!(cfg.site, SiteSelection::Builtin(ref s) if s == "kakao"));
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly typed config.
    ///
    /// ```
    /// use mapreview_config::MapReviewConfigLoader;
    ///
    /// unsafe { std::env::set_var("REVIEW_OUT", "/tmp/reviews"); }
    ///
    /// let config = MapReviewConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// output:
    ///   dir: "${REVIEW_OUT}"
    ///   file_prefix: "naver_review"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.output.dir, std::path::PathBuf::from("/tmp/reviews"));
    /// assert_eq!(config.output.file_prefix, "naver_review");
    ///
    /// unsafe { std::env::remove_var("REVIEW_OUT"); }
    /// ```
    pub fn load(self) -> Result<MapReviewConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(self.env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: MapReviewConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;

        if let SiteSelection::Builtin(name) = &typed.site {
            builtin_site(name)?;
        }

        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("FOO", Some("bar"), || {
            let mut v = json!("prefix-${FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_in_array_and_object() {
        temp_env::with_vars([("CITY", Some("Incheon")), ("GU", Some("Michuhol"))], || {
            let mut v = json!(["near-$CITY", { "loc": "${CITY}-${GU}" }, 42, true, null]);
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!(["near-Incheon", { "loc": "Incheon-Michuhol" }, 42, true, null])
            );
        });
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${MAPREVIEW_DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${MAPREVIEW_DOES_NOT_EXIST}"));
    }

    #[test]
    fn naver_profile_uses_frames() {
        let spec = builtin_site("naver").unwrap();
        assert_eq!(spec.query_template, "인천 {name}");
        let search = spec.search_scope.expect("search scope");
        assert!(search.optional);
        assert!(matches!(search.boundary, ScopeBoundary::Frame { ref selectors } if selectors.len() == 3));
        assert!(matches!(spec.detail_scope.boundary, ScopeBoundary::Frame { .. }));
        assert_eq!(spec.reveal.len(), 3);
        assert_eq!(spec.extraction.fields.content.min_chars, 5);
        assert!(spec.extraction.fields.date.unwrap().pattern.is_some());
        assert_eq!(spec.extraction.fields.tag.unwrap().scan, ScanMode::Any);
    }

    #[test]
    fn kakao_profile_uses_new_window() {
        let spec = builtin_site("KAKAO").unwrap();
        assert!(matches!(spec.detail_scope.boundary, ScopeBoundary::Window));
        assert!(spec.search_scope.is_none());
        assert_eq!(spec.search_submit.len(), 1);
        assert!(spec.reveal.is_empty());
        assert!(spec.extraction.noise_keywords.is_empty());
        assert_eq!(
            spec.extraction.fields.author.unwrap().strip,
            vec!["리뷰어 이름,".to_string()]
        );
    }

    #[test]
    fn minimal_config_resolves_the_default_site() {
        let cfg = MapReviewConfigLoader::new()
            .with_yaml_str("targets: [A]")
            .load()
            .unwrap();
        let spec = cfg.site.resolve().unwrap();
        assert_eq!(spec.name, "naver");
        assert_eq!(spec.search_input[0], Locator::css("input[placeholder*='검색']"));
        assert_eq!(spec.extraction.fields.content.join, " ");
        assert_eq!(spec.extraction.fields.author.unwrap().join, "");
    }

    #[test]
    fn inline_site_accepts_locator_maps() {
        let cfg = MapReviewConfigLoader::new()
            .with_yaml_str(
                r##"
site:
  name: test
  home_url: "https://example.test/"
  search_input: [{css: "#q"}]
  first_result: [{xpath: "//a[1]"}]
  detail_scope: {kind: window}
  review_tab: [{css: ".tab"}]
  extraction:
    containers: ["body"]
    items: ["li"]
    fields:
      content: {selectors: ["p"]}
"##,
            )
            .load()
            .unwrap();
        let spec = cfg.site.resolve().unwrap();
        assert_eq!(spec.first_result, vec![Locator::xpath("//a[1]")]);
        assert!(matches!(spec.detail_scope.boundary, ScopeBoundary::Window));
    }

    #[test]
    fn unknown_builtin_is_rejected_at_load() {
        let err = MapReviewConfigLoader::new()
            .with_yaml_str("site: daum")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("daum"));
    }
}

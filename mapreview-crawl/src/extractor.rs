//! Tolerant review extraction from a context snapshot.
//!
//! Extraction is a pure function of the snapshot and the schema: no live
//! document is touched, and running it twice on the same snapshot yields the
//! same records.

use crate::candidate::CandidateSet;
use crate::context::Snapshot;
use crate::profile::ProfileError;
use mapreview_config::{ExtractionSpec, FieldSpec, ScanMode};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::debug;

/// One parsed review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionRecord {
    pub source_entity: String,
    pub author: Option<String>,
    pub content: String,
    pub date_text: Option<String>,
    pub tag: Option<String>,
}

/// Records recovered from one snapshot plus what was discarded on the way.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Extraction {
    pub records: Vec<ExtractionRecord>,
    /// Items whose text carried none of the review keywords.
    pub noise_dropped: usize,
    /// Items that passed the noise filter but had no usable content.
    pub contentless_dropped: usize,
}

/// Acceptance rule for one field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    selectors: CandidateSet<Selector>,
    min_chars: usize,
    pattern: Option<Regex>,
    require_any: Vec<String>,
    strip: Vec<String>,
    scan: ScanMode,
    join: String,
}

impl FieldRule {
    pub fn compile(field: &str, spec: &FieldSpec) -> Result<Self, ProfileError> {
        let selectors = compile_selectors(field, &spec.selectors)?;
        let pattern = spec
            .pattern
            .as_deref()
            .map(|p| {
                Regex::new(p).map_err(|e| ProfileError::Pattern {
                    field: field.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        Ok(Self {
            selectors,
            min_chars: spec.min_chars,
            pattern,
            require_any: spec.require_any.clone(),
            strip: spec.strip.clone(),
            scan: spec.scan,
            join: spec.join.clone(),
        })
    }

    /// First accepted text under `item`, trying selectors in order.
    fn resolve(&self, item: ElementRef<'_>) -> Option<String> {
        self.selectors
            .resolve(|selector| {
                let mut matches = item.select(selector);
                match self.scan {
                    ScanMode::First => matches.next().and_then(|el| self.accept(el)),
                    ScanMode::Any => matches.find_map(|el| self.accept(el)),
                }
            })
            .ok()
            .map(|hit| hit.value)
    }

    fn accept(&self, element: ElementRef<'_>) -> Option<String> {
        let mut text = flatten_text(element, &self.join);
        for prefix in &self.strip {
            if let Some(rest) = text.strip_prefix(prefix.as_str()) {
                text = rest.trim().to_string();
            }
        }
        if text.is_empty() || text.chars().count() < self.min_chars {
            return None;
        }
        if self.pattern.as_ref().is_some_and(|p| !p.is_match(&text)) {
            return None;
        }
        if !self.require_any.is_empty() && !self.require_any.iter().any(|k| text.contains(k)) {
            return None;
        }
        Some(text)
    }
}

/// Compiled per-site extraction rules.
#[derive(Debug, Clone)]
pub struct ExtractionSchema {
    containers: CandidateSet<Selector>,
    items: CandidateSet<Selector>,
    noise_keywords: Vec<String>,
    author: Option<FieldRule>,
    content: FieldRule,
    date: Option<FieldRule>,
    tag: Option<FieldRule>,
}

impl ExtractionSchema {
    pub fn compile(spec: &ExtractionSpec) -> Result<Self, ProfileError> {
        let fields = &spec.fields;
        Ok(Self {
            containers: compile_selectors("containers", &spec.containers)?,
            items: compile_selectors("items", &spec.items)?,
            noise_keywords: spec.noise_keywords.clone(),
            author: fields.author.as_ref().map(|f| FieldRule::compile("author", f)).transpose()?,
            content: FieldRule::compile("content", &fields.content)?,
            date: fields.date.as_ref().map(|f| FieldRule::compile("date", f)).transpose()?,
            tag: fields.tag.as_ref().map(|f| FieldRule::compile("tag", f)).transpose()?,
        })
    }

    fn is_noise(&self, text: &str) -> bool {
        !self.noise_keywords.is_empty() && !self.noise_keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

fn compile_selectors(field: &str, raw: &[String]) -> Result<CandidateSet<Selector>, ProfileError> {
    let set = CandidateSet::new(field, raw.to_vec())?;
    set.try_map(|s| {
        Selector::parse(s).map_err(|e| ProfileError::Selector {
            field: field.to_string(),
            selector: s.clone(),
            reason: format!("{e:?}"),
        })
    })
}

/// Trimmed, non-empty text nodes joined by `separator`.
fn flatten_text(element: ElementRef<'_>, separator: &str) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Applies an [`ExtractionSchema`] to snapshots.
#[derive(Debug, Clone)]
pub struct TolerantExtractor {
    schema: ExtractionSchema,
}

impl TolerantExtractor {
    pub fn new(schema: ExtractionSchema) -> Self {
        Self { schema }
    }

    /// Recover review records attributed to `source_entity`, in document order.
    pub fn extract(&self, snapshot: &Snapshot, source_entity: &str) -> Extraction {
        let document = Html::parse_document(&snapshot.html);
        let schema = &self.schema;

        let items = schema
            .containers
            .resolve(|container| {
                let root = document.select(container).next()?;
                schema
                    .items
                    .resolve(|item| {
                        let found: Vec<ElementRef<'_>> = root.select(item).collect();
                        (!found.is_empty()).then_some(found)
                    })
                    .ok()
                    .map(|hit| hit.value)
            })
            .map(|hit| hit.value)
            .unwrap_or_default();

        let mut extraction = Extraction::default();
        for item in items {
            if schema.is_noise(&flatten_text(item, " ")) {
                extraction.noise_dropped += 1;
                continue;
            }
            let Some(content) = schema.content.resolve(item) else {
                extraction.contentless_dropped += 1;
                continue;
            };
            extraction.records.push(ExtractionRecord {
                source_entity: source_entity.to_string(),
                author: schema.author.as_ref().and_then(|r| r.resolve(item)),
                content,
                date_text: schema.date.as_ref().and_then(|r| r.resolve(item)),
                tag: schema.tag.as_ref().and_then(|r| r.resolve(item)),
            });
        }

        debug!(
            target: "crawl.extract",
            source_entity,
            records = extraction.records.len(),
            noise = extraction.noise_dropped,
            contentless = extraction.contentless_dropped,
            "extracted snapshot"
        );
        extraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextId;
    use mapreview_config::FieldsSpec;

    fn field(selectors: &[&str]) -> FieldSpec {
        FieldSpec {
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            min_chars: 0,
            pattern: None,
            require_any: vec![],
            strip: vec![],
            scan: ScanMode::First,
            join: String::new(),
        }
    }

    fn spec() -> ExtractionSpec {
        ExtractionSpec {
            containers: vec!["#missing".into(), "ul.reviews".into()],
            items: vec!["li.review".into(), "li".into()],
            noise_keywords: vec![],
            fields: FieldsSpec {
                author: Some(field(&[".nick"])),
                content: FieldSpec {
                    min_chars: 5,
                    ..field(&[".short", "p"])
                },
                date: Some(FieldSpec {
                    pattern: Some(r"\d{4}\.\d{1,2}\.\d{1,2}".into()),
                    ..field(&["span"])
                }),
                tag: None,
            },
        }
    }

    fn extract(spec: &ExtractionSpec, html: &str) -> Extraction {
        let extractor = TolerantExtractor::new(ExtractionSchema::compile(spec).unwrap());
        extractor.extract(&Snapshot::new(ContextId::Detail, html), "place")
    }

    #[test]
    fn content_falls_through_short_candidates() {
        let html = r#"<ul class="reviews"><li><span class="short">맛</span><p>국물이 진하고 좋아요</p></li></ul>"#;
        let out = extract(&spec(), html);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].content, "국물이 진하고 좋아요");
        assert_eq!(out.records[0].author, None);
    }

    #[test]
    fn container_without_items_is_skipped() {
        let mut spec = spec();
        spec.containers = vec!["div.empty".into(), "ul.reviews".into()];
        let html = r#"<div class="empty"></div><ul class="reviews"><li><p>다시 올게요 정말</p></li></ul>"#;
        assert_eq!(extract(&spec, html).records.len(), 1);
    }

    #[test]
    fn date_must_match_pattern() {
        let html = r#"<ul class="reviews"><li><p>친절한 사장님</p><span>방문</span><span>2024.3.1</span></li></ul>"#;
        let mut spec = spec();
        spec.fields.date.as_mut().unwrap().scan = ScanMode::First;
        assert_eq!(extract(&spec, html).records[0].date_text, None);
        spec.fields.date.as_mut().unwrap().scan = ScanMode::Any;
        assert_eq!(extract(&spec, html).records[0].date_text.as_deref(), Some("2024.3.1"));
    }

    #[test]
    fn items_without_content_are_counted_not_emitted() {
        let html = r#"<ul class="reviews"><li><span>짧음</span></li><li><p>충분히 긴 리뷰</p></li></ul>"#;
        let out = extract(&spec(), html);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.contentless_dropped, 1);
    }

    #[test]
    fn noise_filter_requires_a_keyword() {
        let mut spec = spec();
        spec.noise_keywords = vec!["방문".into()];
        let html = r#"<ul class="reviews">
            <li><p>광고 배너 문구입니다</p></li>
            <li><p>재방문 의사 있어요</p></li>
        </ul>"#;
        let out = extract(&spec, html);
        assert_eq!(out.noise_dropped, 1);
        assert_eq!(out.records[0].content, "재방문 의사 있어요");
    }

    #[test]
    fn strip_removes_label_prefix() {
        let mut spec = spec();
        spec.fields.author = Some(FieldSpec {
            strip: vec!["리뷰어 이름,".into()],
            ..field(&[".nick"])
        });
        let html = r#"<ul class="reviews"><li><span class="nick">리뷰어 이름, 먹보</span><p>맛있게 먹었습니다</p></li></ul>"#;
        assert_eq!(extract(&spec, html).records[0].author.as_deref(), Some("먹보"));
    }

    #[test]
    fn nested_text_nodes_use_the_field_separator() {
        let mut spec = spec();
        spec.fields.content.join = " ".into();
        spec.fields.date.as_mut().unwrap().scan = ScanMode::Any;
        let html = r#"<ul class="reviews"><li>
            <span class="nick">빵<b>순이</b></span>
            <p>국물이<b>진하고</b>좋아요</p>
            <span>2024.<span>5</span>.12</span>
        </li></ul>"#;
        let record = &extract(&spec, html).records[0];
        assert_eq!(record.author.as_deref(), Some("빵순이"));
        assert_eq!(record.content, "국물이 진하고 좋아요");
        assert_eq!(record.date_text.as_deref(), Some("2024.5.12"));
    }

    #[test]
    fn nothing_matches_yields_nothing() {
        let out = extract(&spec(), "<div>empty</div>");
        assert_eq!(out, Extraction::default());
    }

    #[test]
    fn invalid_selector_is_a_profile_error() {
        let mut spec = spec();
        spec.items = vec!["li[".into()];
        assert!(matches!(
            ExtractionSchema::compile(&spec),
            Err(ProfileError::Selector { .. })
        ));
        spec.items = vec![];
        assert!(matches!(ExtractionSchema::compile(&spec), Err(ProfileError::Empty(_))));
    }
}

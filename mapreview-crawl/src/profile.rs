//! Site profiles compiled into the crawler's runtime vocabulary.

use crate::candidate::{CandidateSet, EmptyCandidateSet};
use crate::context::{Boundary, ContextTiming, DocumentContext, Scope};
use crate::extractor::ExtractionSchema;
use mapreview_common::Locator;
use mapreview_config::{ScopeBoundary, ScopeSpec, SiteSpec};
use url::Url;

const NAME_PLACEHOLDER: &str = "{name}";

/// A site profile that cannot be used.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error(transparent)]
    Empty(#[from] EmptyCandidateSet),

    #[error("invalid selector `{selector}` in {field}: {reason}")]
    Selector {
        field: String,
        selector: String,
        reason: String,
    },

    #[error("invalid pattern for {field}: {reason}")]
    Pattern { field: String, reason: String },

    #[error("query template `{0}` does not contain {{name}}")]
    Template(String),

    #[error("invalid home url `{url}`: {reason}")]
    HomeUrl { url: String, reason: String },
}

/// Everything the orchestrator needs to crawl one site.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub name: String,
    pub home_url: String,
    query_template: String,
    pub search_input: CandidateSet<Locator>,
    /// When absent the query is submitted with Enter.
    pub search_submit: Option<CandidateSet<Locator>>,
    pub search_scope: Option<Scope>,
    pub first_result: CandidateSet<Locator>,
    pub detail_scope: Scope,
    pub overlays: Option<CandidateSet<Locator>>,
    pub review_tab: CandidateSet<Locator>,
    pub tab_confirm: Option<CandidateSet<Locator>>,
    pub reveal: Option<CandidateSet<Locator>>,
    pub schema: ExtractionSchema,
}

impl SiteProfile {
    pub fn from_spec(spec: &SiteSpec) -> Result<Self, ProfileError> {
        if !spec.query_template.contains(NAME_PLACEHOLDER) {
            return Err(ProfileError::Template(spec.query_template.clone()));
        }
        Url::parse(&spec.home_url).map_err(|e| ProfileError::HomeUrl {
            url: spec.home_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            name: spec.name.clone(),
            home_url: spec.home_url.clone(),
            query_template: spec.query_template.clone(),
            search_input: CandidateSet::new("search_input", spec.search_input.clone())?,
            search_submit: CandidateSet::optional(spec.search_submit.clone()),
            search_scope: spec.search_scope.as_ref().map(compile_scope).transpose()?,
            first_result: CandidateSet::new("first_result", spec.first_result.clone())?,
            detail_scope: compile_scope(&spec.detail_scope)?,
            overlays: CandidateSet::optional(spec.overlays.clone()),
            review_tab: CandidateSet::new("review_tab", spec.review_tab.clone())?,
            tab_confirm: CandidateSet::optional(spec.tab_confirm.clone()),
            reveal: CandidateSet::optional(spec.reveal.clone()),
            schema: ExtractionSchema::compile(&spec.extraction)?,
        })
    }

    /// The text typed into the search box for `target`.
    ///
    /// ```
    /// let spec = mapreview_config::builtin_site("naver").unwrap();
    /// let profile = mapreview_crawl::profile::SiteProfile::from_spec(&spec).unwrap();
    /// assert_eq!(profile.query_for("성화해장국 인하점"), "인천 성화해장국 인하점");
    /// ```
    pub fn query_for(&self, target: &str) -> String {
        self.query_template.replace(NAME_PLACEHOLDER, target)
    }

    /// A fresh context tracker for this site, starting at the root.
    pub fn document_context(&self, timing: ContextTiming) -> DocumentContext {
        DocumentContext::new(
            self.search_scope.clone(),
            self.detail_scope.clone(),
            self.overlays.clone(),
            timing,
        )
    }
}

fn compile_scope(spec: &ScopeSpec) -> Result<Scope, ProfileError> {
    let boundary = match &spec.boundary {
        ScopeBoundary::Frame { selectors } => {
            Boundary::Frame(CandidateSet::new("frame", selectors.clone())?)
        }
        ScopeBoundary::Window => Boundary::Window,
    };
    Ok(Scope {
        boundary,
        optional: spec.optional,
    })
}

//! Ordered fallback lists.
//!
//! Every selector-dependent lookup in the crawler is a [`CandidateSet`]: the
//! candidates are tried strictly in order and the first one that succeeds
//! decides the result.

use std::fmt;

/// A non-empty, ordered list of interchangeable alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet<T> {
    candidates: Vec<T>,
}

/// Returned when constructing a set from an empty list.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("candidate set `{0}` must contain at least one candidate")]
pub struct EmptyCandidateSet(pub String);

/// No candidate satisfied the probe.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no candidate matched")]
pub struct NoneFound;

/// The winning candidate's position and the probe's result for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<R> {
    pub index: usize,
    pub value: R,
}

impl<T> CandidateSet<T> {
    /// Build a set; `label` names it in the error when `candidates` is empty.
    pub fn new(label: &str, candidates: Vec<T>) -> Result<Self, EmptyCandidateSet> {
        if candidates.is_empty() {
            return Err(EmptyCandidateSet(label.to_string()));
        }
        Ok(Self { candidates })
    }

    /// Like [`CandidateSet::new`] but maps an empty list to `None`, for
    /// lookups a site profile may omit.
    pub fn optional(candidates: Vec<T>) -> Option<Self> {
        (!candidates.is_empty()).then_some(Self { candidates })
    }

    /// A set holding exactly one candidate.
    pub fn single(candidate: T) -> Self {
        Self {
            candidates: vec![candidate],
        }
    }

    /// Apply `probe` to each candidate in order and return the first success.
    ///
    /// Candidates after the winner are never probed.
    ///
    /// ```
    /// use mapreview_crawl::candidate::CandidateSet;
    ///
    /// let set = CandidateSet::new("lengths", vec!["", "ab", "abcd"]).unwrap();
    /// let hit = set.resolve(|s| (s.len() >= 2).then(|| s.len())).unwrap();
    /// assert_eq!((hit.index, hit.value), (1, 2));
    /// ```
    pub fn resolve<R>(&self, mut probe: impl FnMut(&T) -> Option<R>) -> Result<Resolved<R>, NoneFound> {
        self.candidates
            .iter()
            .enumerate()
            .find_map(|(index, candidate)| probe(candidate).map(|value| Resolved { index, value }))
            .ok_or(NoneFound)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn first(&self) -> &T {
        &self.candidates[0]
    }

    /// Convert every candidate, failing on the first conversion error.
    pub fn try_map<U, E>(&self, f: impl FnMut(&T) -> Result<U, E>) -> Result<CandidateSet<U>, E> {
        let candidates = self.candidates.iter().map(f).collect::<Result<Vec<_>, E>>()?;
        Ok(CandidateSet { candidates })
    }
}

impl<'a, T> IntoIterator for &'a CandidateSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

impl<T: fmt::Display> fmt::Display for CandidateSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.candidates.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, "]")
    }
}

//! Postmortem HTML captures.

use chrono::Local;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Writes the markup of a context that a click or stage gave up on.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    dir: PathBuf,
}

impl Diagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `html` to `<dir>/debug_<label>_<timestamp>.html`.
    pub fn capture(&self, label: &str, html: &str) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let name = format!(
            "debug_{}_{}.html",
            sanitize(label),
            Local::now().format("%Y%m%d_%H%M%S%.3f")
        );
        let path = self.dir.join(name);
        std::fs::write(&path, html)?;
        debug!(target: "crawl.diagnostics", path = %path.display(), "saved capture");
        Ok(path)
    }

    /// [`Diagnostics::capture`], logging instead of returning failures.
    pub fn capture_quietly(&self, label: &str, html: &str) {
        if let Err(e) = self.capture(label, html) {
            warn!(target: "crawl.diagnostics", label, error = %e, "capture failed");
        }
    }
}

fn sanitize(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

//! Hand-off of a finished result set to storage.

use crate::extractor::ExtractionRecord;
use chrono::Local;
use mapreview_common::MapReviewError;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Column order of every tabular output.
pub const COLUMNS: [&str; 5] = ["source_entity", "author", "content", "date_text", "tag"];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Where a sink put the records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkReport {
    pub location: String,
    pub records: usize,
}

/// Receives the records of a run once, after the run has ended.
pub trait RecordSink {
    fn write(&mut self, records: &[ExtractionRecord]) -> Result<SinkReport, MapReviewError>;
}

/// Writes `<dir>/<prefix>_<YYYY-mm-dd_HH-MM-SS>.csv`, BOM-prefixed so
/// spreadsheet tools pick up the encoding.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
    prefix: String,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    fn output_path(&self) -> PathBuf {
        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        self.dir.join(format!("{}_{stamp}.csv", self.prefix))
    }
}

fn sink_err(e: impl std::fmt::Display) -> MapReviewError {
    MapReviewError::Sink(e.to_string())
}

impl RecordSink for CsvSink {
    fn write(&mut self, records: &[ExtractionRecord]) -> Result<SinkReport, MapReviewError> {
        std::fs::create_dir_all(&self.dir).map_err(sink_err)?;
        let path = self.output_path();

        let mut file = std::fs::File::create(&path).map_err(sink_err)?;
        file.write_all(UTF8_BOM).map_err(sink_err)?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(COLUMNS).map_err(sink_err)?;
        for record in records {
            writer.serialize(record).map_err(sink_err)?;
        }
        writer.flush().map_err(sink_err)?;

        let location = path.display().to_string();
        info!(target: "crawl.sink", %location, records = records.len(), "records written");
        Ok(SinkReport {
            location,
            records: records.len(),
        })
    }
}

/// Keeps records in memory; used by tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub records: Vec<ExtractionRecord>,
}

impl RecordSink for MemorySink {
    fn write(&mut self, records: &[ExtractionRecord]) -> Result<SinkReport, MapReviewError> {
        self.records.extend_from_slice(records);
        Ok(SinkReport {
            location: "memory".to_string(),
            records: records.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(content: &str, author: Option<&str>) -> ExtractionRecord {
        ExtractionRecord {
            source_entity: "성화해장국 인하점".into(),
            author: author.map(str::to_string),
            content: content.into(),
            date_text: Some("2024.5.1".into()),
            tag: None,
        }
    }

    #[test]
    fn csv_has_bom_header_and_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path(), "naver_review");
        let report = sink
            .write(&[record("국물이 진해요, 또 올게요", Some("먹보")), record("친절해요", None)])
            .unwrap();
        assert_eq!(report.records, 2);

        let bytes = std::fs::read(&report.location).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "source_entity,author,content,date_text,tag");
        assert_eq!(lines[1], "성화해장국 인하점,먹보,\"국물이 진해요, 또 올게요\",2024.5.1,");
        assert_eq!(lines[2], "성화해장국 인하점,,친절해요,2024.5.1,");

        let name = std::path::Path::new(&report.location).file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("naver_review_") && name.ends_with(".csv"));
    }

    #[test]
    fn empty_result_still_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let report = CsvSink::new(dir.path().join("out"), "reviews").write(&[]).unwrap();
        assert_eq!(report.records, 0);
        let text = std::fs::read_to_string(&report.location).unwrap();
        assert_eq!(text.trim_start_matches('\u{feff}').trim_end(), COLUMNS.join(","));
    }
}

//! Rendered reports and their delivery.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::info;

use crate::model::ReportRecord;

const DATA_URI_PREFIX: &str = "data:application/pdf;base64,";

/// A flattened report ready to be handed to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedReport {
    bytes: Vec<u8>,
    filename: String,
}

impl RenderedReport {
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            bytes,
            filename: filename.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Suggested filename, without extension.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The PDF as a `data:application/pdf;base64,` URI.
    pub fn to_data_uri(&self) -> String {
        let mut uri = String::with_capacity(DATA_URI_PREFIX.len() + self.bytes.len() * 4 / 3 + 4);
        uri.push_str(DATA_URI_PREFIX);
        STANDARD.encode_string(&self.bytes, &mut uri);
        uri
    }

    /// Hands the report to `sink`.
    pub fn deliver<D: Download + ?Sized>(&self, sink: &mut D) -> io::Result<()> {
        sink.download(&self.bytes, &self.filename)
    }
}

/// `Rapport {studentName} - {date}`.
pub fn suggested_filename(report: &ReportRecord) -> String {
    format!("Rapport {} - {}", report.student_name(), report.date())
}

/// Receiver of rendered bytes, e.g. a browser download or a directory.
pub trait Download {
    fn download(&mut self, data: &[u8], suggested_filename: &str) -> io::Result<()>;
}

/// Writes each report as `<dir>/<filename>.pdf`.
#[derive(Clone, Debug)]
pub struct DirectoryDownload {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectoryDownload {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    /// Path a report with `suggested_filename` would be written to.
    pub fn target_path(&self, suggested_filename: &str) -> PathBuf {
        self.dir
            .join(format!("{}.pdf", sanitize_filename(suggested_filename)))
    }

    /// Files written so far, in order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl Download for DirectoryDownload {
    fn download(&mut self, data: &[u8], suggested_filename: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.target_path(suggested_filename);
        fs::write(&path, data)?;
        info!("Wrote {} ({} bytes)", path.display(), data.len());
        self.written.push(path);
        Ok(())
    }
}

/// Writes the data URI of each report, one per line.
#[derive(Debug)]
pub struct DataUriDownload<W: Write> {
    writer: W,
}

impl<W: Write> DataUriDownload<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Download for DataUriDownload<W> {
    fn download(&mut self, data: &[u8], _suggested_filename: &str) -> io::Result<()> {
        self.writer.write_all(DATA_URI_PREFIX.as_bytes())?;
        self.writer.write_all(STANDARD.encode(data).as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

// Student names are free text and dates may be written with slashes.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|ch| match ch {
            '/' | '\\' => '-',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::model::Grade;

    #[test]
    fn filename_uses_hyphenated_form() {
        let report = ReportRecord::new("2024-03-12", "Léa Martin", Grade::Ce1, "M. Durand");
        assert_eq!(suggested_filename(&report), "Rapport Léa Martin - 2024-03-12");
    }

    #[test]
    fn data_uri_has_pdf_prefix() {
        let rendered = RenderedReport::new(b"%PDF".to_vec(), "Rapport");
        assert_eq!(rendered.to_data_uri(), "data:application/pdf;base64,JVBERg==");
    }

    #[test]
    fn data_uri_download_writes_one_line() {
        let rendered = RenderedReport::new(b"%PDF".to_vec(), "Rapport");
        let mut sink = DataUriDownload::new(Vec::new());
        rendered.deliver(&mut sink).expect("write to memory");
        let written = String::from_utf8(sink.into_inner()).expect("utf8");
        assert_eq!(written, format!("{}\n", rendered.to_data_uri()));
    }

    #[test]
    fn separators_are_replaced_in_target_path() {
        let sink = DirectoryDownload::new("/tmp/reports");
        let path = sink.target_path("Rapport Léo - 12/03/2024");
        assert_eq!(path, Path::new("/tmp/reports/Rapport Léo - 12-03-2024.pdf"));
    }
}

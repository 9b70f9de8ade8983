//! One-shot file export of accumulated records.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use thiserror::Error;
use tracing::info;

use crate::PacketRecord;

/// File stem of every export; the extension follows the format.
pub const EXPORT_FILE_STEM: &str = "pcap_data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    /// Fixed output file name, e.g. `pcap_data.json`.
    pub fn file_name(&self) -> String {
        format!("{EXPORT_FILE_STEM}.{}", self.extension())
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no records to export: a CSV header needs at least one record")]
    Empty,
    #[error("export already flushed")]
    AlreadyFlushed,
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Accumulates records and writes them once, as a complete file.
///
/// # Examples
/// ```no_run
/// use pcapflow_core::{ExportFormat, ExportSink, PacketRecord, Protocol};
///
/// let mut sink = ExportSink::new(ExportFormat::Csv, "out");
/// sink.push(PacketRecord::new(1.0, 60, Protocol::Udp, None))?;
/// let path = sink.flush()?;
/// assert!(path.ends_with("pcap_data.csv"));
/// # Ok::<(), pcapflow_core::ExportError>(())
/// ```
#[derive(Debug)]
pub struct ExportSink {
    format: ExportFormat,
    output_dir: PathBuf,
    records: Vec<PacketRecord>,
    flushed: bool,
}

impl ExportSink {
    pub fn new(format: ExportFormat, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            format,
            output_dir: output_dir.into(),
            records: Vec::new(),
            flushed: false,
        }
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(self.format.file_name())
    }

    /// Number of accumulated records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    pub fn push(&mut self, record: PacketRecord) -> Result<(), ExportError> {
        if self.flushed {
            return Err(ExportError::AlreadyFlushed);
        }
        self.records.push(record);
        Ok(())
    }

    /// Write all accumulated records to [`ExportSink::output_path`],
    /// overwriting any existing file. The sink is spent afterwards, even when
    /// the write fails.
    ///
    /// # Errors
    /// `Empty` for a CSV export without records (no file is written),
    /// `AlreadyFlushed` on a second call, `Io`/`Json` on write failures.
    pub fn flush(&mut self) -> Result<PathBuf, ExportError> {
        if self.flushed {
            return Err(ExportError::AlreadyFlushed);
        }
        self.flushed = true;

        let contents = match self.format {
            ExportFormat::Json => render_json(&self.records)?,
            ExportFormat::Csv => render_csv(&self.records)?,
        };

        let path = self.output_path();
        write_file(&self.output_dir, &path, &contents)?;
        info!(
            path = %path.display(),
            records = self.records.len(),
            format = self.format.extension(),
            "export written"
        );
        Ok(path)
    }
}

fn write_file(dir: &Path, path: &Path, contents: &[u8]) -> Result<(), ExportError> {
    let io_error = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    if !dir.as_os_str().is_empty() {
        fs::create_dir_all(dir).map_err(io_error)?;
    }
    fs::write(path, contents).map_err(io_error)
}

fn render_json(records: &[PacketRecord]) -> Result<Vec<u8>, ExportError> {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    records.serialize(&mut serializer)?;
    Ok(out)
}

fn render_csv(records: &[PacketRecord]) -> Result<Vec<u8>, ExportError> {
    let first = records.first().ok_or(ExportError::Empty)?;

    let mut out = String::new();
    push_csv_row(&mut out, first.field_names().iter().copied());
    for record in records {
        let values = record.csv_values();
        push_csv_row(&mut out, values.iter().map(String::as_str));
    }
    Ok(out.into_bytes())
}

fn push_csv_row<'a>(out: &mut String, values: impl Iterator<Item = &'a str>) {
    let row: Vec<String> = values.map(escape_csv).collect();
    out.push_str(&row.join(","));
    out.push('\n');
}

fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

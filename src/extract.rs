/// The extraction core: align a raw time-series download to absolute
/// wall-clock time and keep only the rows inside the labeled window.
///
/// Uses atomic write pattern: write to temp sibling then rename, so a parse
/// failure midway never leaves a partial output behind.
use crate::error::PullError;
use crate::units::{EpochSeconds, LabelWindow, RelMillis};
use std::path::{Path, PathBuf};

/// Column carrying relative offsets (milliseconds) in the raw download.
const TIME_COLUMN: &str = "Time";
/// Column appended to the output, in epoch seconds.
const ABSOLUTE_TIME_COLUMN: &str = "Absolute_Time";

/// Row counts from a completed extraction, for logging.
#[derive(Debug)]
pub struct ExtractReport {
    pub rows_read: usize,
    pub rows_written: usize,
}

/// Filter `raw_path` down to the labeled window and write it to `out_path`.
///
/// Every retained row gains an `Absolute_Time` field computed as
/// `anchor + Time/1000`; all original columns pass through untouched and
/// row order is preserved. The window is inclusive on both bounds.
///
/// The raw input file is left in place; its removal is the caller's concern
/// (see `api::RawDownload`).
pub fn extract_window(
    raw_path: &Path,
    anchor: EpochSeconds,
    window: LabelWindow,
    out_path: &Path,
) -> Result<ExtractReport, PullError> {
    let mut reader = csv::Reader::from_path(raw_path).map_err(|e| malformed(raw_path, &e))?;
    let headers = reader
        .headers()
        .map_err(|e| malformed(raw_path, &e))?
        .clone();
    let time_idx = headers
        .iter()
        .position(|h| h == TIME_COLUMN)
        .ok_or_else(|| PullError::Malformed {
            path: raw_path.to_path_buf(),
            detail: format!("missing `{TIME_COLUMN}` column"),
        })?;

    if let Some(dir) = out_path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| PullError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
    }

    let tmp_path = tmp_sibling(out_path);
    match write_filtered(&mut reader, &headers, time_idx, anchor, window, raw_path, &tmp_path) {
        Ok(report) => {
            std::fs::rename(&tmp_path, out_path).map_err(|e| PullError::Io {
                path: out_path.to_path_buf(),
                source: e,
            })?;
            Ok(report)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

fn write_filtered(
    reader: &mut csv::Reader<std::fs::File>,
    headers: &csv::StringRecord,
    time_idx: usize,
    anchor: EpochSeconds,
    window: LabelWindow,
    raw_path: &Path,
    tmp_path: &Path,
) -> Result<ExtractReport, PullError> {
    let file = std::fs::File::create(tmp_path).map_err(|e| PullError::Io {
        path: tmp_path.to_path_buf(),
        source: e,
    })?;
    let mut wtr = csv::Writer::from_writer(file);

    let mut out_headers = headers.clone();
    out_headers.push_field(ABSOLUTE_TIME_COLUMN);
    wtr.write_record(&out_headers)
        .map_err(|e| write_failed(tmp_path, e))?;

    let mut rows_read = 0;
    let mut rows_written = 0;

    for result in reader.records() {
        let record = result.map_err(|e| malformed(raw_path, &e))?;
        rows_read += 1;

        let field = record.get(time_idx).unwrap_or("");
        let t: f64 = field.trim().parse().map_err(|_| PullError::Malformed {
            path: raw_path.to_path_buf(),
            detail: format!("row {rows_read}: unparsable `{TIME_COLUMN}` value `{field}`"),
        })?;
        let t = RelMillis(t);
        let absolute = anchor.offset_by(t);

        if window.contains(t) {
            let mut out = record.clone();
            out.push_field(&format_seconds(absolute));
            wtr.write_record(&out)
                .map_err(|e| write_failed(tmp_path, e))?;
            rows_written += 1;
        }
    }

    wtr.flush().map_err(|e| PullError::Io {
        path: tmp_path.to_path_buf(),
        source: e,
    })?;

    Ok(ExtractReport {
        rows_read,
        rows_written,
    })
}

/// Render an absolute instant for the output column. Whole seconds keep one
/// decimal place so the column always reads as a fractional epoch value.
fn format_seconds(t: EpochSeconds) -> String {
    if t.0.fract() == 0.0 {
        format!("{:.1}", t.0)
    } else {
        format!("{}", t.0)
    }
}

fn tmp_sibling(out_path: &Path) -> PathBuf {
    let name = out_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "out.csv".to_string());
    let dir = out_path.parent().unwrap_or(Path::new("."));
    dir.join(format!(".{}.tmp.{}", name, std::process::id()))
}

fn malformed(path: &Path, e: &csv::Error) -> PullError {
    PullError::Malformed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}

fn write_failed(tmp_path: &Path, e: csv::Error) -> PullError {
    PullError::Io {
        path: tmp_path.to_path_buf(),
        source: std::io::Error::other(e),
    }
}

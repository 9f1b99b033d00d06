//! Plain-text series logger.
//!
//! While enabled, every write rewrites the whole log from the start index
//! onward, so the file on disk is always a complete table even if the process
//! dies between writes. Rows are `time frequency`, each value printed like
//! `%.18e`, space separated with no header, written and parsed with `csv`.
//!
//! File names encode the capture time, the measurement mode and the gate:
//!
//! ```text
//! ks_20240501_123000_timeseries_RCON_1.txt
//! ks_20240501_123000_allan_RCON_1.txt
//! ```

use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::analysis::AllanPoint;
use crate::config::StorageConfig;
use crate::error::{AppResult, DaqError};
use crate::measurement::{MeasurementMode, Series};
use crate::transport::frame::format_scientific;

/// Digits after the decimal point in logged values.
pub const LOG_PRECISION: usize = 18;

#[derive(Debug, Clone)]
struct LogSession {
    start_index: usize,
    timeseries_path: PathBuf,
    allan_path: PathBuf,
    writes: u64,
}

/// Writes `Series[start..]` to a timestamped file on every ingestion step.
#[derive(Debug, Clone)]
pub struct SeriesLogger {
    output_dir: PathBuf,
    prefix: String,
    session: Option<LogSession>,
}

impl SeriesLogger {
    /// Disabled logger writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            prefix: prefix.into(),
            session: None,
        }
    }

    /// Disabled logger from the `[storage]` section.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.output_dir, &config.file_prefix)
    }

    /// Start a log at `series_len`.
    ///
    /// Creates the output directory if needed and reserves a file name not
    /// yet taken, appending `_1`, `_2`, ... on collision. Re-enabling an
    /// active logger starts a fresh file.
    pub fn enable<Tz>(
        &mut self,
        series_len: usize,
        mode: MeasurementMode,
        gate_time: f64,
        now: &DateTime<Tz>,
    ) -> AppResult<&Path>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        fs::create_dir_all(&self.output_dir)?;

        let stamp = now.format("%Y%m%d_%H%M%S").to_string();
        let gate = gate_label(gate_time);
        let stem = |kind: &str| format!("{}_{}_{}_{}_{}", self.prefix, stamp, kind, mode, gate);

        let mut attempt = 0u32;
        let (timeseries_path, allan_path) = loop {
            let suffix = if attempt == 0 {
                String::new()
            } else {
                format!("_{attempt}")
            };
            let ts = self
                .output_dir
                .join(format!("{}{suffix}.txt", stem("timeseries")));
            let allan = self.output_dir.join(format!("{}{suffix}.txt", stem("allan")));
            if !allan.exists() && reserve(&ts)? {
                break (ts, allan);
            }
            attempt += 1;
        };

        info!(
            path = %timeseries_path.display(),
            start_index = series_len,
            "Logging enabled"
        );
        let session = self.session.insert(LogSession {
            start_index: series_len,
            timeseries_path,
            allan_path,
            writes: 0,
        });
        Ok(session.timeseries_path.as_path())
    }

    /// Stop writing. Returns the path of the finished log, if any.
    pub fn disable(&mut self) -> Option<PathBuf> {
        let session = self.session.take()?;
        info!(
            path = %session.timeseries_path.display(),
            writes = session.writes,
            "Logging disabled"
        );
        Some(session.timeseries_path)
    }

    /// True while a log is open.
    pub fn is_enabled(&self) -> bool {
        self.session.is_some()
    }

    /// Series index the current log starts at.
    pub fn start_index(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.start_index)
    }

    /// Time-series file of the current log.
    pub fn path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.timeseries_path.as_path())
    }

    /// Companion Allan file of the current log.
    pub fn allan_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.allan_path.as_path())
    }

    /// Rewrite the log with `series[start..]`.
    ///
    /// Returns `false` without touching the disk when disabled or when the
    /// series has not grown past the start index.
    pub fn write(&mut self, series: &Series) -> AppResult<bool> {
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };
        if series.len() <= session.start_index {
            return Ok(false);
        }
        let (t, f) = series.slice_from(session.start_index);
        write_atomic(&session.timeseries_path, &encode_table(t, f)?)?;
        session.writes += 1;
        debug!(
            rows = t.len(),
            path = %session.timeseries_path.display(),
            "log written"
        );
        Ok(true)
    }

    /// Rewrite the companion file with an Allan curve.
    pub fn write_allan(&mut self, points: &[AllanPoint]) -> AppResult<bool> {
        let Some(session) = self.session.as_ref() else {
            return Ok(false);
        };
        write_atomic(&session.allan_path, &encode_allan(points)?)?;
        debug!(points = points.len(), path = %session.allan_path.display(), "allan log written");
        Ok(true)
    }
}

/// `%.18e %.18e` rows, newline terminated.
pub fn encode_table(t: &[f64], f: &[f64]) -> AppResult<String> {
    encode_rows(t.iter().zip(f).map(|(ti, fi)| [*ti, *fi]))
}

/// `tau deviation error count` rows.
pub fn encode_allan(points: &[AllanPoint]) -> AppResult<String> {
    encode_rows(
        points
            .iter()
            .map(|p| [p.tau, p.deviation, p.deviation_error, p.count as f64]),
    )
}

fn encode_rows<const N: usize>(rows: impl Iterator<Item = [f64; N]>) -> AppResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for row in rows {
        writer
            .write_record(row.iter().map(|v| format_scientific(*v, LOG_PRECISION, false)))
            .map_err(|e| DaqError::Storage(e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| DaqError::Storage(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| DaqError::Storage(e.to_string()))
}

/// Parse a two-column table written by [`encode_table`].
pub fn read_table(path: &Path) -> AppResult<(Vec<f64>, Vec<f64>)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| DaqError::Storage(format!("{}: {e}", path.display())))?;

    let mut t = Vec::new();
    let mut f = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DaqError::Storage(format!("{}: {e}", path.display())))?;
        let line = record.position().map_or(0, |p| p.line());
        let parsed: Vec<f64> = record
            .iter()
            .map(str::parse::<f64>)
            .collect::<Result<_, _>>()
            .map_err(|e| {
                DaqError::Storage(format!("{}: row {line}: {e}", path.display()))
            })?;
        let [ti, fi] = parsed[..] else {
            return Err(DaqError::Storage(format!(
                "{}: row {line}: expected 2 columns, found {}",
                path.display(),
                parsed.len()
            )));
        };
        t.push(ti);
        f.push(fi);
    }
    Ok((t, f))
}

/// Gate time as it appears in file names: `1` rather than `1.0`.
fn gate_label(gate_time: f64) -> String {
    if gate_time.is_finite() && gate_time.fract() == 0.0 {
        format!("{}", gate_time as i64)
    } else {
        format!("{gate_time}")
    }
}

/// Create `path` if it does not exist. `false` when it already does.
fn reserve(path: &Path) -> AppResult<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn write_atomic(path: &Path, contents: &str) -> AppResult<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{name}.tmp"));
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn at_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    fn series(n: usize) -> Series {
        let mut s = Series::new();
        let values: Vec<f64> = (0..n).map(|i| 79.86e6 + i as f64).collect();
        s.append_batch(&values, 1.0);
        s
    }

    #[test]
    fn file_name_encodes_time_mode_and_gate() {
        let dir = tempdir().unwrap();
        let mut logger = SeriesLogger::new(dir.path(), "ks");
        let path = logger
            .enable(0, MeasurementMode::Reciprocal, 1.0, &at_noon())
            .unwrap()
            .to_path_buf();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "ks_20240501_123000_timeseries_RCON_1.txt"
        );
        assert_eq!(
            logger.allan_path().unwrap().file_name().unwrap().to_str().unwrap(),
            "ks_20240501_123000_allan_RCON_1.txt"
        );

        let mut other = SeriesLogger::new(dir.path(), "ks");
        let path = other
            .enable(0, MeasurementMode::Continuous, 0.1, &at_noon())
            .unwrap();
        assert!(path.ends_with("ks_20240501_123000_timeseries_CONT_0.1.txt"));
    }

    #[test]
    fn collisions_get_numbered_suffixes() {
        let dir = tempdir().unwrap();
        let mut a = SeriesLogger::new(dir.path(), "ks");
        let mut b = SeriesLogger::new(dir.path(), "ks");
        let mut c = SeriesLogger::new(dir.path(), "ks");
        let mode = MeasurementMode::Reciprocal;

        let pa = a.enable(0, mode, 1.0, &at_noon()).unwrap().to_path_buf();
        let pb = b.enable(0, mode, 1.0, &at_noon()).unwrap().to_path_buf();
        let pc = c.enable(0, mode, 1.0, &at_noon()).unwrap().to_path_buf();

        assert!(pb.ends_with("ks_20240501_123000_timeseries_RCON_1_1.txt"));
        assert!(pc.ends_with("ks_20240501_123000_timeseries_RCON_1_2.txt"));
        assert_ne!(pa, pb);
    }

    #[test]
    fn write_rewrites_slice_from_start_index() {
        let dir = tempdir().unwrap();
        let mut logger = SeriesLogger::new(dir.path().join("nested"), "ks");
        let mut s = series(3);
        logger
            .enable(s.len(), MeasurementMode::Reciprocal, 1.0, &at_noon())
            .unwrap();

        // nothing past the start index yet
        assert!(!logger.write(&s).unwrap());

        s.append_batch(&[1.0, 2.0], 1.0);
        assert!(logger.write(&s).unwrap());
        s.append_batch(&[3.0], 1.0);
        assert!(logger.write(&s).unwrap());

        let path = logger.path().unwrap().to_path_buf();
        let text = fs::read_to_string(&path).unwrap();
        let (t, f) = s.slice_from(3);
        assert_eq!(text, encode_table(t, f).unwrap());

        let (rt, rf) = read_table(&path).unwrap();
        assert_eq!(rt, vec![3.0, 4.0, 5.0]);
        assert_eq!(rf, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn rows_use_eighteen_digits() {
        let table = encode_table(&[0.0], &[79.86e6]).unwrap();
        assert_eq!(
            table,
            "0.000000000000000000e+00 7.986000000000000000e+07\n"
        );
    }

    #[test]
    fn read_table_rejects_malformed_rows() {
        let dir = tempdir().unwrap();
        let wide = dir.path().join("wide.txt");
        fs::write(&wide, "1.0e+00 2.0e+00\n3.0e+00 4.0e+00 5.0e+00\n").unwrap();
        assert!(matches!(read_table(&wide), Err(DaqError::Storage(_))));

        let text = dir.path().join("text.txt");
        fs::write(&text, "1.0e+00 abc\n").unwrap();
        assert!(matches!(read_table(&text), Err(DaqError::Storage(_))));

        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "").unwrap();
        assert_eq!(read_table(&empty).unwrap(), (vec![], vec![]));
    }

    #[test]
    fn allan_rows_have_four_columns() {
        let points = [AllanPoint {
            tau: 2.0,
            deviation: 1.5e-12,
            deviation_error: 3e-14,
            count: 12,
        }];
        let text = encode_allan(&points).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert_eq!(text.trim_end().split(' ').count(), 4);
        assert!(text.starts_with("2.000000000000000000e+00 "));
        assert!(text.ends_with(" 1.200000000000000000e+01\n"));
    }

    #[test]
    fn disabled_logger_leaves_file_as_is() {
        let dir = tempdir().unwrap();
        let mut logger = SeriesLogger::new(dir.path(), "ks");
        let mut s = Series::new();
        logger
            .enable(0, MeasurementMode::Reciprocal, 1.0, &at_noon())
            .unwrap();
        s.append_batch(&[1.0, 2.0], 1.0);
        logger.write(&s).unwrap();
        let path = logger.disable().unwrap();
        let before = fs::read_to_string(&path).unwrap();

        s.append_batch(&[3.0], 1.0);
        assert!(!logger.write(&s).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
        assert!(!logger.write_allan(&[]).unwrap());
    }

    #[test]
    fn allan_companion_is_written() {
        let dir = tempdir().unwrap();
        let mut logger = SeriesLogger::new(dir.path(), "ks");
        logger
            .enable(0, MeasurementMode::Reciprocal, 1.0, &at_noon())
            .unwrap();
        let points = [AllanPoint {
            tau: 1.0,
            deviation: 2e-12,
            deviation_error: 1e-13,
            count: 7,
        }];
        assert!(logger.write_allan(&points).unwrap());
        let text = fs::read_to_string(logger.allan_path().unwrap()).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.ends_with("7.000000000000000000e+00\n"));
    }
}

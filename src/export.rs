use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use serde::Deserialize;

use crate::cycling::hysteresis::HysteresisLoop;
use crate::cycling::summary::SummaryRow;
use crate::cycling::table::{CycleTable, TableChannel};
use crate::error::CyclingError;
use crate::pipeline::CyclingReport;

/// Longest destination path accepted, in characters (Windows `MAX_PATH`).
pub const MAX_PATH_LEN: usize = 260;

/// File format for every output of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Parquet,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Parquet => "parquet",
        }
    }
}

// ---------------------------------------------------------------------------
// Path checks and naming
// ---------------------------------------------------------------------------

/// Fail with `PathTooLong` before anything is written to `path`.
pub fn check_path_len(path: &Path) -> std::result::Result<(), CyclingError> {
    let len = path.to_string_lossy().chars().count();
    if len > MAX_PATH_LEN {
        return Err(CyclingError::PathTooLong {
            path: path.to_path_buf(),
            len,
            limit: MAX_PATH_LEN,
        });
    }
    Ok(())
}

pub fn cycle_file_name(cycle: u32, format: ExportFormat) -> String {
    format!("Cycle_{cycle}.{}", format.extension())
}

/// Cycle number encoded in a `Cycle_<n>` file name.
///
/// The name must contain exactly one `Cycle_<digits>` token.
pub fn cycle_number_from_path(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let numbers: Vec<&str> = stem
        .match_indices("Cycle_")
        .map(|(i, tok)| {
            let rest = &stem[i + tok.len()..];
            let end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            &rest[..end]
        })
        .filter(|digits| !digits.is_empty())
        .collect();
    match numbers.as_slice() {
        [digits] => digits.parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Generic column writer
// ---------------------------------------------------------------------------

/// Write named float columns; NaN and missing cells become empty CSV cells
/// or Parquet nulls. Columns may differ in length.
pub fn write_columns(
    path: &Path,
    headers: &[String],
    columns: &[&[f64]],
    format: ExportFormat,
) -> Result<()> {
    check_path_len(path)?;
    let written = match format {
        ExportFormat::Csv => write_csv(path, headers, columns),
        ExportFormat::Parquet => write_parquet(path, headers, columns),
    };
    written.with_context(|| format!("writing {}", path.display()))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

fn cell(col: &[f64], row: usize) -> Option<f64> {
    col.get(row).copied().filter(|v| !v.is_nan())
}

fn write_csv(path: &Path, headers: &[String], columns: &[&[f64]]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV file")?;
    writer.write_record(headers)?;

    let n_rows = columns.iter().map(|c| c.len()).max().unwrap_or(0);
    for row in 0..n_rows {
        writer.write_record(columns.iter().map(|col| match cell(col, row) {
            Some(v) => v.to_string(),
            None => String::new(),
        }))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_parquet(path: &Path, headers: &[String], columns: &[&[f64]]) -> Result<()> {
    let n_rows = columns.iter().map(|c| c.len()).max().unwrap_or(0);

    let schema = Arc::new(Schema::new(
        headers
            .iter()
            .map(|h| Field::new(h, DataType::Float64, true))
            .collect::<Vec<_>>(),
    ));
    let arrays: Vec<ArrayRef> = columns
        .iter()
        .map(|col| {
            let values: Vec<Option<f64>> = (0..n_rows).map(|row| cell(col, row)).collect();
            Arc::new(Float64Array::from(values)) as ArrayRef
        })
        .collect();

    let batch = RecordBatch::try_new(schema.clone(), arrays).context("building record batch")?;
    let file = File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Run outputs
// ---------------------------------------------------------------------------

/// The full rectangular cycle table, columns in table order.
pub fn write_cycle_table(table: &CycleTable, path: &Path, format: ExportFormat) -> Result<()> {
    let (headers, columns): (Vec<String>, Vec<&[f64]>) =
        table.iter().map(|(k, v)| (k.to_string(), v)).unzip();
    write_columns(path, &headers, &columns, format)
}

/// One `Cycle_<n>` file per paired cycle in `dir`. Every destination is
/// length-checked before the first file is written.
pub fn write_cycle_files(
    table: &CycleTable,
    dir: &Path,
    format: ExportFormat,
) -> Result<Vec<PathBuf>> {
    let targets: Vec<(u32, PathBuf)> = table
        .paired_cycles()
        .into_iter()
        .map(|n| (n, dir.join(cycle_file_name(n, format))))
        .collect();
    for (_, path) in &targets {
        check_path_len(path)?;
    }

    let mut written = Vec::with_capacity(targets.len());
    for (n, path) in targets {
        if let Some(cycle) = table.select_cycle(n) {
            write_cycle_table(&cycle, &path, format)?;
            written.push(path);
        }
    }
    Ok(written)
}

pub const SUMMARY_HEADERS: [&str; 4] = [
    "Cycle number",
    "Max charge capacity/mA.h.g^-1",
    "Max discharge capacity/mA.h.g^-1",
    "Coulombic efficiency/%",
];

/// Table of maximum capacities and efficiency per paired cycle.
pub fn write_summary(rows: &[SummaryRow], path: &Path, format: ExportFormat) -> Result<()> {
    let cycle: Vec<f64> = rows.iter().map(|r| r.cycle as f64).collect();
    let charge: Vec<f64> = rows.iter().map(|r| r.max_charge_capacity).collect();
    let discharge: Vec<f64> = rows.iter().map(|r| r.max_discharge_capacity).collect();
    let efficiency: Vec<f64> = rows.iter().map(|r| r.coulombic_efficiency).collect();

    let headers: Vec<String> = SUMMARY_HEADERS.iter().map(|h| h.to_string()).collect();
    write_columns(
        path,
        &headers,
        &[
            cycle.as_slice(),
            charge.as_slice(),
            discharge.as_slice(),
            efficiency.as_slice(),
        ],
        format,
    )
}

/// First half and mirrored second half of a hysteresis loop for `cycle`.
pub fn write_hysteresis(
    hysteresis: &HysteresisLoop,
    cycle: u32,
    path: &Path,
    format: ExportFormat,
) -> Result<()> {
    let first = hysteresis.first;
    let second = first.opposite();
    let cap = TableChannel::Capacity.prefix();
    let pot = TableChannel::Potential.prefix();
    let headers = vec![
        format!("{cap} ({}{cycle})", first.letter()),
        format!("{pot} ({}{cycle})", first.letter()),
        format!("Mirrored {cap} ({}{cycle})", second.letter()),
        format!("{pot} ({}{cycle})", second.letter()),
    ];
    write_columns(
        path,
        &headers,
        &[
            hysteresis.first_half.capacity.as_slice(),
            hysteresis.first_half.potential.as_slice(),
            hysteresis.mirrored.capacity.as_slice(),
            hysteresis.mirrored.potential.as_slice(),
        ],
        format,
    )
}

/// Destinations of every file one run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutputs {
    pub dir: PathBuf,
    pub format: ExportFormat,
    pub cycle_table: PathBuf,
    pub summary: PathBuf,
    pub hysteresis: PathBuf,
    pub separate_cycles: bool,
}

impl RunOutputs {
    pub fn new(dir: &Path, stem: &str, format: ExportFormat, separate_cycles: bool) -> Self {
        let ext = format.extension();
        RunOutputs {
            dir: dir.to_path_buf(),
            format,
            cycle_table: dir.join(format!("{stem}_cycles.{ext}")),
            summary: dir.join(format!("Max capacities.{ext}")),
            hysteresis: dir.join(format!("Hysteresis (Cycle 1).{ext}")),
            separate_cycles,
        }
    }

    /// Length-check every destination, including per-cycle files.
    pub fn check(&self, paired: &[u32]) -> std::result::Result<(), CyclingError> {
        check_path_len(&self.cycle_table)?;
        check_path_len(&self.summary)?;
        check_path_len(&self.hysteresis)?;
        if self.separate_cycles {
            for &n in paired {
                check_path_len(&self.dir.join(cycle_file_name(n, self.format)))?;
            }
        }
        Ok(())
    }

    /// Check all paths, then write every output of `report`.
    pub fn write_all(&self, report: &CyclingReport) -> Result<()> {
        let paired: Vec<u32> = report.summary.iter().map(|r| r.cycle).collect();
        self.check(&paired)?;
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;

        write_cycle_table(&report.cycle_table, &self.cycle_table, self.format)?;
        write_summary(&report.summary, &self.summary, self.format)?;
        write_hysteresis(
            &report.first_cycle_hysteresis,
            1,
            &self.hysteresis,
            self.format,
        )?;
        if self.separate_cycles {
            let files = write_cycle_files(&report.cycle_table, &self.dir, self.format)?;
            log::info!("Saved {} separate cycle files", files.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycling::capacity::Cycle;
    use crate::cycling::table::build_cycle_table;
    use crate::data::loader::load_file;
    use crate::data::model::Polarity;

    fn small_table() -> CycleTable {
        let half = |number, polarity, n: usize| Cycle {
            number,
            polarity,
            time: (0..n).map(|i| i as f64).collect(),
            potential: vec![3.0; n],
            capacity: (0..n).map(|i| i as f64 * 0.25).collect(),
        };
        build_cycle_table(&[
            half(1, Polarity::Charge, 3),
            half(1, Polarity::Discharge, 2),
            half(2, Polarity::Charge, 2),
            half(2, Polarity::Discharge, 2),
        ])
    }

    #[test]
    fn long_paths_are_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let long = dir.path().join("x".repeat(MAX_PATH_LEN + 1) + ".csv");
        let err = write_cycle_table(&small_table(), &long, ExportFormat::Csv).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CyclingError>(),
            Some(CyclingError::PathTooLong { .. })
        ));
        assert!(!long.exists());
    }

    #[test]
    fn csv_round_trips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cycles.csv");
        let table = small_table();
        write_cycle_table(&table, &path, ExportFormat::Csv).unwrap();

        let raw = load_file(&path).unwrap();
        let reloaded = CycleTable::from_raw(&raw).unwrap();
        assert_eq!(reloaded.n_columns(), table.n_columns());
        let d1 = reloaded
            .get(TableChannel::Capacity, Polarity::Discharge, 1)
            .unwrap();
        assert_eq!(d1[1], 0.25);
        assert!(d1[2].is_nan());
    }

    #[test]
    fn parquet_round_trips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cycles.parquet");
        write_cycle_table(&small_table(), &path, ExportFormat::Parquet).unwrap();

        let raw = load_file(&path).unwrap();
        let reloaded = CycleTable::from_raw(&raw).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.paired_cycles(), vec![1, 2]);
    }

    #[test]
    fn separate_cycle_files_are_named_by_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_cycle_files(&small_table(), dir.path(), ExportFormat::Csv).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(cycle_number_from_path(&written[1]), Some(2));
        assert!(dir.path().join("Cycle_1.csv").exists());
    }

    #[test]
    fn run_outputs_are_checked_together() {
        let short = RunOutputs::new(Path::new("/tmp/out"), "run", ExportFormat::Parquet, true);
        assert!(short.check(&[1, 2, 3]).is_ok());
        assert_eq!(short.summary, Path::new("/tmp/out/Max capacities.parquet"));

        let deep = Path::new("/tmp").join("d".repeat(MAX_PATH_LEN - 10));
        let outputs = RunOutputs::new(&deep, "run", ExportFormat::Csv, false);
        assert!(matches!(
            outputs.check(&[]),
            Err(CyclingError::PathTooLong { .. })
        ));
    }

    #[test]
    fn cycle_number_needs_exactly_one_token() {
        assert_eq!(cycle_number_from_path(Path::new("/data/Cycle_12.csv")), Some(12));
        assert_eq!(cycle_number_from_path(Path::new("run3_Cycle_4.parquet")), Some(4));
        assert_eq!(cycle_number_from_path(Path::new("cycles.csv")), None);
        assert_eq!(cycle_number_from_path(Path::new("Cycle_1_Cycle_2.csv")), None);
        assert_eq!(cycle_number_from_path(Path::new("Cycle_.csv")), None);
    }
}

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, Float64Array};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::RawTable;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a raw cycling table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.txt` / `.tsv` - tab-delimited instrument export
/// * `.mpt`     - EC-Lab ASCII export; the `Nb header lines` preamble is skipped
/// * `.csv`     - comma-separated, header row with column names
/// * `.json`    - `[{ "time/s": 0.0, "Ecell/V": 3.1, ... }, ...]`
/// * `.parquet` - one numeric column per channel
pub fn load_file(path: &Path) -> Result<RawTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "txt" | "tsv" | "mpt" => load_delimited(path, b'\t')?,
        "csv" => load_delimited(path, b',')?,
        "json" => load_json(path)?,
        "parquet" | "pq" => load_parquet(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };

    log::info!(
        "Loaded {} rows x {} columns from {}",
        table.n_rows(),
        table.n_columns(),
        path.display()
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// Delimited text loader
// ---------------------------------------------------------------------------

/// Header row with column names, then one sample per row.
/// Cells that do not parse as numbers (including empty cells) become NaN.
///
/// Bytes are decoded lossily: instrument exports are often Windows-1252
/// (`Capacitance/µF`, `Temperature/°C`), and only the channel columns
/// need to be readable.
fn load_delimited(path: &Path, delimiter: u8) -> Result<RawTable> {
    let bytes = std::fs::read(path).context("reading delimited file")?;
    let skip = ec_lab_preamble_lines(&bytes)
        .with_context(|| format!("reading EC-Lab preamble of {}", path.display()))?;
    if skip > 0 {
        log::debug!("Skipping {skip} EC-Lab preamble lines");
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(skip_lines(&bytes, skip));

    // Exports often end every line with a delimiter, leaving blank headers.
    let named: Vec<(usize, String)> = reader
        .byte_headers()
        .context("reading headers")?
        .iter()
        .enumerate()
        .map(|(i, h)| (i, String::from_utf8_lossy(h).trim().to_string()))
        .filter(|(_, h)| !h.is_empty())
        .collect();

    if named.is_empty() {
        bail!("{}: no column headers", path.display());
    }

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); named.len()];

    for (row_no, result) in reader.byte_records().enumerate() {
        let record = result.with_context(|| format!("row {row_no}"))?;
        for ((col_idx, _), column) in named.iter().zip(columns.iter_mut()) {
            let raw = record.get(*col_idx).unwrap_or_default();
            column.push(parse_cell(&String::from_utf8_lossy(raw)));
        }
    }

    let headers = named.into_iter().map(|(_, h)| h).collect();

    RawTable::from_columns(headers, columns)
        .with_context(|| format!("building table from {}", path.display()))
}

/// EC-Lab `.mpt` files open with `EC-Lab ASCII FILE` and a line
/// `Nb header lines : N`, where the N-th line holds the column names.
/// Returns how many lines precede that row (0 for plain exports).
fn ec_lab_preamble_lines(bytes: &[u8]) -> Result<usize> {
    let mut lines = bytes
        .split(|&b| b == b'\n')
        .map(|l| String::from_utf8_lossy(l).trim().to_string());
    match lines.next() {
        Some(first) if first.starts_with("EC-Lab ASCII FILE") => {}
        _ => return Ok(0),
    }
    for line in lines {
        if let Some(rest) = line.strip_prefix("Nb header lines") {
            let n: usize = rest
                .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
                .parse()
                .with_context(|| format!("bad header line count '{line}'"))?;
            if n == 0 {
                bail!("header line count is zero");
            }
            return Ok(n - 1);
        }
    }
    bail!("no 'Nb header lines' entry")
}

fn skip_lines(bytes: &[u8], n: usize) -> &[u8] {
    let mut rest = bytes;
    for _ in 0..n {
        match rest.iter().position(|&b| b == b'\n') {
            Some(i) => rest = &rest[i + 1..],
            None => return &[],
        }
    }
    rest
}

fn parse_cell(s: &str) -> f64 {
    let s = s.trim();
    // Some instruments write a decimal comma in tab-delimited exports.
    s.parse::<f64>()
        .or_else(|_| s.replace(',', ".").parse::<f64>())
        .unwrap_or(f64::NAN)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Records-oriented JSON (`df.to_json(orient='records')`).  Column names are
/// taken from the first record; non-numeric values become NaN.
fn load_json(path: &Path) -> Result<RawTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let headers: Vec<String> = match records.first() {
        Some(first) => first
            .as_object()
            .context("Row 0 is not a JSON object")?
            .keys()
            .cloned()
            .collect(),
        None => bail!("{}: JSON array is empty", path.display()),
    };

    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(records.len()); headers.len()];

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        for (header, column) in headers.iter().zip(columns.iter_mut()) {
            column.push(obj.get(header).map(json_to_f64).unwrap_or(f64::NAN));
        }
    }

    RawTable::from_columns(headers, columns)
        .with_context(|| format!("building table from {}", path.display()))
}

fn json_to_f64(val: &JsonValue) -> f64 {
    match val {
        JsonValue::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        JsonValue::String(s) => parse_cell(s),
        _ => f64::NAN,
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one numeric column per channel.
///
/// Integer and float columns are cast to Float64; nulls become NaN and
/// non-numeric columns are kept as all-NaN so the header is still visible.
/// Works with files written by **Pandas** and **Polars**.
fn load_parquet(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for (col_idx, column) in columns.iter_mut().enumerate() {
            extend_f64(column, batch.column(col_idx))
                .with_context(|| format!("column '{}'", headers[col_idx]))?;
        }
    }

    RawTable::from_columns(headers, columns)
        .with_context(|| format!("building table from {}", path.display()))
}

// -- Parquet / Arrow helpers --

fn extend_f64(out: &mut Vec<f64>, col: &Arc<dyn Array>) -> Result<()> {
    let numeric = matches!(
        col.data_type(),
        DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    );
    if !numeric {
        out.extend(std::iter::repeat(f64::NAN).take(col.len()));
        return Ok(());
    }

    let as_f64 = cast(col, &DataType::Float64).context("casting to Float64")?;
    let arr = as_f64
        .as_any()
        .downcast_ref::<Float64Array>()
        .context("expected Float64Array after cast")?;
    out.extend(arr.iter().map(|v| v.unwrap_or(f64::NAN)));
    Ok(())
}

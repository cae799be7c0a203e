use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use log::debug;

use super::capacity::Cycle;
use crate::data::model::{Polarity, RawTable};
use crate::error::{CyclingError, Result};

/// Padding value for cells past the end of a shorter cycle.
pub const NO_DATA: f64 = f64::NAN;

// ---------------------------------------------------------------------------
// ColumnKey - (channel, polarity, cycle number) composite key
// ---------------------------------------------------------------------------

/// Channels stored per cycle in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TableChannel {
    Time,
    Potential,
    Capacity,
}

impl TableChannel {
    pub const ALL: [TableChannel; 3] = [
        TableChannel::Time,
        TableChannel::Potential,
        TableChannel::Capacity,
    ];

    /// Header text preceding the `(C1)` / `(D1)` suffix.
    pub fn prefix(self) -> &'static str {
        match self {
            TableChannel::Time => "Elapsed time/s",
            TableChannel::Potential => "Ecell/V",
            TableChannel::Capacity => "Capacity/mA.h.g^-1",
        }
    }

    fn from_prefix(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.prefix() == s)
    }
}

/// Orders columns charge-first, then by cycle, then time/potential/capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnKey {
    pub polarity: Polarity,
    pub cycle: u32,
    pub channel: TableChannel,
}

impl ColumnKey {
    pub fn new(channel: TableChannel, polarity: Polarity, cycle: u32) -> Self {
        ColumnKey {
            polarity,
            cycle,
            channel,
        }
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}{})",
            self.channel.prefix(),
            self.polarity.letter(),
            self.cycle
        )
    }
}

impl FromStr for ColumnKey {
    type Err = CyclingError;

    /// Parse `"Ecell/V (D3)"` style headers.
    fn from_str(s: &str) -> Result<Self> {
        let unknown = || CyclingError::UnknownColumn { name: s.to_string() };

        let (prefix, suffix) = s.trim().rsplit_once(" (").ok_or_else(unknown)?;
        let tag = suffix.strip_suffix(')').ok_or_else(unknown)?;
        let mut chars = tag.chars();
        let polarity = chars
            .next()
            .and_then(Polarity::from_letter)
            .ok_or_else(unknown)?;
        let cycle: u32 = chars.as_str().parse().map_err(|_| unknown())?;
        let channel = TableChannel::from_prefix(prefix).ok_or_else(unknown)?;
        if cycle == 0 {
            return Err(unknown());
        }
        Ok(ColumnKey::new(channel, polarity, cycle))
    }
}

// ---------------------------------------------------------------------------
// CycleTable - rectangular, NaN-padded table of all cycles
// ---------------------------------------------------------------------------

/// One column per (channel, polarity, cycle), all padded to the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleTable {
    columns: BTreeMap<ColumnKey, Vec<f64>>,
    len: usize,
}

/// Reshape per-cycle samples into a rectangular table.
pub fn build_cycle_table(cycles: &[Cycle]) -> CycleTable {
    let mut columns = BTreeMap::new();
    for cycle in cycles {
        for (channel, values) in [
            (TableChannel::Time, &cycle.time),
            (TableChannel::Potential, &cycle.potential),
            (TableChannel::Capacity, &cycle.capacity),
        ] {
            columns.insert(
                ColumnKey::new(channel, cycle.polarity, cycle.number),
                values.clone(),
            );
        }
    }
    CycleTable::padded(columns)
}

impl CycleTable {
    fn padded(mut columns: BTreeMap<ColumnKey, Vec<f64>>) -> Self {
        let len = columns.values().map(Vec::len).max().unwrap_or(0);
        for col in columns.values_mut() {
            col.resize(len, NO_DATA);
        }
        debug!("Cycle table: {} columns x {len} rows", columns.len());
        CycleTable { columns, len }
    }

    /// Rebuild a table from a reloaded export. Headers that are not cycle
    /// table columns (an index column, for instance) are skipped.
    pub fn from_raw(raw: &RawTable) -> Result<Self> {
        let mut columns = BTreeMap::new();
        for header in raw.headers() {
            match header.parse::<ColumnKey>() {
                Ok(key) => {
                    let values = raw.column(header).unwrap_or_default().to_vec();
                    columns.insert(key, values);
                }
                Err(_) => debug!("Skipping non-cycle column '{header}'"),
            }
        }
        if columns.is_empty() {
            return Err(CyclingError::EmptyTable);
        }
        Ok(Self::padded(columns))
    }

    /// Number of rows (length of every column).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn get(&self, channel: TableChannel, polarity: Polarity, cycle: u32) -> Option<&[f64]> {
        self.columns
            .get(&ColumnKey::new(channel, polarity, cycle))
            .map(Vec::as_slice)
    }

    /// Columns in export order.
    pub fn iter(&self) -> impl Iterator<Item = (&ColumnKey, &[f64])> {
        self.columns.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Cycle numbers with a capacity column for `polarity`, ascending.
    pub fn cycles(&self, polarity: Polarity) -> Vec<u32> {
        self.columns
            .keys()
            .filter(|k| k.polarity == polarity && k.channel == TableChannel::Capacity)
            .map(|k| k.cycle)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Cycle numbers present in both polarities, ascending.
    pub fn paired_cycles(&self) -> Vec<u32> {
        let discharge: BTreeSet<u32> = self.cycles(Polarity::Discharge).into_iter().collect();
        self.cycles(Polarity::Charge)
            .into_iter()
            .filter(|n| discharge.contains(n))
            .collect()
    }

    /// Both halves of one cycle, re-padded to their own longest column.
    pub fn select_cycle(&self, cycle: u32) -> Option<CycleTable> {
        let columns: BTreeMap<ColumnKey, Vec<f64>> = self
            .columns
            .iter()
            .filter(|(k, _)| k.cycle == cycle)
            .map(|(k, v)| (*k, trim_padding(v).to_vec()))
            .collect();
        if columns.is_empty() {
            None
        } else {
            Some(Self::padded(columns))
        }
    }
}

/// Drop trailing no-data cells.
pub fn trim_padding(values: &[f64]) -> &[f64] {
    let end = values
        .iter()
        .rposition(|v| !v.is_nan())
        .map_or(0, |i| i + 1);
    &values[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle(number: u32, polarity: Polarity, n: usize) -> Cycle {
        let time: Vec<f64> = (0..n).map(|i| i as f64).collect();
        Cycle {
            number,
            polarity,
            potential: vec![3.0; n],
            capacity: time.iter().map(|t| t * 0.5).collect(),
            time,
        }
    }

    #[test]
    fn column_names_round_trip() {
        let key = ColumnKey::new(TableChannel::Capacity, Polarity::Discharge, 12);
        assert_eq!(key.to_string(), "Capacity/mA.h.g^-1 (D12)");
        assert_eq!(key.to_string().parse::<ColumnKey>().unwrap(), key);
        assert_eq!(
            "Elapsed time/s (C1)".parse::<ColumnKey>().unwrap(),
            ColumnKey::new(TableChannel::Time, Polarity::Charge, 1)
        );
    }

    #[test]
    fn malformed_column_names_are_rejected() {
        for bad in ["", "Ecell/V", "Ecell/V (X1)", "Ecell/V (C)", "Ecell/V (C0)", "Foo (C1)"] {
            assert!(
                matches!(bad.parse::<ColumnKey>(), Err(CyclingError::UnknownColumn { .. })),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn table_is_rectangular_and_nan_padded() {
        let table = build_cycle_table(&[
            cycle(1, Polarity::Charge, 3),
            cycle(1, Polarity::Discharge, 5),
            cycle(2, Polarity::Charge, 2),
            cycle(2, Polarity::Discharge, 4),
        ]);
        assert_eq!(table.len(), 5);
        assert_eq!(table.n_columns(), 12);
        assert!(table.iter().all(|(_, col)| col.len() == 5));

        let c1 = table.get(TableChannel::Capacity, Polarity::Charge, 1).unwrap();
        assert_eq!(&c1[..3], &[0.0, 0.5, 1.0]);
        assert!(c1[3].is_nan() && c1[4].is_nan());
    }

    #[test]
    fn columns_are_ordered_charge_first() {
        let table = build_cycle_table(&[
            cycle(1, Polarity::Discharge, 1),
            cycle(2, Polarity::Charge, 1),
            cycle(1, Polarity::Charge, 1),
        ]);
        let names: Vec<String> = table.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(names[0], "Elapsed time/s (C1)");
        assert_eq!(names[2], "Capacity/mA.h.g^-1 (C1)");
        assert_eq!(names[3], "Elapsed time/s (C2)");
        assert_eq!(names[6], "Elapsed time/s (D1)");
    }

    #[test]
    fn paired_cycles_need_both_polarities() {
        let table = build_cycle_table(&[
            cycle(1, Polarity::Charge, 2),
            cycle(1, Polarity::Discharge, 2),
            cycle(2, Polarity::Charge, 2),
        ]);
        assert_eq!(table.cycles(Polarity::Charge), vec![1, 2]);
        assert_eq!(table.paired_cycles(), vec![1]);
    }

    #[test]
    fn select_cycle_trims_to_that_cycle() {
        let table = build_cycle_table(&[
            cycle(1, Polarity::Charge, 8),
            cycle(1, Polarity::Discharge, 8),
            cycle(2, Polarity::Charge, 2),
            cycle(2, Polarity::Discharge, 3),
        ]);
        let second = table.select_cycle(2).unwrap();
        assert_eq!(second.len(), 3);
        assert_eq!(second.n_columns(), 6);
        assert!(table.select_cycle(3).is_none());
    }

    #[test]
    fn reload_from_raw_skips_foreign_columns() {
        let raw = RawTable::from_columns(
            vec![
                "index".into(),
                "Capacity/mA.h.g^-1 (C1)".into(),
                "Ecell/V (C1)".into(),
            ],
            vec![vec![0.0, 1.0], vec![0.0, 2.0], vec![3.0, f64::NAN]],
        )
        .unwrap();
        let table = CycleTable::from_raw(&raw).unwrap();
        assert_eq!(table.n_columns(), 2);
        assert_eq!(
            table.get(TableChannel::Capacity, Polarity::Charge, 1),
            Some(&[0.0, 2.0][..])
        );
    }

    #[test]
    fn trim_padding_keeps_interior_nan() {
        let v = [1.0, f64::NAN, 2.0, f64::NAN, f64::NAN];
        assert_eq!(trim_padding(&v).len(), 3);
        assert!(trim_padding(&[f64::NAN]).is_empty());
    }
}

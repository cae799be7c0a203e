use log::{debug, warn};

use super::model::{Channel, ChannelSeries, RawTable};
use crate::error::{CyclingError, Result};

// ---------------------------------------------------------------------------
// Header alias tables
// ---------------------------------------------------------------------------

/// Unit a current alias is recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentUnit {
    Milliamps,
    Amps,
}

/// Recognised elapsed-time headers, first match wins.
pub const TIME_ALIASES: &[&str] = &[
    "time/s",
    "Time/s",
    "Elapsed time/s",
    "Test Time (s)",
    "Test_Time(s)",
    "Time (s)",
    "time",
];

/// Recognised potential headers, first match wins. `Ecell/V` comes before
/// `Ewe/V` because EC-Lab exports both and the cell voltage is the one used.
pub const POTENTIAL_ALIASES: &[&str] = &[
    "Ecell/V",
    "Ewe/V",
    "Voltage/V",
    "Voltage(V)",
    "Voltage (V)",
    "Potential/V",
    "potential",
];

/// Recognised current headers with their unit, first match wins.
/// `<I>/mA` (averaged) is preferred over the instantaneous `I/mA`.
pub const CURRENT_ALIASES: &[(&str, CurrentUnit)] = &[
    ("<I>/mA", CurrentUnit::Milliamps),
    ("I/mA", CurrentUnit::Milliamps),
    ("control/mA", CurrentUnit::Milliamps),
    ("Current/mA", CurrentUnit::Milliamps),
    ("Current(mA)", CurrentUnit::Milliamps),
    ("Current (mA)", CurrentUnit::Milliamps),
    ("I/A", CurrentUnit::Amps),
    ("Current/A", CurrentUnit::Amps),
    ("Current(A)", CurrentUnit::Amps),
    ("Current (A)", CurrentUnit::Amps),
];

// ---------------------------------------------------------------------------
// Resolution result
// ---------------------------------------------------------------------------

/// One channel after alias lookup: either the data or an explicit marker
/// that no recognised column exists.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedColumn {
    Available { header: String, values: Vec<f64> },
    Unavailable,
}

impl ResolvedColumn {
    pub fn is_available(&self) -> bool {
        matches!(self, ResolvedColumn::Available { .. })
    }

    pub fn header(&self) -> Option<&str> {
        match self {
            ResolvedColumn::Available { header, .. } => Some(header),
            ResolvedColumn::Unavailable => None,
        }
    }
}

/// The three channels of a dataset, some of which may be unavailable.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChannels {
    pub potential: ResolvedColumn,
    pub time: ResolvedColumn,
    pub current: ResolvedColumn,
}

impl ResolvedChannels {
    fn get(&self, channel: Channel) -> &ResolvedColumn {
        match channel {
            Channel::Time => &self.time,
            Channel::Potential => &self.potential,
            Channel::Current => &self.current,
        }
    }

    /// Channels with no recognised column.
    pub fn missing(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|ch| !self.get(*ch).is_available())
            .collect()
    }

    /// Hand over the series, failing with every unavailable channel named.
    pub fn into_series(self) -> Result<ChannelSeries> {
        let missing = self.missing();
        match (self.time, self.potential, self.current) {
            (
                ResolvedColumn::Available { values: time, .. },
                ResolvedColumn::Available { values: potential, .. },
                ResolvedColumn::Available { values: current, .. },
            ) => ChannelSeries::new(time, potential, current),
            _ => Err(CyclingError::MissingChannel { channels: missing }),
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Select the potential, time and current columns of `table` by alias.
///
/// Currents recorded in amps are converted to milliamps. A channel with no
/// recognised header comes back as [`ResolvedColumn::Unavailable`]; if all
/// three are missing the run cannot mean anything and this fails outright.
pub fn resolve_channels(table: &RawTable) -> Result<ResolvedChannels> {
    let time = resolve_plain(table, Channel::Time, TIME_ALIASES);
    let potential = resolve_plain(table, Channel::Potential, POTENTIAL_ALIASES);
    let current = resolve_current(table);

    let resolved = ResolvedChannels {
        potential,
        time,
        current,
    };

    let missing = resolved.missing();
    if missing.len() == Channel::ALL.len() {
        return Err(CyclingError::MissingChannel { channels: missing });
    }
    for ch in &missing {
        warn!("No recognised column for {ch}; channel is unavailable");
    }
    Ok(resolved)
}

fn resolve_plain(table: &RawTable, channel: Channel, aliases: &[&str]) -> ResolvedColumn {
    for alias in aliases {
        if let Some(values) = table.column(alias) {
            debug!("Resolved {channel} to column '{alias}'");
            return ResolvedColumn::Available {
                header: alias.to_string(),
                values: values.to_vec(),
            };
        }
    }
    ResolvedColumn::Unavailable
}

fn resolve_current(table: &RawTable) -> ResolvedColumn {
    for (alias, unit) in CURRENT_ALIASES {
        if let Some(values) = table.column(alias) {
            debug!("Resolved current to column '{alias}' ({unit:?})");
            let values = match unit {
                CurrentUnit::Milliamps => values.to_vec(),
                CurrentUnit::Amps => values.iter().map(|a| a * 1000.0).collect(),
            };
            return ResolvedColumn::Available {
                header: alias.to_string(),
                values,
            };
        }
    }
    ResolvedColumn::Unavailable
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(cols: &[(&str, Vec<f64>)]) -> RawTable {
        RawTable::from_columns(
            cols.iter().map(|(h, _)| h.to_string()).collect(),
            cols.iter().map(|(_, v)| v.clone()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn resolves_ec_lab_headers() {
        let t = table(&[
            ("time/s", vec![0.0, 1.0]),
            ("Ecell/V", vec![3.0, 3.1]),
            ("<I>/mA", vec![1.0, 1.0]),
            ("cycle number", vec![1.0, 1.0]),
        ]);
        let series = resolve_channels(&t).unwrap().into_series().unwrap();
        assert_eq!(series.time, vec![0.0, 1.0]);
        assert_eq!(series.potential, vec![3.0, 3.1]);
        assert_eq!(series.current, vec![1.0, 1.0]);
    }

    #[test]
    fn first_alias_wins_over_later_duplicates() {
        let t = table(&[
            ("I/mA", vec![2.0]),
            ("<I>/mA", vec![1.0]),
            ("Ewe/V", vec![9.0]),
            ("Ecell/V", vec![3.0]),
            ("time/s", vec![0.0]),
        ]);
        let r = resolve_channels(&t).unwrap();
        assert_eq!(r.current.header(), Some("<I>/mA"));
        assert_eq!(r.potential.header(), Some("Ecell/V"));
    }

    #[test]
    fn amps_are_converted_to_milliamps() {
        let t = table(&[
            ("Test Time (s)", vec![0.0, 1.0]),
            ("Voltage(V)", vec![3.0, 3.1]),
            ("Current(A)", vec![0.002, -0.0015]),
        ]);
        let series = resolve_channels(&t).unwrap().into_series().unwrap();
        assert!((series.current[0] - 2.0).abs() < 1e-12);
        assert!((series.current[1] + 1.5).abs() < 1e-12);
    }

    #[test]
    fn partially_missing_channels_are_marked_unavailable() {
        let t = table(&[("time/s", vec![0.0]), ("Ecell/V", vec![3.0])]);
        let r = resolve_channels(&t).unwrap();
        assert_eq!(r.current, ResolvedColumn::Unavailable);
        assert_eq!(r.missing(), vec![Channel::Current]);
        assert_eq!(
            r.into_series(),
            Err(CyclingError::MissingChannel {
                channels: vec![Channel::Current]
            })
        );
    }

    #[test]
    fn all_channels_missing_is_fatal() {
        let t = table(&[("foo", vec![0.0]), ("bar", vec![1.0])]);
        assert_eq!(
            resolve_channels(&t),
            Err(CyclingError::MissingChannel {
                channels: vec![Channel::Time, Channel::Potential, Channel::Current]
            })
        );
    }
}

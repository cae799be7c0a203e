use log::info;

use crate::cycling::capacity::extract_cycles;
use crate::cycling::hysteresis::{extract_hysteresis, Curve, HysteresisLoop};
use crate::cycling::segment::{segment, SegmentMode};
use crate::cycling::summary::{summarize, SummaryRow};
use crate::cycling::table::{build_cycle_table, CycleTable};
use crate::data::columns::resolve_channels;
use crate::data::model::{ActiveMass, ChannelSeries, Polarity, RawTable};
use crate::error::{CyclingError, Result};

// ---------------------------------------------------------------------------
// Run options and result
// ---------------------------------------------------------------------------

/// Everything the operator supplies for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisOptions {
    /// Active mass in grams.
    pub active_mass_g: f64,
    pub mode: SegmentMode,
    /// Whether each cycle starts with its charge half.
    pub charge_first: bool,
}

/// All outputs of one run over one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct CyclingReport {
    pub charge_detected: u32,
    pub discharge_detected: u32,
    pub cycle_table: CycleTable,
    pub summary: Vec<SummaryRow>,
    /// Hysteresis loop of cycle 1.
    pub first_cycle_hysteresis: HysteresisLoop,
}

impl CyclingReport {
    pub fn paired_cycles(&self) -> usize {
        self.summary.len()
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Resolve channels of a raw table and run the full analysis.
///
/// The active mass is validated before anything else is looked at.
pub fn analyze(table: &RawTable, options: &AnalysisOptions) -> Result<CyclingReport> {
    let active_mass = ActiveMass::new(options.active_mass_g)?;
    let series = resolve_channels(table)?.into_series()?;
    run(&series, active_mass, options)
}

/// Run the analysis on already-resolved series.
pub fn analyze_series(series: &ChannelSeries, options: &AnalysisOptions) -> Result<CyclingReport> {
    let active_mass = ActiveMass::new(options.active_mass_g)?;
    run(series, active_mass, options)
}

fn run(
    series: &ChannelSeries,
    active_mass: ActiveMass,
    options: &AnalysisOptions,
) -> Result<CyclingReport> {
    info!(
        "Analysing {} samples, active mass {} g, mode {:?}",
        series.len(),
        active_mass.grams(),
        options.mode
    );

    let segmentation = segment(&series.current, options.mode)?;
    let cycles = extract_cycles(series, &segmentation, active_mass)?;
    let cycle_table = build_cycle_table(&cycles);
    let summary = summarize(&cycle_table)?;
    let first_cycle_hysteresis = cycle_hysteresis(&cycle_table, 1, options.charge_first)?;

    info!(
        "{} paired cycles, cycle table {} rows x {} columns",
        summary.len(),
        cycle_table.len(),
        cycle_table.n_columns()
    );

    Ok(CyclingReport {
        charge_detected: segmentation.charge_detected,
        discharge_detected: segmentation.discharge_detected,
        cycle_table,
        summary,
        first_cycle_hysteresis,
    })
}

/// Hysteresis loop of one cycle of a table.
pub fn cycle_hysteresis(
    table: &CycleTable,
    cycle: u32,
    charge_first: bool,
) -> Result<HysteresisLoop> {
    let charge = Curve::from_table(table, Polarity::Charge, cycle).ok_or(
        CyclingError::EmptyCurve {
            polarity: Polarity::Charge,
        },
    )?;
    let discharge = Curve::from_table(table, Polarity::Discharge, cycle).ok_or(
        CyclingError::EmptyCurve {
            polarity: Polarity::Discharge,
        },
    )?;
    extract_hysteresis(&charge, &discharge, charge_first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycling::table::TableChannel;
    use crate::data::model::Channel;

    fn raw(time: Vec<f64>, potential: Vec<f64>, current: Vec<f64>) -> RawTable {
        RawTable::from_columns(
            vec!["time/s".into(), "Ecell/V".into(), "<I>/mA".into()],
            vec![time, potential, current],
        )
        .unwrap()
    }

    fn options(mass: f64) -> AnalysisOptions {
        AnalysisOptions {
            active_mass_g: mass,
            mode: SegmentMode::constant(),
            charge_first: true,
        }
    }

    #[test]
    fn six_sample_scenario() {
        let table = raw(
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            vec![3.0, 3.2, 3.4, 3.3, 3.1, 2.9],
            vec![10.0, 10.0, 10.0, -10.0, -10.0, -10.0],
        );
        let report = analyze(&table, &options(0.001)).unwrap();
        assert_eq!(report.paired_cycles(), 1);

        let cap = report
            .cycle_table
            .get(TableChannel::Capacity, Polarity::Charge, 1)
            .unwrap();
        assert!((cap[2] - 5.556).abs() < 1e-3);
        assert!((report.summary[0].max_charge_capacity - 20.0 / 3.6).abs() < 1e-9);
        assert!((report.summary[0].coulombic_efficiency - 100.0).abs() < 1e-9);
    }

    #[test]
    fn zero_mass_fails_before_segmentation() {
        // Current has no discharge at all, so segmentation would also fail.
        let table = raw(vec![0.0, 1.0], vec![3.0, 3.0], vec![1.0, 1.0]);
        assert_eq!(
            analyze(&table, &options(0.0)),
            Err(CyclingError::InvalidActiveMass {
                value: "0".to_string()
            })
        );
    }

    #[test]
    fn five_by_three_keeps_three_cycles() {
        let mut current = Vec::new();
        for _ in 0..3 {
            current.extend([4.0, 4.0, -4.0, -4.0]);
        }
        current.extend([4.0, 4.0, 0.0, 4.0, 4.0]);
        let n = current.len();
        let table = raw(
            (0..n).map(|i| i as f64 * 10.0).collect(),
            vec![3.5; n],
            current,
        );
        let report = analyze(&table, &options(0.002)).unwrap();
        assert_eq!(report.charge_detected, 5);
        assert_eq!(report.discharge_detected, 3);
        let cycles: Vec<u32> = report.summary.iter().map(|r| r.cycle).collect();
        assert_eq!(cycles, vec![1, 2, 3]);
        assert!(report.cycle_table.iter().all(|(k, _)| k.cycle <= 3));
    }

    #[test]
    fn gap_in_current_plateau_fails_instead_of_splitting_it() {
        let table = raw(
            (0..9).map(|i| i as f64).collect(),
            vec![3.5; 9],
            vec![5.0, 5.0, f64::NAN, 5.0, 5.0, -5.0, -5.0, -5.0, -5.0],
        );
        assert_eq!(
            analyze(&table, &options(0.001)),
            Err(CyclingError::NonNumericSample {
                channel: Channel::Current,
                index: 2
            })
        );
    }

    #[test]
    fn missing_current_column_is_reported() {
        let table = RawTable::from_columns(
            vec!["time/s".into(), "Ecell/V".into()],
            vec![vec![0.0], vec![3.0]],
        )
        .unwrap();
        assert!(matches!(
            analyze(&table, &options(1.0)),
            Err(CyclingError::MissingChannel { .. })
        ));
    }
}

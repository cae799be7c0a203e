use log::{info, warn};
use serde::Serialize;

use super::table::{CycleTable, TableChannel};
use crate::data::model::Polarity;
use crate::error::{CyclingError, Result};

/// Per-cycle capacity maxima and coulombic efficiency (percent).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryRow {
    pub cycle: u32,
    pub max_charge_capacity: f64,
    pub max_discharge_capacity: f64,
    pub coulombic_efficiency: f64,
}

/// Which capacity is the numerator of the efficiency ratio.
///
/// Fixed from cycle 1 for the whole series. If a later cycle inverts the
/// inequality its efficiency exceeds 100 %; that is kept as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EfficiencyConvention {
    ChargeOverDischarge,
    DischargeOverCharge,
}

impl EfficiencyConvention {
    pub fn from_first_cycle(charge: f64, discharge: f64) -> Self {
        if discharge > charge {
            EfficiencyConvention::ChargeOverDischarge
        } else {
            EfficiencyConvention::DischargeOverCharge
        }
    }

    /// Efficiency in percent; NaN when the divisor is zero.
    pub fn efficiency(self, charge: f64, discharge: f64) -> f64 {
        let (num, den) = match self {
            EfficiencyConvention::ChargeOverDischarge => (charge, discharge),
            EfficiencyConvention::DischargeOverCharge => (discharge, charge),
        };
        if den == 0.0 {
            f64::NAN
        } else {
            100.0 * num / den
        }
    }
}

/// Maximum ignoring no-data cells; `None` if every cell is no-data.
pub fn nan_max(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
}

/// One row per cycle number that has both a charge and a discharge half.
pub fn summarize(table: &CycleTable) -> Result<Vec<SummaryRow>> {
    let paired = table.paired_cycles();
    if paired.is_empty() {
        return Err(CyclingError::InsufficientCycles {
            charge: table.cycles(Polarity::Charge).len() as u32,
            discharge: table.cycles(Polarity::Discharge).len() as u32,
        });
    }

    let max_of = |polarity: Polarity, cycle: u32| -> f64 {
        table
            .get(TableChannel::Capacity, polarity, cycle)
            .and_then(nan_max)
            .unwrap_or(f64::NAN)
    };

    let maxima: Vec<(u32, f64, f64)> = paired
        .iter()
        .map(|&n| (n, max_of(Polarity::Charge, n), max_of(Polarity::Discharge, n)))
        .collect();

    let (_, c1, d1) = maxima[0];
    let convention = EfficiencyConvention::from_first_cycle(c1, d1);
    info!("Coulombic efficiency convention from cycle {}: {convention:?}", maxima[0].0);

    let rows: Vec<SummaryRow> = maxima
        .into_iter()
        .map(|(cycle, charge, discharge)| SummaryRow {
            cycle,
            max_charge_capacity: charge,
            max_discharge_capacity: discharge,
            coulombic_efficiency: convention.efficiency(charge, discharge),
        })
        .collect();

    if let Some(row) = rows.iter().find(|r| r.coulombic_efficiency > 100.0) {
        warn!(
            "Cycle {} inverts the first-cycle capacity order (efficiency {:.2} %)",
            row.cycle, row.coulombic_efficiency
        );
    }
    Ok(rows)
}

use log::debug;

use super::segment::Segmentation;
use crate::data::model::{ActiveMass, ChannelSeries, Polarity};
use crate::error::{CyclingError, Result};

const SECONDS_PER_HOUR: f64 = 3600.0;

// ---------------------------------------------------------------------------
// Cycle - one half-cycle with its derived capacity
// ---------------------------------------------------------------------------

/// Samples of one (polarity, cycle number) pair.
///
/// `time` is re-zeroed to the first sample; `capacity` is in mAh/g and is
/// non-negative for both polarities.
#[derive(Debug, Clone, PartialEq)]
pub struct Cycle {
    pub number: u32,
    pub polarity: Polarity,
    pub time: Vec<f64>,
    pub potential: Vec<f64>,
    pub capacity: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Integration
// ---------------------------------------------------------------------------

/// Elapsed time re-zeroed to the first sample.
pub fn relative_time(time: &[f64]) -> Vec<f64> {
    match time.first() {
        Some(&t0) => time.iter().map(|t| t - t0).collect(),
        None => Vec::new(),
    }
}

/// Gravimetric capacity (mAh/g) of each sample of one half-cycle:
/// `relative_time * current / (3600 * mass)`.
///
/// The result carries the sign of the current; see [`half_cycle_capacity`]
/// for the polarity-corrected magnitude.
pub fn integrate_capacity(
    time: &[f64],
    current: &[f64],
    active_mass: ActiveMass,
) -> Result<Vec<f64>> {
    if time.len() != current.len() {
        return Err(CyclingError::LengthMismatch {
            what: "current series",
            expected: time.len(),
            found: current.len(),
        });
    }
    let scale = SECONDS_PER_HOUR * active_mass.grams();
    Ok(relative_time(time)
        .iter()
        .zip(current)
        .map(|(t, i)| t * i / scale)
        .collect())
}

/// Capacity of one half-cycle as a non-negative magnitude; discharge values
/// are negated.
pub fn half_cycle_capacity(
    time: &[f64],
    current: &[f64],
    polarity: Polarity,
    active_mass: ActiveMass,
) -> Result<Vec<f64>> {
    let mut capacity = integrate_capacity(time, current, active_mass)?;
    let sign = polarity.sign();
    for c in &mut capacity {
        *c *= sign;
    }
    Ok(capacity)
}

/// Cut the series into paired half-cycles and integrate each one.
///
/// Charge cycles come first, each polarity in ascending cycle order.
pub fn extract_cycles(
    series: &ChannelSeries,
    segmentation: &Segmentation,
    active_mass: ActiveMass,
) -> Result<Vec<Cycle>> {
    if segmentation.labels.len() != series.len() {
        return Err(CyclingError::LengthMismatch {
            what: "segmentation labels",
            expected: series.len(),
            found: segmentation.labels.len(),
        });
    }

    let mut cycles = Vec::with_capacity(2 * segmentation.paired as usize);
    for polarity in Polarity::BOTH {
        for (number, members) in (1..).zip(segmentation.half_cycles(polarity)) {
            let pick =
                |values: &[f64]| -> Vec<f64> { members.iter().map(|&i| values[i]).collect() };

            let abs_time = pick(series.time.as_slice());
            let current = pick(series.current.as_slice());
            let capacity = half_cycle_capacity(&abs_time, &current, polarity, active_mass)?;
            debug!(
                "{polarity} cycle {number}: {} samples, final capacity {:.3} mAh/g",
                members.len(),
                capacity.last().copied().unwrap_or(f64::NAN)
            );

            cycles.push(Cycle {
                number,
                polarity,
                time: relative_time(&abs_time),
                potential: pick(series.potential.as_slice()),
                capacity,
            });
        }
    }
    Ok(cycles)
}

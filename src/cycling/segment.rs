use log::{debug, info, warn};

use crate::data::model::{Polarity, PolarityLabel, Threshold};
use crate::error::{CyclingError, Result};

/// Fraction of the current extremum a sample must exceed to count as part of
/// a constant-current plateau.
pub const DEFAULT_REL_CUTOFF: f64 = 0.98;

// ---------------------------------------------------------------------------
// Mode selection
// ---------------------------------------------------------------------------

/// How polarity is decided for each sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentMode {
    /// Applied current sits on a plateau near its extremum.
    ConstantCurrent { rel_cutoff: f64 },
    /// Applied current changes between cycles; flat regions of the current
    /// are cycles. The threshold must have been confirmed by the operator.
    VariableCurrent { threshold: Threshold },
}

impl SegmentMode {
    pub fn constant() -> Self {
        SegmentMode::ConstantCurrent {
            rel_cutoff: DEFAULT_REL_CUTOFF,
        }
    }

    pub fn variable(threshold: Threshold) -> Self {
        SegmentMode::VariableCurrent { threshold }
    }
}

// ---------------------------------------------------------------------------
// Segmentation result
// ---------------------------------------------------------------------------

/// Per-sample polarity labels and per-polarity 1-based cycle indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub labels: Vec<PolarityLabel>,
    pub charge_cycles: Vec<Option<u32>>,
    pub discharge_cycles: Vec<Option<u32>>,
    /// Half-cycles found before pairing.
    pub charge_detected: u32,
    pub discharge_detected: u32,
    /// Cycle numbers 1..=paired carry both a charge and a discharge half.
    pub paired: u32,
}

impl Segmentation {
    pub fn cycle_indices(&self, polarity: Polarity) -> &[Option<u32>] {
        match polarity {
            Polarity::Charge => &self.charge_cycles,
            Polarity::Discharge => &self.discharge_cycles,
        }
    }

    /// Sample indices of every paired half-cycle of `polarity`, grouped in
    /// one pass; entry `n - 1` holds cycle `n`.
    pub fn half_cycles(&self, polarity: Polarity) -> Vec<Vec<usize>> {
        let mut groups = vec![Vec::new(); self.paired as usize];
        for (i, cycle) in self.cycle_indices(polarity).iter().enumerate() {
            if let Some(k) = cycle.and_then(|n| (n as usize).checked_sub(1)) {
                if let Some(group) = groups.get_mut(k) {
                    group.push(i);
                }
            }
        }
        groups
    }

    /// Sample indices belonging to one half-cycle, in sampling order.
    pub fn members(&self, polarity: Polarity, cycle: u32) -> Vec<usize> {
        self.cycle_indices(polarity)
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == Some(cycle))
            .map(|(i, _)| i)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Signal helpers
// ---------------------------------------------------------------------------

/// Convolution with the kernel `[1, -1]`, keeping the input length.
///
/// `out[0] = x[0]` and `out[i] = x[i] - x[i-1]`; the trailing sample of the
/// full convolution is dropped.
pub fn convolve_edges(x: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(x.len());
    let mut prev = 0.0;
    for &v in x {
        out.push(v - prev);
        prev = v;
    }
    out
}

/// Smallest nonzero magnitude of the current derivative.
///
/// Only a suggestion: variable-current segmentation takes a [`Threshold`]
/// the operator has confirmed or replaced.
pub fn suggest_threshold(current: &[f64]) -> Option<f64> {
    convolve_edges(current)
        .into_iter()
        .map(f64::abs)
        .filter(|d| d.is_finite() && *d > 0.0)
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.min(d))))
}

fn finite_max(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NEG_INFINITY, f64::max)
}

fn finite_min(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::INFINITY, f64::min)
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Label samples above `rel_cutoff * max` as charge and below
/// `rel_cutoff * min` as discharge.
pub fn classify_constant(current: &[f64], rel_cutoff: f64) -> Result<Vec<PolarityLabel>> {
    if !(rel_cutoff.is_finite() && rel_cutoff > 0.0 && rel_cutoff <= 1.0) {
        return Err(CyclingError::InvalidThreshold {
            value: rel_cutoff.to_string(),
        });
    }
    let pos_threshold = rel_cutoff * finite_max(current);
    let neg_threshold = rel_cutoff * finite_min(current);
    debug!("Constant-current thresholds: +{pos_threshold} / {neg_threshold} mA");

    Ok(current
        .iter()
        .map(|&i| {
            if i > pos_threshold {
                PolarityLabel::Charge
            } else if i < neg_threshold {
                PolarityLabel::Discharge
            } else {
                PolarityLabel::Neither
            }
        })
        .collect())
}

/// Label locally flat stretches of current by the sign of the current.
///
/// A leading flat stretch is a rest before the test starts and is dropped.
pub fn classify_variable(current: &[f64], threshold: Threshold) -> Vec<PolarityLabel> {
    let derivative = convolve_edges(current);
    let mut in_cycle: Vec<bool> = derivative
        .iter()
        .map(|d| d.abs() < threshold.value())
        .collect();

    let leading = in_cycle.iter().take_while(|f| **f).count();
    if leading > 0 {
        debug!("Discarding {leading} leading rest samples");
    }
    for flag in in_cycle.iter_mut().take(leading) {
        *flag = false;
    }

    current
        .iter()
        .zip(in_cycle)
        .map(|(&i, flat)| match flat {
            true if i > 0.0 => PolarityLabel::Charge,
            true if i < 0.0 => PolarityLabel::Discharge,
            _ => PolarityLabel::Neither,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Cycle numbering
// ---------------------------------------------------------------------------

/// Number the half-cycles of one polarity at the rising edges of its mask.
///
/// The sample two positions before each edge is also given the new index
/// when no polarity has claimed it.
fn number_cycles(labels: &[PolarityLabel], polarity: Polarity) -> (Vec<Option<u32>>, u32) {
    let wanted = PolarityLabel::from(polarity);
    let mask: Vec<f64> = labels
        .iter()
        .map(|l| if *l == wanted { 1.0 } else { 0.0 })
        .collect();
    let edges = convolve_edges(&mask);

    let mut indices = vec![None; labels.len()];
    let mut count = 0u32;
    for i in 0..labels.len() {
        if labels[i] != wanted {
            continue;
        }
        if edges[i] == 1.0 {
            count += 1;
            if i >= 2 && labels[i - 2] == PolarityLabel::Neither {
                indices[i - 2] = Some(count);
            }
        }
        indices[i] = Some(count);
    }
    (indices, count)
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Split a current signal into numbered, paired charge/discharge half-cycles.
///
/// Excess half-cycles of the more numerous polarity are unassigned so every
/// remaining cycle number has both halves.
pub fn segment(current: &[f64], mode: SegmentMode) -> Result<Segmentation> {
    if current.is_empty() {
        return Err(CyclingError::EmptyTable);
    }

    let labels = match mode {
        SegmentMode::ConstantCurrent { rel_cutoff } => classify_constant(current, rel_cutoff)?,
        SegmentMode::VariableCurrent { threshold } => classify_variable(current, threshold),
    };

    let (mut charge_cycles, charge_detected) = number_cycles(&labels, Polarity::Charge);
    let (mut discharge_cycles, discharge_detected) = number_cycles(&labels, Polarity::Discharge);
    info!("Detected {charge_detected} charge and {discharge_detected} discharge half-cycles");

    if charge_detected == 0 || discharge_detected == 0 {
        return Err(CyclingError::InsufficientCycles {
            charge: charge_detected,
            discharge: discharge_detected,
        });
    }

    let paired = charge_detected.min(discharge_detected);
    if charge_detected != discharge_detected {
        warn!(
            "Unequal half-cycle counts; keeping {paired} paired cycles and discarding {} excess",
            charge_detected.max(discharge_detected) - paired
        );
    }
    for idx in charge_cycles.iter_mut().chain(discharge_cycles.iter_mut()) {
        if matches!(idx, Some(n) if *n > paired) {
            *idx = None;
        }
    }

    Ok(Segmentation {
        labels,
        charge_cycles,
        discharge_cycles,
        charge_detected,
        discharge_detected,
        paired,
    })
}
